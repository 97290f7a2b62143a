//! Named saved filters.
//!
//! The store maps a name to a filter tree. When it is backed by a file, every
//! change is written through as one JSON object of `name -> FilterGroup`.

use crate::model::FilterGroup;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// A filter saved under a user-facing name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFilter {
    pub name: String,
    pub filter: FilterGroup,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("saved filter name must not be blank")]
    BlankName,
    #[error("no saved filter named `{0}`")]
    NotFound(String),
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot serialize saved filters: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
pub struct SavedFilterStore {
    path: Option<PathBuf>,
    filters: BTreeMap<String, FilterGroup>,
}

impl SavedFilterStore {
    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a file-backed store; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let filters = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "saved filter file not found, starting empty");
                BTreeMap::new()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        info!(path = %path.display(), count = filters.len(), "loaded saved filters");
        Ok(Self {
            path: Some(path),
            filters,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Save under `name`, replacing any filter with that name.
    ///
    /// Returns the replaced filter, if there was one.
    pub fn save(&mut self, name: &str, filter: FilterGroup) -> Result<Option<FilterGroup>, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::BlankName);
        }
        let replaced = self.filters.insert(name.to_string(), filter);
        self.persist()?;
        Ok(replaced)
    }

    pub fn get(&self, name: &str) -> Result<&FilterGroup, StoreError> {
        self.filters
            .get(name.trim())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Result<FilterGroup, StoreError> {
        let removed = self
            .filters
            .remove(name.trim())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        self.persist()?;
        Ok(removed)
    }

    /// All saved filters, ordered by name
    pub fn list(&self) -> Vec<SavedFilter> {
        self.filters
            .iter()
            .map(|(name, filter)| SavedFilter {
                name: name.clone(),
                filter: filter.clone(),
            })
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(&self.filters)?;
        let tmp = path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;

        info!(path = %path.display(), count = self.filters.len(), "saved filters written");
        Ok(())
    }
}
