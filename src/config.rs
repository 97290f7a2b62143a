//! 配置模块，负责加载JSON配置文件

use crate::compiler::CompilerConfig;
use crate::debounce::DEFAULT_SEARCH_DELAY;
use crate::registry::{Entity, FieldRegistry, FilterField, RegistryError};
use crate::request::Pagination;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),
    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("无法解析JSON配置文件 {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("配置无效: {0}")]
    Invalid(String),
    #[error("字段配置错误: {0}")]
    Fields(#[from] RegistryError),
}

/// 应用配置结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// 实体名到数据库表名的映射
    pub tables: HashMap<String, String>,
    /// 保存的过滤器文件；为空时只保存在内存中
    pub saved_filters_path: Option<PathBuf>,
    pub default_page_size: u64,
    pub max_page_size: u64,
    /// 搜索框防抖延迟（毫秒）
    pub search_debounce_ms: u64,
    /// `contains` 是否忽略大小写
    pub insensitive_contains: bool,
    /// 额外的字段定义，按实体名追加到内置字段之后
    pub fields: HashMap<String, Vec<FilterField>>,
}

impl Default for AppConfig {
    /// 创建默认配置（用于测试或fallback）
    fn default() -> Self {
        let tables = Entity::ALL
            .into_iter()
            .map(|entity| (entity.as_str().to_string(), entity.as_str().to_string()))
            .collect();

        Self {
            tables,
            saved_filters_path: None,
            default_page_size: 20,
            max_page_size: 100,
            search_debounce_ms: DEFAULT_SEARCH_DELAY.as_millis() as u64,
            insensitive_contains: true,
            fields: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        // 检查文件是否存在
        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        // 读取文件内容
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.to_path_buf(),
            source,
        })?;

        // 解析JSON
        let config: AppConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.to_path_buf(),
            source,
        })?;

        config.validate()?;
        info!(path = %path_ref.display(), "loaded configuration");
        Ok(config)
    }

    /// 文件存在时加载，否则使用默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::from_json_file(path) {
            Err(ConfigError::NotFound(path)) => {
                info!(path = %path.display(), "configuration file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::Invalid("defaultPageSize 必须大于 0".to_string()));
        }
        if self.max_page_size < self.default_page_size {
            return Err(ConfigError::Invalid(format!(
                "maxPageSize ({}) 不能小于 defaultPageSize ({})",
                self.max_page_size, self.default_page_size
            )));
        }
        if let Some(name) = self.fields.keys().find(|name| Entity::from_name(name).is_none()) {
            return Err(ConfigError::Invalid(format!("未知实体: {}", name)));
        }
        Ok(())
    }

    /// 获取实体对应的表名，如果不存在则返回小写的实体名
    pub fn table_name(&self, entity: Entity) -> String {
        self.tables
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(entity.as_str()))
            .map(|(_, table)| table.clone())
            .unwrap_or_else(|| entity.as_str().to_lowercase())
    }

    /// 内置字段加上配置中的额外字段
    pub fn registry(&self, entity: Entity) -> Result<FieldRegistry, ConfigError> {
        let mut fields = entity.fields();
        for (name, extra) in &self.fields {
            if name.eq_ignore_ascii_case(entity.as_str()) {
                fields.extend(extra.iter().cloned());
            }
        }
        Ok(FieldRegistry::new(fields)?)
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn default_pagination(&self) -> Pagination {
        Pagination::new(1, self.default_page_size)
    }

    pub fn compiler_config(&self) -> CompilerConfig {
        CompilerConfig {
            insensitive_contains: self.insensitive_contains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldType;
    use tempfile::tempdir;

    #[test]
    fn test_load_valid_json_config() {
        // 创建临时配置文件
        let dir = tempdir().unwrap();
        let path = dir.path().join("academy.json");
        fs::write(
            &path,
            r#"{
                "tables": {"Customers": "academy_customers"},
                "savedFiltersPath": "saved.json",
                "defaultPageSize": 50,
                "searchDebounceMs": 150
            }"#,
        )
        .unwrap();

        // 测试加载
        let config = AppConfig::from_json_file(&path).unwrap();
        assert_eq!(config.table_name(Entity::Customers), "academy_customers");
        assert_eq!(config.table_name(Entity::Contacts), "contacts");
        assert_eq!(config.saved_filters_path, Some(PathBuf::from("saved.json")));
        assert_eq!(config.default_pagination(), Pagination::new(1, 50));
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.debounce_delay(), Duration::from_millis(150));
        assert!(config.compiler_config().insensitive_contains);
    }

    #[test]
    fn test_invalid_json_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.json");
        fs::write(&path, "invalid json").unwrap();

        let result = AppConfig::from_json_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));

        let config = AppConfig::load_or_default("non_existent_file.json").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_page_sizes_are_checked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.json");
        fs::write(&path, r#"{"defaultPageSize": 200, "maxPageSize": 100}"#).unwrap();
        assert!(matches!(AppConfig::from_json_file(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_extra_fields_extend_registry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fields.json");
        fs::write(
            &path,
            r#"{"fields": {"customers": [
                {"id": "fideId", "name": "FIDE id", "type": "string", "operators": ["equals"]}
            ]}}"#,
        )
        .unwrap();

        let config = AppConfig::from_json_file(&path).unwrap();
        let registry = config.registry(Entity::Customers).unwrap();
        let field = registry.field("fideId").unwrap();
        assert_eq!(field.field_type, FieldType::String);
        assert!(config.registry(Entity::Contacts).unwrap().field("fideId").is_none());
    }

    #[test]
    fn test_duplicate_extra_field_is_rejected() {
        let mut config = AppConfig::default();
        config.fields.insert(
            "customers".to_string(),
            vec![FilterField::new("email", "Email again", FieldType::String)],
        );
        assert!(matches!(
            config.registry(Entity::Customers),
            Err(ConfigError::Fields(RegistryError::DuplicateField(_)))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.table_name(Entity::Subscriptions), "subscriptions");
        assert_eq!(config.debounce_delay(), Duration::from_millis(300));
        assert_eq!(config.default_pagination(), Pagination::default());
    }
}
