//! One list view: the filter builder plus the search box, pagination, sort and
//! saved filters around it.
//!
//! Every change to the filter, the page or the sort issues a new list request
//! carrying the full tree. Search input is debounced; the request for it is
//! issued by [`ListSession::poll`] once the input has been quiet long enough.

use crate::builder::{BuilderError, FilterBuilder};
use crate::compiler::{CompileError, FilterCompiler};
use crate::config::{AppConfig, ConfigError};
use crate::debounce::{Debouncer, RequestSequence, RequestTicket};
use crate::model::FilterGroup;
use crate::parser::Command;
use crate::registry::{Entity, FilterField};
use crate::request::{EntityFilter, FindManyArgs, Pagination, Sort};
use crate::saved::{SavedFilter, SavedFilterStore, StoreError};
use crate::sql::{self, SqlError};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Builder(#[from] BuilderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Sql(#[from] SqlError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot sort by unknown field `{0}`")]
    UnknownSortField(String),
}

/// A list re-fetch, identified by its ticket
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub ticket: RequestTicket,
    pub args: FindManyArgs,
    pub sql: String,
}

/// Result of one command
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The list must be re-fetched
    Refetch(ListRequest),
    /// Search input recorded; it fires at this instant unless more input arrives
    SearchScheduled(Instant),
    Outline(String),
    Compiled(FindManyArgs),
    Sql(String),
    Saved { name: String, replaced: bool },
    Deleted(String),
    SavedList(Vec<SavedFilter>),
    Fields(Vec<FilterField>),
    Help,
    Quit,
}

pub struct ListSession {
    entity: Entity,
    table: String,
    builder: FilterBuilder,
    changed: Rc<Cell<bool>>,
    compiler: FilterCompiler,
    store: SavedFilterStore,
    pagination: Pagination,
    max_page_size: u64,
    sort: Option<Sort>,
    search: Debouncer<String>,
    active_search: Option<String>,
    requests: RequestSequence,
}

impl ListSession {
    pub fn new(entity: Entity, config: &AppConfig, store: SavedFilterStore) -> Result<Self, SessionError> {
        let changed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&changed);
        let builder = FilterBuilder::new(config.registry(entity)?).on_change(move |_| flag.set(true));

        Ok(Self {
            entity,
            table: config.table_name(entity),
            builder,
            changed,
            compiler: FilterCompiler::with_config(config.compiler_config()),
            store,
            pagination: config.default_pagination(),
            max_page_size: config.max_page_size,
            sort: None,
            search: Debouncer::new(config.debounce_delay()),
            active_search: None,
            requests: RequestSequence::new(),
        })
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn filter(&self) -> &Arc<FilterGroup> {
        self.builder.filter()
    }

    pub fn builder(&self) -> &FilterBuilder {
        &self.builder
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    pub fn active_search(&self) -> Option<&str> {
        self.active_search.as_deref()
    }

    /// When the pending search input fires
    pub fn search_deadline(&self) -> Option<Instant> {
        self.search.deadline()
    }

    /// Whether a response to `ticket` should still be applied
    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.requests.is_current(ticket)
    }

    /// Run one command. When the list request for a changed filter cannot be
    /// built, the filter and the page are put back as they were.
    pub fn execute(&mut self, command: Command, now: Instant) -> Result<Outcome, SessionError> {
        let previous = Arc::clone(self.builder.filter());
        let previous_page = self.pagination;

        let outcome = match command {
            Command::Add(at) => {
                self.builder.add_condition(&at)?;
                None
            }
            Command::Field(at, field) => {
                self.builder.change_field(&at, &field)?;
                None
            }
            Command::Op(at, operator) => {
                self.builder.change_operator(&at, operator)?;
                None
            }
            Command::Value(at, value) => {
                self.builder.change_value(&at, Some(value))?;
                None
            }
            Command::Clear(at) => {
                self.builder.change_value(&at, None)?;
                None
            }
            Command::Remove(at) => {
                self.builder.remove_condition(&at)?;
                None
            }
            Command::Group(at, logic) => {
                self.builder.add_group(&at, logic)?;
                None
            }
            Command::RemoveGroup(at) => {
                self.builder.remove_group(&at)?;
                None
            }
            Command::Logic(at, logic) => {
                self.builder.set_logic(&at, logic)?;
                None
            }
            Command::Where(group) => {
                let group = self.builder.registry().coerce_values(&group);
                self.builder.replace(group);
                None
            }
            Command::Reset => {
                self.search.cancel();
                self.active_search = None;
                self.builder.reset();
                None
            }
            Command::Load(name) => {
                let group = self.builder.registry().coerce_values(self.store.get(&name)?);
                self.builder.replace(group);
                info!(name = %name, "loaded saved filter");
                None
            }
            Command::Search(text) => {
                self.search.push(text, now);
                return Ok(Outcome::SearchScheduled(now + self.search.delay()));
            }
            Command::Page { page, limit } => {
                let limit = limit.unwrap_or(self.pagination.limit);
                self.pagination = Pagination::new(page, limit).clamped(self.max_page_size);
                return self.refetch().map(Outcome::Refetch);
            }
            Command::Sort(sort) => {
                if let Some(sort) = &sort {
                    if self.builder.registry().field(&sort.field).is_none() {
                        return Err(SessionError::UnknownSortField(sort.field.clone()));
                    }
                }
                self.sort = sort;
                return self.refetch().map(Outcome::Refetch);
            }
            Command::Show => Some(Outcome::Outline(self.builder.filter().outline())),
            Command::Compile => Some(Outcome::Compiled(self.find_many_args()?)),
            Command::Sql => {
                let args = self.find_many_args()?;
                Some(Outcome::Sql(sql::to_postgres(&self.table, &args)?))
            }
            Command::Save(name) => {
                let replaced = self.store.save(&name, FilterGroup::clone(self.builder.filter()))?;
                Some(Outcome::Saved {
                    name: name.trim().to_string(),
                    replaced: replaced.is_some(),
                })
            }
            Command::Delete(name) => {
                self.store.remove(&name)?;
                Some(Outcome::Deleted(name))
            }
            Command::Saved => Some(Outcome::SavedList(self.store.list())),
            Command::Fields => Some(Outcome::Fields(self.builder.registry().fields().to_vec())),
            Command::Help => Some(Outcome::Help),
            Command::Quit => Some(Outcome::Quit),
        };

        if let Some(outcome) = outcome {
            return Ok(outcome);
        }

        // Filter changed: back to the first page
        if self.changed.replace(false) {
            self.pagination.page = 1;
        }
        match self.refetch() {
            Ok(request) => Ok(Outcome::Refetch(request)),
            Err(e) => {
                debug!(error = %e, "list request failed, restoring previous filter");
                self.builder.restore(previous);
                self.changed.set(false);
                self.pagination = previous_page;
                Err(e)
            }
        }
    }

    /// Fire the pending search if its quiet period is over
    pub fn poll(&mut self, now: Instant) -> Result<Option<ListRequest>, SessionError> {
        let Some(term) = self.search.poll(now) else {
            return Ok(None);
        };
        let term = term.trim();
        self.active_search = (!term.is_empty()).then(|| term.to_string());
        self.pagination.page = 1;
        debug!(search = ?self.active_search, "search input settled");
        self.refetch().map(Some)
    }

    /// The builder's tree, narrowed by the active search
    pub fn effective_filter(&self) -> FilterGroup {
        let filter = FilterGroup::clone(self.builder.filter());
        let search = match &self.active_search {
            Some(term) => self.builder.registry().search_group(term),
            None => return filter,
        };
        if search.is_empty() {
            filter
        } else if filter.is_empty() {
            search
        } else {
            FilterGroup::and().with_group(filter).with_group(search)
        }
    }

    pub fn find_many_args(&self) -> Result<FindManyArgs, SessionError> {
        let mut request = EntityFilter::new(self.effective_filter()).with_pagination(self.pagination);
        if let Some(sort) = &self.sort {
            request = request.with_sort(sort.clone());
        }
        Ok(request.find_many_args(&self.compiler, self.max_page_size)?)
    }

    fn refetch(&mut self) -> Result<ListRequest, SessionError> {
        let args = self.find_many_args()?;
        let sql = sql::to_postgres(&self.table, &args)?;
        let ticket = self.requests.next();
        debug!(ticket = ticket.id(), dropped = args.dropped.len(), "list request issued");
        Ok(ListRequest { ticket, args, sql })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::DropReason;
    use crate::parser::parse_command;
    use serde_json::json;
    use std::time::Duration;

    fn session(entity: Entity) -> ListSession {
        ListSession::new(entity, &AppConfig::default(), SavedFilterStore::in_memory()).unwrap()
    }

    fn run(session: &mut ListSession, line: &str) -> Outcome {
        session.execute(parse_command(line).unwrap(), Instant::now()).unwrap()
    }

    fn refetch(outcome: Outcome) -> ListRequest {
        match outcome {
            Outcome::Refetch(request) => request,
            other => panic!("expected a refetch, got {:?}", other),
        }
    }

    #[test]
    fn test_building_a_condition_refetches_each_step() {
        let mut s = session(Entity::Customers);

        let request = refetch(run(&mut s, "add"));
        assert_eq!(request.args.filter.to_value(), json!({}));
        assert_eq!(request.args.dropped.len(), 1);

        refetch(run(&mut s, "field c0 city"));
        refetch(run(&mut s, "op c0 equals"));
        let request = refetch(run(&mut s, r#"value c0 "Lviv""#));
        assert_eq!(request.args.filter.to_value(), json!({"city": {"equals": "Lviv"}}));
        assert!(request.args.dropped.is_empty());
        assert!(request.sql.contains(r#""city" = 'Lviv'"#));
        assert!(s.is_current(request.ticket));
    }

    #[test]
    fn test_older_tickets_are_stale() {
        let mut s = session(Entity::Customers);
        let first = refetch(run(&mut s, "where isActive = true"));
        let second = refetch(run(&mut s, "page 2"));
        assert!(!s.is_current(first.ticket));
        assert!(s.is_current(second.ticket));
    }

    #[test]
    fn test_search_is_debounced() {
        let mut s = session(Entity::Contacts);
        let start = Instant::now();

        let outcome = s.execute(Command::Search("an".to_string()), start).unwrap();
        assert_eq!(outcome, Outcome::SearchScheduled(start + Duration::from_millis(300)));
        s.execute(Command::Search("anna".to_string()), start + Duration::from_millis(100))
            .unwrap();

        assert!(s.poll(start + Duration::from_millis(300)).unwrap().is_none());
        let request = s.poll(start + Duration::from_millis(400)).unwrap().unwrap();
        assert_eq!(s.active_search(), Some("anna"));

        let where_ = request.args.filter.to_value();
        let branches = where_["OR"].as_array().unwrap();
        assert_eq!(branches.len(), 4);
        assert_eq!(branches[0], json!({"firstName": {"contains": "anna", "mode": "insensitive"}}));
    }

    #[test]
    fn test_search_narrows_builder_filter() {
        let mut s = session(Entity::Contacts);
        let start = Instant::now();
        run(&mut s, "where status = NEW");
        s.execute(Command::Search("anna".to_string()), start).unwrap();
        let request = s.poll(start + Duration::from_secs(1)).unwrap().unwrap();

        let where_ = request.args.filter.to_value();
        let parts = where_["AND"].as_array().unwrap();
        assert_eq!(parts[0], json!({"status": {"equals": "NEW"}}));
        assert!(parts[1].get("OR").is_some());

        s.execute(Command::Search("  ".to_string()), start).unwrap();
        let request = s.poll(start + Duration::from_secs(1)).unwrap().unwrap();
        assert_eq!(s.active_search(), None);
        assert_eq!(request.args.filter.to_value(), json!({"status": {"equals": "NEW"}}));
    }

    #[test]
    fn test_filter_change_resets_page() {
        let mut s = session(Entity::Customers);
        let request = refetch(run(&mut s, "page 3 10"));
        assert_eq!((request.args.skip, request.args.take), (20, 10));

        let request = refetch(run(&mut s, "where rating > 1500"));
        assert_eq!((request.args.skip, request.args.take), (0, 10));
    }

    #[test]
    fn test_page_is_clamped_to_max() {
        let mut s = session(Entity::Customers);
        let request = refetch(run(&mut s, "page 1 5000"));
        assert_eq!(request.args.take, 100);
    }

    #[test]
    fn test_sort_must_name_a_field() {
        let mut s = session(Entity::Customers);
        let request = refetch(run(&mut s, "sort joinedAt desc"));
        assert_eq!(request.args.to_json()["orderBy"], json!({"joinedAt": "desc"}));

        let err = s.execute(parse_command("sort shoeSize").unwrap(), Instant::now()).unwrap_err();
        assert!(matches!(err, SessionError::UnknownSortField(field) if field == "shoeSize"));
    }

    #[test]
    fn test_save_and_load() {
        let mut s = session(Entity::Subscriptions);
        run(&mut s, "where plan in (MONTHLY, ANNUAL) AND autoRenew = true");
        let saved_tree = FilterGroup::clone(s.filter());

        assert_eq!(
            run(&mut s, "save renewing"),
            Outcome::Saved {
                name: "renewing".to_string(),
                replaced: false,
            }
        );
        refetch(run(&mut s, "reset"));
        assert!(s.filter().is_empty());

        let request = refetch(run(&mut s, "load renewing"));
        assert_eq!(s.filter().as_ref(), &saved_tree);
        assert_eq!(
            request.args.filter.to_value(),
            json!({"AND": [
                {"plan": {"in": ["MONTHLY", "ANNUAL"]}},
                {"autoRenew": {"equals": true}}
            ]})
        );

        match run(&mut s, "saved") {
            Outcome::SavedList(list) => assert_eq!(list.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(run(&mut s, "delete renewing"), Outcome::Deleted("renewing".to_string()));
    }

    #[test]
    fn test_errors_leave_state_unchanged() {
        let mut s = session(Entity::Customers);
        run(&mut s, "add");
        let before = Arc::clone(s.filter());

        let err = s.execute(parse_command("op c0 contains").unwrap(), Instant::now()).unwrap_err();
        assert!(matches!(err, SessionError::Builder(BuilderError::NoField(_))));
        let err = s.execute(parse_command("load nothing").unwrap(), Instant::now()).unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::NotFound(_))));
        assert!(Arc::ptr_eq(&before, s.filter()));
    }

    #[test]
    fn test_pattern_operator_with_non_text_value_is_dropped() {
        let mut s = session(Entity::Customers);
        refetch(run(&mut s, "page 2"));

        let request = refetch(run(&mut s, "where email ~ true"));
        assert_eq!(request.args.filter.to_value(), json!({}));
        assert_eq!(request.args.dropped.len(), 1);
        assert_eq!(request.args.dropped[0].reason, DropReason::ValueShape);

        let request = refetch(run(&mut s, "page 3"));
        assert_eq!(request.args.skip, 40);
    }

    #[test]
    fn test_where_reads_values_by_field_type() {
        let mut s = session(Entity::Customers);
        let request = refetch(run(&mut s, r#"where joinedAt > "2024-03-01" AND city = 2024-03-01"#));
        assert_eq!(
            request.args.filter.to_value(),
            json!({"AND": [
                {"joinedAt": {"gt": "2024-03-01T00:00:00Z"}},
                {"city": {"equals": "2024-03-01"}}
            ]})
        );
    }

    #[test]
    fn test_saved_text_value_reloads_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.json");
        let config = AppConfig::default();
        let expected = json!({"phone": {"contains": "2024-03-01", "mode": "insensitive"}});

        let mut s = ListSession::new(Entity::Contacts, &config, SavedFilterStore::open(&path).unwrap()).unwrap();
        let request = refetch(run(&mut s, r#"where phone ~ "2024-03-01""#));
        assert_eq!(request.args.filter.to_value(), expected);
        run(&mut s, "save dated");

        let mut reopened = ListSession::new(Entity::Contacts, &config, SavedFilterStore::open(&path).unwrap()).unwrap();
        let request = refetch(run(&mut reopened, "load dated"));
        assert_eq!(request.args.filter.to_value(), expected);
    }

    #[test]
    fn test_read_only_commands() {
        let mut s = session(Entity::Customers);
        run(&mut s, "where city = Lviv");
        assert!(matches!(run(&mut s, "show"), Outcome::Outline(text) if text.contains("city equals")));
        assert!(matches!(run(&mut s, "sql"), Outcome::Sql(text) if text.contains("FROM \"customers\"")));
        match run(&mut s, "compile") {
            Outcome::Compiled(args) => assert_eq!(args.filter.to_value(), json!({"city": {"equals": "Lviv"}})),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(run(&mut s, "fields"), Outcome::Fields(fields) if fields.len() == 8));
    }
}
