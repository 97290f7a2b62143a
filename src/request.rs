//! List request envelope: filter, pagination and sort for one list view.

use crate::compiler::{CompileError, DroppedCondition, FilterCompiler, QueryFilter};
use crate::model::FilterGroup;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Page of a list view (1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Pagination {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page, limit }
    }

    /// Page at least 1, limit within `1..=max_limit`
    pub fn clamped(&self, max_limit: u64) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, max_limit.max(1)),
        }
    }

    /// Rows to skip before this page
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Asc),
            "desc" | "descending" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// Request sent on every list re-fetch
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityFilter {
    pub filter: FilterGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
}

impl EntityFilter {
    pub fn new(filter: FilterGroup) -> Self {
        Self {
            filter,
            pagination: None,
            sort: None,
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Compile into `findMany` arguments for the data-access layer
    pub fn find_many_args(&self, compiler: &FilterCompiler, max_limit: u64) -> Result<FindManyArgs, CompileError> {
        let compiled = compiler.compile(&self.filter)?;
        let page = self.pagination.unwrap_or_default().clamped(max_limit);
        Ok(FindManyArgs {
            filter: compiled.filter,
            skip: page.offset(),
            take: page.limit,
            order_by: self.sort.clone(),
            dropped: compiled.dropped,
        })
    }
}

/// Prisma `findMany` arguments
#[derive(Debug, Clone, PartialEq)]
pub struct FindManyArgs {
    pub filter: QueryFilter,
    pub skip: u64,
    pub take: u64,
    pub order_by: Option<Sort>,
    /// Conditions the compiler left out
    pub dropped: Vec<DroppedCondition>,
}

impl FindManyArgs {
    /// `{ where, skip, take, orderBy? }`
    pub fn to_json(&self) -> Value {
        let mut args = Map::new();
        args.insert("where".to_string(), self.filter.to_value());
        args.insert("skip".to_string(), Value::from(self.skip));
        args.insert("take".to_string(), Value::from(self.take));
        if let Some(sort) = &self.order_by {
            let mut order = Map::new();
            order.insert(sort.field.clone(), Value::from(sort.direction.as_str()));
            args.insert("orderBy".to_string(), Value::Object(order));
        }
        Value::Object(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilterCondition, Operator};
    use serde_json::json;

    #[test]
    fn test_find_many_args() {
        let request = EntityFilter::new(
            FilterGroup::and().with_condition(FilterCondition::new("city", Operator::Equals, "Lviv")),
        )
        .with_pagination(Pagination::new(3, 25))
        .with_sort(Sort::new("joinedAt", SortDirection::Desc));

        let args = request.find_many_args(&FilterCompiler::new(), 100).unwrap();
        assert_eq!(
            args.to_json(),
            json!({
                "where": {"city": {"equals": "Lviv"}},
                "skip": 50,
                "take": 25,
                "orderBy": {"joinedAt": "desc"}
            })
        );
    }

    #[test]
    fn test_pagination_is_clamped() {
        let request = EntityFilter::new(FilterGroup::and()).with_pagination(Pagination::new(0, 5000));
        let args = request.find_many_args(&FilterCompiler::new(), 100).unwrap();
        assert_eq!(args.skip, 0);
        assert_eq!(args.take, 100);
        assert_eq!(args.to_json()["where"], json!({}));
        assert!(args.to_json().get("orderBy").is_none());
    }

    #[test]
    fn test_default_pagination() {
        let args = EntityFilter::default().find_many_args(&FilterCompiler::new(), 100).unwrap();
        assert_eq!((args.skip, args.take), (0, 20));
    }

    #[test]
    fn test_envelope_json_shape() {
        let raw = json!({
            "filter": {"logic": "AND", "conditions": []},
            "pagination": {"page": 2, "limit": 10},
            "sort": {"field": "email", "direction": "asc"}
        });
        let request: EntityFilter = serde_json::from_value(raw).unwrap();
        assert_eq!(request.pagination, Some(Pagination::new(2, 10)));
        assert_eq!(request.sort, Some(Sort::new("email", SortDirection::Asc)));
    }

    #[test]
    fn test_sort_direction_names() {
        assert_eq!(SortDirection::from_name("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::from_name("ascending"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::from_name("up"), None);
    }
}
