//! Filter expression model shared by the compiler, the builder and the saved-filter store.
//!
//! A filter is a tree: a [`FilterGroup`] combines its [`FilterCondition`] leaves and its
//! nested groups under one [`Logic`]. Nested groups sit behind `Arc` so that an edit
//! only copies the path from the root to the edited node.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;

/// Value type of a filterable field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition operators offered by the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    Between,
    In,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::Equals,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::Between,
        Operator::In,
    ];

    /// Wire name, as the list view sends it
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::Between => "between",
            Self::In => "in",
        }
    }

    /// Parse a wire name. Matching is exact, like the JSON the list view sends.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a group combines its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Logic {
    #[default]
    #[serde(rename = "AND", alias = "and", alias = "And")]
    And,
    #[serde(rename = "OR", alias = "or", alias = "Or")]
    Or,
}

impl Logic {
    /// Key used in the compiled query filter
    pub fn key(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single value entered into a condition
///
/// Dates serialize as `YYYY-MM-DD` but every JSON string deserializes as
/// text; [`Scalar::for_field_type`] turns it back into a date for date fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    Date(NaiveDate),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireScalar {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match WireScalar::deserialize(deserializer)? {
            WireScalar::Bool(b) => Self::Bool(b),
            WireScalar::Number(n) => Self::Number(n),
            WireScalar::Text(s) => Self::Text(s),
        })
    }
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// `None` for NaN and infinities
    pub fn float(value: f64) -> Option<Self> {
        serde_json::Number::from_f64(value).map(Self::Number)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Read the value the way a field of `field_type` stores it.
    ///
    /// Date fields parse `YYYY-MM-DD` text; string fields take numbers and
    /// dates as their text. Anything else is returned unchanged.
    pub fn for_field_type(self, field_type: FieldType) -> Self {
        match (field_type, self) {
            (FieldType::Date, Self::Text(text)) => match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
                Ok(date) => Self::Date(date),
                Err(_) => Self::Text(text),
            },
            (FieldType::String, Self::Number(n)) => Self::Text(n.to_string()),
            (FieldType::String, Self::Date(d)) => Self::Text(d.format("%Y-%m-%d").to_string()),
            (_, other) => other,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

/// `{min, max}` bounds of a numeric `between`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumberRange {
    pub min: Option<Scalar>,
    pub max: Option<Scalar>,
}

/// `{start, end}` bounds of a date `between`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Value of a condition, tagged by the shape its operator expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
    DateRange(DateRange),
    Range(NumberRange),
}

impl ConditionValue {
    pub fn range(min: impl Into<Scalar>, max: impl Into<Scalar>) -> Self {
        Self::Range(NumberRange {
            min: Some(min.into()),
            max: Some(max.into()),
        })
    }

    pub fn dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self::DateRange(DateRange {
            start: Some(start),
            end: Some(end),
        })
    }

    pub fn list<T: Into<Scalar>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Apply [`Scalar::for_field_type`] to every scalar of the value
    pub fn for_field_type(self, field_type: FieldType) -> Self {
        match self {
            Self::Scalar(s) => Self::Scalar(s.for_field_type(field_type)),
            Self::List(items) => Self::List(items.into_iter().map(|s| s.for_field_type(field_type)).collect()),
            other => other,
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn bound<T: fmt::Display>(f: &mut fmt::Formatter<'_>, value: &Option<T>) -> fmt::Result {
            match value {
                Some(v) => write!(f, "{}", v),
                None => Ok(()),
            }
        }

        match self {
            Self::Scalar(s) => write!(f, "{}", s),
            Self::List(items) => {
                let rendered: Vec<String> = items.iter().map(|s| s.to_string()).collect();
                write!(f, "({})", rendered.join(", "))
            }
            Self::Range(r) => {
                bound(f, &r.min)?;
                f.write_str("..")?;
                bound(f, &r.max)
            }
            Self::DateRange(r) => {
                bound(f, &r.start.map(|d| d.format("%Y-%m-%d")))?;
                f.write_str("..")?;
                bound(f, &r.end.map(|d| d.format("%Y-%m-%d")))
            }
        }
    }
}

impl From<Scalar> for ConditionValue {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<i64> for ConditionValue {
    fn from(value: i64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<i32> for ConditionValue {
    fn from(value: i32) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<NaiveDate> for ConditionValue {
    fn from(value: NaiveDate) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<NumberRange> for ConditionValue {
    fn from(value: NumberRange) -> Self {
        Self::Range(value)
    }
}

impl From<DateRange> for ConditionValue {
    fn from(value: DateRange) -> Self {
        Self::DateRange(value)
    }
}

/// Leaf of the expression tree: `field operator value`
///
/// A freshly added condition has an empty `field_id` and neither operator nor value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    #[serde(default)]
    pub field_id: String,
    #[serde(default, deserialize_with = "lenient_operator")]
    pub operator: Option<Operator>,
    #[serde(default)]
    pub value: Option<ConditionValue>,
}

impl FilterCondition {
    pub fn new(field_id: impl Into<String>, operator: Operator, value: impl Into<ConditionValue>) -> Self {
        Self {
            field_id: field_id.into(),
            operator: Some(operator),
            value: Some(value.into()),
        }
    }

    /// Condition whose value has not been entered yet
    pub fn pending(field_id: impl Into<String>, operator: Operator) -> Self {
        Self {
            field_id: field_id.into(),
            operator: Some(operator),
            value: None,
        }
    }

    pub fn blank() -> Self {
        Self::default()
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = if self.field_id.is_empty() { "?" } else { &self.field_id };
        let operator = self.operator.map(|op| op.as_str()).unwrap_or("?");
        match &self.value {
            Some(value) => write!(f, "{} {} {}", field, operator, value),
            None => write!(f, "{} {} _", field, operator),
        }
    }
}

/// Empty, `null` and unknown operator names all mean "no operator selected".
fn lenient_operator<'de, D>(deserializer: D) -> Result<Option<Operator>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(|name| {
        let operator = Operator::from_name(name);
        if operator.is_none() && !name.is_empty() {
            tracing::debug!(operator = name, "ignoring unrecognized operator");
        }
        operator
    }))
}

/// Boolean combination of conditions and nested groups
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub conditions: Vec<FilterCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Arc<FilterGroup>>,
}

impl FilterGroup {
    pub fn new(logic: Logic) -> Self {
        Self {
            logic,
            conditions: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn and() -> Self {
        Self::new(Logic::And)
    }

    pub fn or() -> Self {
        Self::new(Logic::Or)
    }

    pub fn with_condition(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_group(mut self, group: FilterGroup) -> Self {
        self.groups.push(Arc::new(group));
        self
    }

    /// No conditions and no nested groups: matches everything
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.groups.is_empty()
    }

    /// Number of conditions in this group and all nested groups
    pub fn condition_count(&self) -> usize {
        self.conditions.len() + self.groups.iter().map(|g| g.condition_count()).sum::<usize>()
    }

    /// Render the tree one node per line, with builder paths
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(&mut out, "", 0);
        out
    }

    fn write_outline(&self, out: &mut String, prefix: &str, depth: usize) {
        let indent = "  ".repeat(depth);
        let label = if prefix.is_empty() { "root" } else { prefix.trim_end_matches('.') };
        out.push_str(&format!("{}{} [{}]\n", indent, label, self.logic));
        for (i, condition) in self.conditions.iter().enumerate() {
            out.push_str(&format!("{}  {}c{}: {}\n", indent, prefix, i, condition));
        }
        for (i, group) in self.groups.iter().enumerate() {
            group.write_outline(out, &format!("{}g{}.", prefix, i), depth + 1);
        }
    }
}
