//! Filter compiler that turns a `FilterGroup` into a Prisma-style `WhereInput` object.
//!
//! Compilation is a single pass over the tree. Conditions that cannot constrain
//! anything yet (no field, no operator, no value, half a range) are dropped and
//! reported in [`Compiled::dropped`] instead of failing the whole filter.

use crate::model::{ConditionValue, FilterCondition, FilterGroup, Operator, Scalar};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Keys allowed inside a field constraint of the compiled filter
pub const OPERATOR_KEYS: [&str; 10] = [
    "equals",
    "contains",
    "startsWith",
    "endsWith",
    "gt",
    "lt",
    "gte",
    "lte",
    "in",
    "mode",
];

/// Compiled filter object handed to the data-access layer
///
/// Either empty (no constraint), a `{ "AND" | "OR": [...] }` combinator, or a
/// `{ field: { operator: value } }` constraint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryFilter(Map<String, Value>);

impl QueryFilter {
    pub fn empty() -> Self {
        Self(Map::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<QueryFilter> for Value {
    fn from(filter: QueryFilter) -> Self {
        Value::Object(filter.0)
    }
}

impl TryFrom<Value> for QueryFilter {
    type Error = ValidationError;

    /// Accepts any object that passes [`validate`]
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => {
                let filter = QueryFilter(map);
                validate(&filter)?;
                Ok(filter)
            }
            other => Err(ValidationError {
                reasons: vec![format!("$: expected an object, found {}", json_kind(&other))],
            }),
        }
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

/// Why a condition contributed nothing to the compiled filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    MissingField,
    MissingOperator,
    MissingValue,
    /// `between` with only one bound
    IncompleteRange,
    /// The value has a shape the operator cannot use
    ValueShape,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingField => "no field selected",
            Self::MissingOperator => "no operator selected",
            Self::MissingValue => "no value entered",
            Self::IncompleteRange => "range is missing a bound",
            Self::ValueShape => "value does not fit the operator",
        };
        f.write_str(text)
    }
}

/// A condition left out of the compiled filter
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedCondition {
    /// Builder path of the condition, e.g. `g0.c1`
    pub path: String,
    pub field_id: String,
    pub reason: DropReason,
}

impl fmt::Display for DroppedCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field_id.is_empty() {
            write!(f, "{}: {}", self.path, self.reason)
        } else {
            write!(f, "{} ({}): {}", self.path, self.field_id, self.reason)
        }
    }
}

/// Result of compilation with the conditions that were left out
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub filter: QueryFilter,
    pub dropped: Vec<DroppedCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid query filter: {}", reasons.join("; "))]
pub struct ValidationError {
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("compiled filter failed validation: {0}")]
    InvalidOutput(#[from] ValidationError),
}

/// Configuration for the compiler
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Attach `mode: "insensitive"` to `contains` constraints
    pub insensitive_contains: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            insensitive_contains: true,
        }
    }
}

/// Compiler from `FilterGroup` trees to `QueryFilter` objects
#[derive(Debug, Clone, Default)]
pub struct FilterCompiler {
    config: CompilerConfig,
}

impl FilterCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Compile a group into a query filter.
    ///
    /// Fails only when the generated object does not pass [`validate`].
    pub fn compile(&self, group: &FilterGroup) -> Result<Compiled, CompileError> {
        let mut dropped = Vec::new();
        let filter = QueryFilter(self.compile_group(group, "", &mut dropped));
        validate(&filter)?;

        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), "conditions left out of compiled filter");
        }
        Ok(Compiled { filter, dropped })
    }

    /// Structural check of a compiled filter; see [`validate`]
    pub fn validate(&self, filter: &QueryFilter) -> Result<(), ValidationError> {
        validate(filter)
    }

    fn compile_group(
        &self,
        group: &FilterGroup,
        prefix: &str,
        dropped: &mut Vec<DroppedCondition>,
    ) -> Map<String, Value> {
        if group.is_empty() {
            return Map::new();
        }

        let mut parts = Vec::with_capacity(group.conditions.len() + group.groups.len());

        for (i, condition) in group.conditions.iter().enumerate() {
            match self.compile_condition(condition) {
                Ok(fragment) => parts.push(fragment),
                Err(reason) => {
                    let path = format!("{}c{}", prefix, i);
                    debug!(%path, field = %condition.field_id, %reason, "dropping condition");
                    dropped.push(DroppedCondition {
                        path,
                        field_id: condition.field_id.clone(),
                        reason,
                    });
                }
            }
        }

        for (i, nested) in group.groups.iter().enumerate() {
            let fragment = self.compile_group(nested, &format!("{}g{}.", prefix, i), dropped);
            if !fragment.is_empty() {
                parts.push(fragment);
            }
        }

        match parts.len() {
            0 => Map::new(),
            1 => parts.pop().unwrap_or_default(),
            _ => {
                let items = parts.into_iter().map(Value::Object).collect();
                let mut combined = Map::new();
                combined.insert(group.logic.key().to_string(), Value::Array(items));
                combined
            }
        }
    }

    fn compile_condition(&self, condition: &FilterCondition) -> Result<Map<String, Value>, DropReason> {
        let field = condition.field_id.as_str();
        if field.trim().is_empty() {
            return Err(DropReason::MissingField);
        }
        let operator = condition.operator.ok_or(DropReason::MissingOperator)?;
        let value = condition.value.as_ref().ok_or(DropReason::MissingValue)?;

        match (operator, value) {
            (Operator::Between, ConditionValue::Range(range)) => match (&range.min, &range.max) {
                (Some(min), Some(max)) => Ok(between(field, scalar_json(min), scalar_json(max))),
                _ => Err(DropReason::IncompleteRange),
            },
            (Operator::Between, ConditionValue::DateRange(range)) => match (range.start, range.end) {
                (Some(start), Some(end)) => Ok(between(field, date_json(start), date_json(end))),
                _ => Err(DropReason::IncompleteRange),
            },
            (Operator::Between, _) => Err(DropReason::ValueShape),
            (Operator::In, ConditionValue::List(items)) => {
                let items = items.iter().map(scalar_json).collect();
                Ok(constraint(field, [("in", Value::Array(items))]))
            }
            (Operator::In, ConditionValue::Scalar(single)) => {
                Ok(constraint(field, [("in", Value::Array(vec![scalar_json(single)]))]))
            }
            (Operator::In, _) => Err(DropReason::ValueShape),
            (operator, ConditionValue::Scalar(scalar)) => self.compile_comparison(field, operator, scalar),
            _ => Err(DropReason::ValueShape),
        }
    }

    /// Single-value operators. Pattern operators only take text.
    fn compile_comparison(
        &self,
        field: &str,
        operator: Operator,
        value: &Scalar,
    ) -> Result<Map<String, Value>, DropReason> {
        let is_pattern = matches!(operator, Operator::Contains | Operator::StartsWith | Operator::EndsWith);
        if is_pattern && value.as_text().is_none() {
            return Err(DropReason::ValueShape);
        }
        let value = scalar_json(value);
        let fragment = match operator {
            Operator::Equals => constraint(field, [("equals", value)]),
            Operator::Contains if self.config.insensitive_contains => constraint(
                field,
                [("contains", value), ("mode", Value::String("insensitive".to_string()))],
            ),
            Operator::Contains => constraint(field, [("contains", value)]),
            Operator::StartsWith => constraint(field, [("startsWith", value)]),
            Operator::EndsWith => constraint(field, [("endsWith", value)]),
            Operator::GreaterThan => constraint(field, [("gt", value)]),
            Operator::LessThan => constraint(field, [("lt", value)]),
            Operator::Between | Operator::In => return Err(DropReason::ValueShape),
        };
        Ok(fragment)
    }
}

/// `{ field: { key: value, ... } }`
fn constraint<const N: usize>(field: &str, entries: [(&str, Value); N]) -> Map<String, Value> {
    let ops: Map<String, Value> = entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    let mut fragment = Map::new();
    fragment.insert(field.to_string(), Value::Object(ops));
    fragment
}

/// `{ AND: [{ field: { gte: low } }, { field: { lte: high } }] }`
fn between(field: &str, low: Value, high: Value) -> Map<String, Value> {
    let bounds = vec![
        Value::Object(constraint(field, [("gte", low)])),
        Value::Object(constraint(field, [("lte", high)])),
    ];
    let mut fragment = Map::new();
    fragment.insert("AND".to_string(), Value::Array(bounds));
    fragment
}

fn scalar_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Number(n) => Value::Number(n.clone()),
        Scalar::Date(d) => date_json(*d),
        Scalar::Text(s) => Value::String(s.clone()),
    }
}

/// Dates compare against UTC midnight, as DateTime columns expect
fn date_json(date: NaiveDate) -> Value {
    Value::String(format!("{}T00:00:00Z", date.format("%Y-%m-%d")))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Structural check of a query filter.
///
/// `AND` / `OR` must hold arrays of objects that validate themselves; every
/// other key is a field whose value is an object of [`OPERATOR_KEYS`].
pub fn validate(filter: &QueryFilter) -> Result<(), ValidationError> {
    let mut reasons = Vec::new();
    check_object(filter.as_map(), "$", &mut reasons);

    if reasons.is_empty() {
        return Ok(());
    }
    for reason in &reasons {
        warn!(%reason, "query filter failed validation");
    }
    Err(ValidationError { reasons })
}

fn check_object(map: &Map<String, Value>, path: &str, reasons: &mut Vec<String>) {
    for (key, value) in map {
        let here = format!("{}.{}", path, key);
        match key.as_str() {
            "AND" | "OR" => match value {
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let at = format!("{}[{}]", here, i);
                        match item {
                            Value::Object(inner) => check_object(inner, &at, reasons),
                            other => reasons.push(format!("{}: expected an object, found {}", at, json_kind(other))),
                        }
                    }
                }
                other => reasons.push(format!("{}: expected an array, found {}", here, json_kind(other))),
            },
            _ => match value {
                Value::Object(ops) => {
                    for op in ops.keys() {
                        if !OPERATOR_KEYS.contains(&op.as_str()) {
                            reasons.push(format!("{}: unknown operator `{}`", here, op));
                        }
                    }
                }
                other => reasons.push(format!("{}: expected an object, found {}", here, json_kind(other))),
            },
        }
    }
}
