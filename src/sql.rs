//! Renders a compiled query filter as a PostgreSQL `SELECT` using sea-query.
//!
//! This is the shape the data-access layer runs for a list view when it is not
//! going through Prisma: the same `QueryFilter` becomes the `WHERE` clause, and
//! pagination and sort become `LIMIT`/`OFFSET`/`ORDER BY`.

use crate::compiler::QueryFilter;
use crate::request::{FindManyArgs, SortDirection};
use sea_query::{Asterisk, Expr, Func, Iden, Order, PostgresQueryBuilder, SelectStatement, SimpleExpr, Value};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    #[error("field `{field}`: unsupported operator `{operator}`")]
    UnsupportedOperator { field: String, operator: String },
    #[error("field `{field}`: {reason}")]
    Malformed { field: String, reason: String },
}

impl SqlError {
    fn malformed(field: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// `WHERE` expression for a query filter; the empty filter is `TRUE`
pub fn where_expr(filter: &QueryFilter) -> Result<SimpleExpr, SqlError> {
    object_expr(filter.as_map())
}

/// Full `SELECT * FROM table WHERE ... ORDER BY ... LIMIT ... OFFSET ...`
pub fn select_statement(table: &str, args: &FindManyArgs) -> Result<SelectStatement, SqlError> {
    let mut select = SelectStatement::new();
    select.from(TableName(table.to_string()));
    select.column(Asterisk);

    if !args.filter.is_empty() {
        select.and_where(where_expr(&args.filter)?);
    }

    if let Some(sort) = &args.order_by {
        let order = match sort.direction {
            SortDirection::Asc => Order::Asc,
            SortDirection::Desc => Order::Desc,
        };
        select.order_by(ColumnName(sort.field.clone()), order);
    }

    select.limit(args.take).offset(args.skip);
    Ok(select)
}

/// SQL text for PostgreSQL
pub fn to_postgres(table: &str, args: &FindManyArgs) -> Result<String, SqlError> {
    Ok(select_statement(table, args)?.to_string(PostgresQueryBuilder))
}

fn object_expr(map: &Map<String, JsonValue>) -> Result<SimpleExpr, SqlError> {
    let mut conditions = Vec::with_capacity(map.len());

    for (key, value) in map {
        let expr = match key.as_str() {
            logic @ ("AND" | "OR") => {
                let items = value
                    .as_array()
                    .ok_or_else(|| SqlError::malformed(logic, "expected an array"))?;
                let exprs = items
                    .iter()
                    .map(|item| {
                        item.as_object()
                            .ok_or_else(|| SqlError::malformed(logic, "expected an array of objects"))
                            .and_then(object_expr)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                combine(exprs, logic == "OR")
            }
            field => field_expr(field, value)?,
        };
        conditions.push(expr);
    }

    Ok(combine(conditions, false))
}

/// Join with AND (or OR); an empty AND is `TRUE`, an empty OR is `FALSE`
fn combine(exprs: Vec<SimpleExpr>, any: bool) -> SimpleExpr {
    exprs
        .into_iter()
        .reduce(|acc, expr| if any { acc.or(expr) } else { acc.and(expr) })
        .unwrap_or_else(|| Expr::val(!any).into())
}

fn field_expr(field: &str, constraint: &JsonValue) -> Result<SimpleExpr, SqlError> {
    let ops = constraint
        .as_object()
        .ok_or_else(|| SqlError::malformed(field, "expected an operator object"))?;
    let insensitive = ops.get("mode").and_then(JsonValue::as_str) == Some("insensitive");
    let col = || Expr::col(ColumnName(field.to_string()));

    let mut conditions = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let expr = match op.as_str() {
            "mode" => continue,
            "equals" => col().eq(sql_value(field, operand)?),
            "gt" => col().gt(sql_value(field, operand)?),
            "lt" => col().lt(sql_value(field, operand)?),
            "gte" => col().gte(sql_value(field, operand)?),
            "lte" => col().lte(sql_value(field, operand)?),
            "in" => {
                let items = operand
                    .as_array()
                    .ok_or_else(|| SqlError::malformed(field, "`in` expects an array"))?;
                let values = items
                    .iter()
                    .map(|item| sql_value(field, item))
                    .collect::<Result<Vec<_>, _>>()?;
                col().is_in(values)
            }
            "contains" => like(field, format!("%{}%", like_text(field, operand)?), insensitive),
            "startsWith" => like(field, format!("{}%", like_text(field, operand)?), insensitive),
            "endsWith" => like(field, format!("%{}", like_text(field, operand)?), insensitive),
            other => {
                return Err(SqlError::UnsupportedOperator {
                    field: field.to_string(),
                    operator: other.to_string(),
                })
            }
        };
        conditions.push(expr);
    }

    Ok(combine(conditions, false))
}

/// `LIKE`, or `LOWER(col) LIKE lower(pattern)` when case-insensitive
fn like(field: &str, pattern: String, insensitive: bool) -> SimpleExpr {
    let col = Expr::col(ColumnName(field.to_string()));
    if insensitive {
        Expr::expr(Func::lower(col)).like(pattern.to_lowercase())
    } else {
        col.like(pattern)
    }
}

/// Operand of a LIKE pattern with `%`, `_` and `\` escaped
fn like_text(field: &str, operand: &JsonValue) -> Result<String, SqlError> {
    let text = operand
        .as_str()
        .ok_or_else(|| SqlError::malformed(field, "pattern operators expect a string"))?;
    Ok(text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_"))
}

/// Convert a JSON operand to a sea-query Value
fn sql_value(field: &str, operand: &JsonValue) -> Result<Value, SqlError> {
    match operand {
        JsonValue::String(s) => Ok(Value::String(Some(Box::new(s.clone())))),
        JsonValue::Bool(b) => Ok(Value::Bool(Some(*b))),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::BigInt(Some(i))),
            None => n
                .as_f64()
                .map(|f| Value::Double(Some(f)))
                .ok_or_else(|| SqlError::malformed(field, format!("number {} out of range", n))),
        },
        other => Err(SqlError::malformed(field, format!("unsupported operand {}", other))),
    }
}
