//! Evaluates where clauses and orderings against in-memory documents, with
//! the same semantics the SQL generator gives them.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::error::FilterError;
use super::filter_where::FilterWhere;
use super::types::{FilterOp, FilterOrderInfo, FilterWhereInfo, SortDirection};

pub fn matches(doc: &Map<String, Value>, where_clause: &Value) -> Result<bool, FilterError> {
    let conditions = FilterWhere::parse(where_clause)?;
    Ok(conditions.iter().all(|c| matches_condition(doc, c)))
}

fn matches_condition(doc: &Map<String, Value>, condition: &FilterWhereInfo) -> bool {
    let actual = doc.get(&condition.column).unwrap_or(&Value::Null);
    match condition.operator {
        FilterOp::Eq => {
            if condition.data.is_null() {
                actual.is_null()
            } else {
                compare(actual, &condition.data) == Some(Ordering::Equal)
            }
        }
        FilterOp::Gt => compare(actual, &condition.data) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(compare(actual, &condition.data), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => compare(actual, &condition.data) == Some(Ordering::Less),
        FilterOp::Lte => matches!(compare(actual, &condition.data), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::In => match &condition.data {
            Value::Array(values) => values.iter().any(|v| compare(actual, v) == Some(Ordering::Equal)),
            single => compare(actual, single) == Some(Ordering::Equal),
        },
    }
}

/// Orders two JSON values. Strings that both parse as timestamps compare
/// chronologically; values of different kinds, and nulls, do not compare.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc))
}

/// Stable sort; nulls and incomparable values sort last in either direction.
pub fn sort_documents(docs: &mut [Map<String, Value>], order: &[FilterOrderInfo]) {
    docs.sort_by(|a, b| {
        for info in order {
            let left = a.get(&info.column).unwrap_or(&Value::Null);
            let right = b.get(&info.column).unwrap_or(&Value::Null);
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let natural = compare(left, right).unwrap_or(Ordering::Equal);
                    match info.sort {
                        SortDirection::Asc => natural,
                        SortDirection::Desc => natural.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
