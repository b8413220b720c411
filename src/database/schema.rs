//! Collection descriptions: the fields a collection has, how their values
//! are typed, which ones never leave the server and which combinations must
//! be unique.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::filter::filter_order::FilterOrder;
use crate::filter::{FilterData, FilterError, FilterOp};

pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Uuid,
    Text,
    Number,
    Integer,
    Bool,
    Timestamp,
}

impl FieldKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Uuid => "uuid",
            FieldKind::Text => "text",
            FieldKind::Number => "double precision",
            FieldKind::Integer => "bigint",
            FieldKind::Bool => "boolean",
            FieldKind::Timestamp => "timestamptz",
        }
    }
}

#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Stripped from every response and never queryable by clients.
    pub hidden: bool,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, hidden: false }
    }

    pub const fn hidden(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, hidden: true }
    }
}

#[derive(Debug)]
pub struct UniqueIndex {
    /// Constraint name in the SQL schema.
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

#[derive(Debug)]
pub struct Schema {
    pub collection: &'static str,
    pub singular: &'static str,
    pub fields: &'static [Field],
    pub unique: &'static [UniqueIndex],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    pub fn casts(&self) -> HashMap<String, &'static str> {
        self.fields
            .iter()
            .map(|f| (f.name.to_string(), f.kind.sql_type()))
            .collect()
    }

    pub fn unique_index(&self, constraint: &str) -> Option<&UniqueIndex> {
        self.unique.iter().find(|u| u.name == constraint)
    }

    pub fn strip_hidden(&self, mut doc: Document) -> Document {
        for field in self.fields.iter().filter(|f| f.hidden) {
            doc.remove(field.name);
        }
        doc
    }

    fn public_field(&self, name: &str) -> Result<&Field, FilterError> {
        match self.field(name) {
            Some(f) if f.hidden => Err(FilterError::HiddenField(name.to_string())),
            Some(f) => Ok(f),
            None => Err(FilterError::UnknownField(name.to_string())),
        }
    }

    /// Validates a client-built query against this collection and casts its
    /// where-clause values to the field kinds.
    pub fn check_query(&self, mut data: FilterData) -> Result<FilterData, FilterError> {
        if let Some(select) = &data.select {
            for name in select {
                self.public_field(name)?;
            }
        }
        for name in &data.omit {
            self.public_field(name)?;
        }
        if let Some(order) = &data.order {
            for info in FilterOrder::validate_and_parse(order)? {
                self.public_field(&info.column)?;
            }
        }
        if let Some(where_clause) = data.where_clause.take() {
            data.where_clause = Some(self.cast_where(where_clause)?);
        }
        Ok(data)
    }

    fn cast_where(&self, where_clause: Value) -> Result<Value, FilterError> {
        let obj = match where_clause {
            Value::Object(obj) => obj,
            Value::Null => return Ok(Value::Null),
            _ => return Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        };

        let mut out = Map::new();
        for (name, condition) in obj {
            let field = self.public_field(&name)?;
            let cast = match condition {
                Value::Object(ops) => {
                    let mut casted = Map::new();
                    for (op_key, value) in ops {
                        match FilterOp::from_key(&op_key) {
                            Some(FilterOp::In) => {
                                let values = match value {
                                    Value::Array(items) => items,
                                    single => vec![single],
                                };
                                let items = values
                                    .iter()
                                    .map(|v| cast_value(field, v))
                                    .collect::<Result<Vec<_>, _>>()?;
                                casted.insert(op_key, Value::Array(items));
                            }
                            Some(_) => {
                                casted.insert(op_key, cast_value(field, &value)?);
                            }
                            None => return Err(FilterError::UnsupportedOperator(op_key)),
                        }
                    }
                    Value::Object(casted)
                }
                scalar => cast_value(field, &scalar)?,
            };
            out.insert(name, cast);
        }
        Ok(Value::Object(out))
    }

    /// Form fields arrive as text; converts those whose field kind is not
    /// text. Unknown fields are left alone for the whitelist to drop.
    pub fn coerce_form(&self, doc: &mut Document) -> Result<(), FilterError> {
        for (name, value) in doc.iter_mut() {
            if let Some(field) = self.field(name) {
                if field.kind != FieldKind::Text && value.is_string() {
                    *value = cast_value(field, value)?;
                }
            }
        }
        Ok(())
    }
}

pub fn cast_value(field: &Field, value: &Value) -> Result<Value, FilterError> {
    let invalid = || FilterError::InvalidValue {
        field: field.name.to_string(),
        value: match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    };

    match (field.kind, value) {
        (_, Value::Null) => Ok(Value::Null),
        (_, Value::Array(_) | Value::Object(_)) => Err(invalid()),
        (FieldKind::Text, Value::String(_)) => Ok(value.clone()),
        (FieldKind::Text, other) => Ok(Value::String(other.to_string())),
        (FieldKind::Number, Value::Number(_)) => Ok(value.clone()),
        (FieldKind::Number, Value::String(s)) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::from(i));
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(invalid)
        }
        (FieldKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        (FieldKind::Integer, Value::String(s)) => s.trim().parse::<i64>().map(Value::from).map_err(|_| invalid()),
        (FieldKind::Bool, Value::Bool(_)) => Ok(value.clone()),
        (FieldKind::Bool, Value::String(s)) => match s.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        (FieldKind::Uuid, Value::String(s)) => Uuid::parse_str(s.trim())
            .map(|u| Value::String(u.to_string()))
            .map_err(|_| invalid()),
        (FieldKind::Timestamp, Value::String(s)) => parse_timestamp(s.trim())
            .map(|t| Value::String(t.to_rfc3339()))
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}
