use serde_json::Value;
use sqlx::{self, postgres::PgArguments, PgPool, Row};

use crate::database::schema::Document;
use crate::database::store::StoreError;
use crate::filter::types::SqlResult;

/// Runs a generated statement whose rows carry one JSON column named `row`.
pub struct QueryBuilder {
    sql: SqlResult,
}

impl QueryBuilder {
    pub fn new(sql: SqlResult) -> Self {
        Self { sql }
    }

    pub async fn fetch_all(self, pool: &PgPool) -> Result<Vec<Document>, StoreError> {
        let mut q = sqlx::query(&self.sql.query);
        for p in self.sql.params.iter() {
            q = bind_param_query(q, p);
        }
        let rows = q.fetch_all(pool).await?;
        rows.iter().map(row_document).collect()
    }

    pub async fn fetch_optional(self, pool: &PgPool) -> Result<Option<Document>, StoreError> {
        let mut q = sqlx::query(&self.sql.query);
        for p in self.sql.params.iter() {
            q = bind_param_query(q, p);
        }
        let row = q.fetch_optional(pool).await?;
        row.as_ref().map(row_document).transpose()
    }

    pub async fn fetch_row(self, pool: &PgPool) -> Result<sqlx::postgres::PgRow, StoreError> {
        let mut q = sqlx::query(&self.sql.query);
        for p in self.sql.params.iter() {
            q = bind_param_query(q, p);
        }
        Ok(q.fetch_one(pool).await?)
    }
}

fn row_document(row: &sqlx::postgres::PgRow) -> Result<Document, StoreError> {
    let value: Value = row.try_get("row")?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed(format!("expected a JSON object row, got {}", other))),
    }
}

fn bind_param_query<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()), // JSONB
    }
}
