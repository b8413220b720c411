use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::database::query_builder::QueryBuilder;
use crate::database::schema::{Document, Schema};
use crate::database::store::{DocumentStore, StoreError, Summary};
use crate::filter::types::{FilterWhereOptions, SqlResult};
use crate::filter::{Filter, FilterData};

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres backend. One table per collection, one column per field, with
/// column names matching the camelCase document keys.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn filter(schema: &'static Schema) -> Result<Filter, StoreError> {
        Ok(Filter::new(schema.collection)?.with_options(FilterWhereOptions { casts: schema.casts() }))
    }

    fn row_object(schema: &'static Schema) -> String {
        let pairs = schema
            .fields
            .iter()
            .map(|f| format!("'{}', \"{}\"", f.name, f.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!("json_build_object({}) AS row", pairs)
    }

    /// Column values in schema order; missing keys bind as NULL.
    fn values(schema: &'static Schema, doc: &Document) -> Vec<Value> {
        schema
            .fields
            .iter()
            .map(|f| doc.get(f.name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn map_error(schema: &'static Schema, err: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let fields = db
                    .constraint()
                    .and_then(|name| schema.unique_index(name))
                    .map(|index| index.fields.iter().map(|f| f.to_string()).collect())
                    .unwrap_or_else(|| vec![db.constraint().unwrap_or("unknown").to_string()]);
                return StoreError::Duplicate { fields };
            }
        }
        StoreError::Database(err)
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find(&self, schema: &'static Schema, query: &FilterData) -> Result<Vec<Document>, StoreError> {
        let mut filter = Self::filter(schema)?;
        filter.assign(query.clone(), &schema.columns())?;
        QueryBuilder::new(filter.to_sql()?).fetch_all(&self.pool).await
    }

    async fn find_by_id(&self, schema: &'static Schema, id: Uuid) -> Result<Option<Document>, StoreError> {
        let mut filter = Self::filter(schema)?;
        filter.assign(FilterData::matching(json!({ "id": id.to_string() })), &schema.columns())?;
        QueryBuilder::new(filter.to_sql()?).fetch_optional(&self.pool).await
    }

    async fn insert(&self, schema: &'static Schema, doc: Document) -> Result<Document, StoreError> {
        let columns = schema.fields.iter().map(|f| format!("\"{}\"", f.name)).collect::<Vec<_>>();
        let placeholders = schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| format!("${}::{}", i + 1, f.kind.sql_type()))
            .collect::<Vec<_>>();
        let query = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING {}",
            schema.collection,
            columns.join(", "),
            placeholders.join(", "),
            Self::row_object(schema)
        );

        let sql = SqlResult { query, params: Self::values(schema, &doc) };
        QueryBuilder::new(sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                StoreError::Database(err) => Self::map_error(schema, err),
                other => other,
            })?
            .ok_or_else(|| StoreError::Malformed("INSERT returned no row".to_string()))
    }

    async fn replace(&self, schema: &'static Schema, id: Uuid, doc: Document) -> Result<Option<Document>, StoreError> {
        let mut params = vec![];
        let mut assignments = vec![];
        for field in schema.fields.iter().filter(|f| f.name != "id") {
            params.push(doc.get(field.name).cloned().unwrap_or(Value::Null));
            assignments.push(format!("\"{}\" = ${}::{}", field.name, params.len(), field.kind.sql_type()));
        }
        params.push(Value::String(id.to_string()));
        let query = format!(
            "UPDATE \"{}\" SET {} WHERE \"id\" = ${}::uuid RETURNING {}",
            schema.collection,
            assignments.join(", "),
            params.len(),
            Self::row_object(schema)
        );

        QueryBuilder::new(SqlResult { query, params })
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                StoreError::Database(err) => Self::map_error(schema, err),
                other => other,
            })
    }

    async fn set_fields(&self, schema: &'static Schema, id: Uuid, fields: Document) -> Result<Option<Document>, StoreError> {
        let mut params = vec![];
        let mut assignments = vec![];
        if schema.field("revision").is_some() {
            assignments.push("\"revision\" = \"revision\" + 1".to_string());
        }
        for (name, value) in fields.into_iter().filter(|(k, _)| k != "id" && k != "revision") {
            let field = schema
                .field(&name)
                .ok_or_else(|| crate::filter::FilterError::InvalidColumn(name.clone()))?;
            params.push(value);
            assignments.push(format!("\"{}\" = ${}::{}", field.name, params.len(), field.kind.sql_type()));
        }
        if assignments.is_empty() {
            return self.find_by_id(schema, id).await;
        }
        params.push(Value::String(id.to_string()));
        let query = format!(
            "UPDATE \"{}\" SET {} WHERE \"id\" = ${}::uuid RETURNING {}",
            schema.collection,
            assignments.join(", "),
            params.len(),
            Self::row_object(schema)
        );

        QueryBuilder::new(SqlResult { query, params })
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match e {
                StoreError::Database(err) => Self::map_error(schema, err),
                other => other,
            })
    }

    async fn delete(&self, schema: &'static Schema, id: Uuid) -> Result<Option<Document>, StoreError> {
        let query = format!(
            "DELETE FROM \"{}\" WHERE \"id\" = $1::uuid RETURNING {}",
            schema.collection,
            Self::row_object(schema)
        );
        QueryBuilder::new(SqlResult { query, params: vec![Value::String(id.to_string())] })
            .fetch_optional(&self.pool)
            .await
    }

    async fn summarize(&self, schema: &'static Schema, where_clause: Value, field: &str) -> Result<Summary, StoreError> {
        let mut filter = Self::filter(schema)?;
        filter.where_clause(where_clause)?;
        let where_sql = filter.to_where_sql()?;
        if !Filter::is_identifier(field) {
            return Err(crate::filter::FilterError::InvalidColumn(field.to_string()).into());
        }

        let query = format!(
            "SELECT COUNT(*) AS count, AVG(\"{}\")::float8 AS average FROM \"{}\" WHERE {}",
            field, schema.collection, where_sql.query
        );
        let row = QueryBuilder::new(SqlResult { query, params: where_sql.params })
            .fetch_row(&self.pool)
            .await?;

        Ok(Summary {
            count: row.try_get("count")?,
            average: row.try_get("average")?,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
