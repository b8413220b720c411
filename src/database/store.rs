use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::database::schema::{Document, Schema};
use crate::filter::{FilterData, FilterError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate value for unique fields: {}", fields.join(", "))]
    Duplicate { fields: Vec<String> },

    #[error("Query error: {0}")]
    Query(#[from] FilterError),

    #[error("Stored document is malformed: {0}")]
    Malformed(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Count and mean of one numeric field over the matching documents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: i64,
    pub average: Option<f64>,
}

/// Persistence seam. Works on plain JSON documents described by a
/// [`Schema`]; typing happens in the repository above it.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, schema: &'static Schema, query: &FilterData) -> Result<Vec<Document>, StoreError>;

    async fn find_by_id(&self, schema: &'static Schema, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Inserts a complete document, enforcing the schema's unique indexes.
    async fn insert(&self, schema: &'static Schema, doc: Document) -> Result<Document, StoreError>;

    /// Replaces every field of the document with the given id.
    async fn replace(&self, schema: &'static Schema, id: Uuid, doc: Document) -> Result<Option<Document>, StoreError>;

    /// Writes only the given fields of one document and bumps its revision.
    /// Every other stored field is left as it is.
    async fn set_fields(&self, schema: &'static Schema, id: Uuid, fields: Document) -> Result<Option<Document>, StoreError>;

    async fn delete(&self, schema: &'static Schema, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn summarize(&self, schema: &'static Schema, where_clause: Value, field: &str) -> Result<Summary, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
