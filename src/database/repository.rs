use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::Entity;
use crate::database::schema::Document;
use crate::database::store::{DocumentStore, StoreError, Summary};
use crate::error::ApiError;
use crate::filter::FilterData;

/// Typed access to one collection.
pub struct Repository<E> {
    store: Arc<dyn DocumentStore>,
    _phantom: std::marker::PhantomData<E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Raw documents, for projected listings that may not hold every field.
    pub async fn select_documents(&self, filter_data: &FilterData) -> Result<Vec<Document>, ApiError> {
        Ok(self.store.find(E::schema(), filter_data).await?)
    }

    pub async fn select_any(&self, where_clause: Value) -> Result<Vec<E>, ApiError> {
        let docs = self.store.find(E::schema(), &FilterData::matching(where_clause)).await?;
        docs.into_iter().map(decode::<E>).collect()
    }

    pub async fn select_one(&self, where_clause: Value) -> Result<Option<E>, ApiError> {
        let filter_data = FilterData {
            limit: Some(1),
            ..FilterData::matching(where_clause)
        };
        let docs = self.store.find(E::schema(), &filter_data).await?;
        docs.into_iter().next().map(decode::<E>).transpose()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<E>, ApiError> {
        self.store.find_by_id(E::schema(), id).await?.map(decode::<E>).transpose()
    }

    pub async fn select_404(&self, id: Uuid) -> Result<E, ApiError> {
        self.find_by_id(id).await?.ok_or_else(not_found::<E>)
    }

    /// Inserts a fully built entity after preparing and validating it.
    pub async fn insert(&self, mut entity: E) -> Result<E, ApiError> {
        entity.prepare();
        entity.check()?;
        let doc = self.store.insert(E::schema(), encode(&entity)?).await?;
        decode(doc)
    }

    /// Builds an entity from client input: only `E::CREATE_FIELDS` are taken
    /// from `input`, `forced` fields are applied on top, then identity and
    /// timestamp are assigned.
    pub async fn create(&self, input: Document, forced: Document, now: DateTime<Utc>) -> Result<E, ApiError> {
        let mut doc = whitelist(input, E::CREATE_FIELDS);
        doc.extend(forced);
        doc.insert("id".to_string(), json!(Uuid::new_v4()));
        doc.insert("createdAt".to_string(), json!(now));
        doc.insert("revision".to_string(), json!(0));

        let entity: E = serde_json::from_value(Value::Object(doc))
            .map_err(|e| ApiError::validation(format!("Invalid input data. {}", e)))?;
        self.insert(entity).await
    }

    /// Partial update: `allowed` fields of `changes` are merged over the
    /// stored document and the merged entity is re-validated. Only those
    /// fields and the derived ones are written back, so concurrent writes to
    /// other fields are kept.
    pub async fn update(&self, id: Uuid, changes: Document, allowed: &[&str]) -> Result<E, ApiError> {
        let changes = whitelist(changes, allowed);
        let existing = self.select_404(id).await?;
        let mut doc = encode(&existing)?;
        doc.extend(changes.clone());

        let mut entity: E = serde_json::from_value(Value::Object(doc))
            .map_err(|e| ApiError::validation(format!("Invalid input data. {}", e)))?;
        entity.prepare();
        entity.check()?;

        let prepared = encode(&entity)?;
        let written: Document = prepared
            .into_iter()
            .filter(|(k, _)| changes.contains_key(k) || E::DERIVED_FIELDS.contains(&k.as_str()))
            .collect();
        self.set_fields(id, written).await
    }

    /// Writes the given fields unchecked, leaving the rest of the stored
    /// document untouched.
    pub async fn set_fields(&self, id: Uuid, fields: Document) -> Result<E, ApiError> {
        let saved = self
            .store
            .set_fields(E::schema(), id, fields)
            .await?
            .ok_or_else(not_found::<E>)?;
        decode(saved)
    }

    /// Writes every field of an existing entity, bumping its revision.
    pub async fn save(&self, mut entity: E) -> Result<E, ApiError> {
        entity.prepare();
        entity.check()?;
        let mut doc = encode(&entity)?;
        let revision = doc.get("revision").and_then(Value::as_i64).unwrap_or(0);
        doc.insert("revision".to_string(), json!(revision + 1));

        let saved = self
            .store
            .replace(E::schema(), entity.id(), doc)
            .await?
            .ok_or_else(not_found::<E>)?;
        decode(saved)
    }

    pub async fn delete(&self, id: Uuid) -> Result<E, ApiError> {
        let doc = self.store.delete(E::schema(), id).await?.ok_or_else(not_found::<E>)?;
        decode(doc)
    }

    pub async fn summarize(&self, where_clause: Value, field: &str) -> Result<Summary, ApiError> {
        Ok(self.store.summarize(E::schema(), where_clause, field).await?)
    }

    /// The client-facing form of an entity, hidden fields removed.
    pub fn present(entity: &E) -> Result<Value, ApiError> {
        Ok(Value::Object(E::schema().strip_hidden(encode(entity)?)))
    }
}

pub fn not_found<E: Entity>() -> ApiError {
    ApiError::not_found(format!("No {} found with that ID", E::schema().singular))
}

fn whitelist(input: Document, allowed: &[&str]) -> Document {
    input.into_iter().filter(|(k, _)| allowed.contains(&k.as_str())).collect()
}

fn encode<E: Entity>(entity: &E) -> Result<Document, ApiError> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ApiError::internal(StoreError::Malformed(format!("entity encoded as {}", other)))),
        Err(e) => Err(ApiError::internal(e)),
    }
}

fn decode<E: Entity>(doc: Document) -> Result<E, ApiError> {
    serde_json::from_value(Value::Object(doc)).map_err(|e| ApiError::internal(StoreError::Malformed(e.to_string())))
}
