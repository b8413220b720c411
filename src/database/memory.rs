use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::schema::{Document, Schema};
use crate::database::store::{DocumentStore, StoreError, Summary};
use crate::filter::filter_order::FilterOrder;
use crate::filter::matcher;
use crate::filter::FilterData;

/// In-process backend with the same query and uniqueness semantics as the
/// Postgres one.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<&'static str, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn id_of(doc: &Document) -> Option<&str> {
        doc.get("id").and_then(Value::as_str)
    }

    fn check_unique(schema: &'static Schema, docs: &[Document], candidate: &Document, skip_id: Option<&str>) -> Result<(), StoreError> {
        for index in schema.unique {
            let key: Vec<&Value> = index
                .fields
                .iter()
                .map(|f| candidate.get(*f).unwrap_or(&Value::Null))
                .collect();
            if key.iter().any(|v| v.is_null()) {
                continue;
            }
            let clash = docs.iter().filter(|d| Self::id_of(d) != skip_id).any(|d| {
                index
                    .fields
                    .iter()
                    .zip(key.iter())
                    .all(|(f, v)| d.get(*f) == Some(*v))
            });
            if clash {
                return Err(StoreError::Duplicate {
                    fields: index.fields.iter().map(|f| f.to_string()).collect(),
                });
            }
        }
        Ok(())
    }

    fn project(doc: &Document, query: &FilterData) -> Document {
        match &query.select {
            Some(select) => doc
                .iter()
                .filter(|(k, _)| select.iter().any(|s| s == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => doc
                .iter()
                .filter(|(k, _)| !query.omit.iter().any(|o| o == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, schema: &'static Schema, query: &FilterData) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let docs = collections.get(schema.collection).map(Vec::as_slice).unwrap_or(&[]);

        let where_clause = query.where_clause.clone().unwrap_or(Value::Null);
        let mut matched = vec![];
        for doc in docs {
            if matcher::matches(doc, &where_clause)? {
                matched.push(doc.clone());
            }
        }

        if let Some(order) = &query.order {
            let infos = FilterOrder::validate_and_parse(order)?;
            matcher::sort_documents(&mut matched, &infos);
        }

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = query.limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);

        Ok(matched
            .iter()
            .skip(offset)
            .take(limit)
            .map(|d| Self::project(d, query))
            .collect())
    }

    async fn find_by_id(&self, schema: &'static Schema, id: Uuid) -> Result<Option<Document>, StoreError> {
        let id = id.to_string();
        let collections = self.collections.read().await;
        Ok(collections
            .get(schema.collection)
            .and_then(|docs| docs.iter().find(|d| Self::id_of(d) == Some(id.as_str())))
            .cloned())
    }

    async fn insert(&self, schema: &'static Schema, doc: Document) -> Result<Document, StoreError> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(schema.collection).or_default();
        Self::check_unique(schema, docs, &doc, None)?;
        docs.push(doc.clone());
        Ok(doc)
    }

    async fn replace(&self, schema: &'static Schema, id: Uuid, mut doc: Document) -> Result<Option<Document>, StoreError> {
        let id = id.to_string();
        let mut collections = self.collections.write().await;
        let docs = collections.entry(schema.collection).or_default();
        let Some(position) = docs.iter().position(|d| Self::id_of(d) == Some(id.as_str())) else {
            return Ok(None);
        };
        doc.insert("id".to_string(), json!(id));
        Self::check_unique(schema, docs, &doc, Some(id.as_str()))?;
        docs[position] = doc.clone();
        Ok(Some(doc))
    }

    async fn set_fields(&self, schema: &'static Schema, id: Uuid, fields: Document) -> Result<Option<Document>, StoreError> {
        let id = id.to_string();
        let mut collections = self.collections.write().await;
        let docs = collections.entry(schema.collection).or_default();
        let Some(position) = docs.iter().position(|d| Self::id_of(d) == Some(id.as_str())) else {
            return Ok(None);
        };

        let mut doc = docs[position].clone();
        for (name, value) in fields.into_iter().filter(|(k, _)| k != "id" && k != "revision") {
            if schema.field(&name).is_none() {
                return Err(crate::filter::FilterError::InvalidColumn(name).into());
            }
            doc.insert(name, value);
        }
        if schema.field("revision").is_some() {
            let revision = doc.get("revision").and_then(Value::as_i64).unwrap_or(0);
            doc.insert("revision".to_string(), json!(revision + 1));
        }

        Self::check_unique(schema, docs, &doc, Some(id.as_str()))?;
        docs[position] = doc.clone();
        Ok(Some(doc))
    }

    async fn delete(&self, schema: &'static Schema, id: Uuid) -> Result<Option<Document>, StoreError> {
        let id = id.to_string();
        let mut collections = self.collections.write().await;
        let docs = collections.entry(schema.collection).or_default();
        let position = docs.iter().position(|d| Self::id_of(d) == Some(id.as_str()));
        Ok(position.map(|p| docs.remove(p)))
    }

    async fn summarize(&self, schema: &'static Schema, where_clause: Value, field: &str) -> Result<Summary, StoreError> {
        let collections = self.collections.read().await;
        let docs = collections.get(schema.collection).map(Vec::as_slice).unwrap_or(&[]);

        let mut count = 0i64;
        let mut total = 0f64;
        let mut numeric = 0usize;
        for doc in docs {
            if matcher::matches(doc, &where_clause)? {
                count += 1;
                if let Some(v) = doc.get(field).and_then(Value::as_f64) {
                    total += v;
                    numeric += 1;
                }
            }
        }

        Ok(Summary {
            count,
            average: (numeric > 0).then(|| total / numeric as f64),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
