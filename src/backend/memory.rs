use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::backend::document::{is_server_timestamp, Document, DocumentStore, Fields};
use crate::error::AppError;
use crate::models::timestamp::StoreTimestamp;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DocKey {
    collection: String,
    id: String,
}

impl DocKey {
    fn new(collection: &str, id: &str) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    fields: Fields,
}

/// In-process document store. Listings come back in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<DocKey, StoredDocument>,
    sequence: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.documents
            .iter()
            .filter(|entry| entry.key().collection == collection)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn collect<F>(&self, collection: &str, keep: F) -> Vec<Document>
    where
        F: Fn(&Fields) -> bool,
    {
        let mut matches: Vec<(u64, Document)> = self
            .documents
            .iter()
            .filter(|entry| entry.key().collection == collection && keep(&entry.value().fields))
            .map(|entry| {
                (
                    entry.value().seq,
                    Document {
                        id: entry.key().id.clone(),
                        fields: entry.value().fields.clone(),
                    },
                )
            })
            .collect();

        matches.sort_by_key(|(seq, _)| *seq);
        matches.into_iter().map(|(_, doc)| doc).collect()
    }
}

fn resolve_server_timestamps(fields: &mut Fields) -> Result<(), AppError> {
    let now = serde_json::to_value(StoreTimestamp::now()).map_err(AppError::serialization)?;
    for value in fields.values_mut() {
        resolve_value(value, &now);
    }
    Ok(())
}

fn resolve_value(value: &mut Value, now: &Value) {
    if is_server_timestamp(value) {
        *value = now.clone();
        return;
    }

    match value {
        Value::Object(map) => map.values_mut().for_each(|v| resolve_value(v, now)),
        Value::Array(items) => items.iter_mut().for_each(|v| resolve_value(v, now)),
        _ => {}
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, collection: &str, mut fields: Fields) -> Result<String, AppError> {
        resolve_server_timestamps(&mut fields)?;

        let id = Uuid::new_v4().simple().to_string();
        let seq = self.next_seq();
        self.documents
            .insert(DocKey::new(collection, &id), StoredDocument { seq, fields });
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, mut fields: Fields) -> Result<(), AppError> {
        resolve_server_timestamps(&mut fields)?;

        let key = DocKey::new(collection, id);
        let seq = match self.documents.get(&key) {
            Some(existing) => existing.seq,
            None => self.next_seq(),
        };
        self.documents.insert(key, StoredDocument { seq, fields });
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        Ok(self
            .documents
            .get(&DocKey::new(collection, id))
            .map(|stored| Document {
                id: id.to_string(),
                fields: stored.fields.clone(),
            }))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, AppError> {
        Ok(self.collect(collection, |_| true))
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, AppError> {
        Ok(self.collect(collection, |fields| fields.get(field) == Some(value)))
    }

    async fn update(&self, collection: &str, id: &str, mut patch: Fields) -> Result<(), AppError> {
        resolve_server_timestamps(&mut patch)?;

        let mut stored = self
            .documents
            .get_mut(&DocKey::new(collection, id))
            .ok_or_else(|| AppError::NotFound(format!("{collection}/{id} not found")))?;

        for (key, value) in patch {
            stored.fields.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.documents.remove(&DocKey::new(collection, id));
        Ok(())
    }
}
