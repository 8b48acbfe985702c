use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AppError;

pub type Fields = Map<String, Value>;

const SERVER_TIMESTAMP_KEY: &str = "$serverTimestamp";

/// Placeholder the store replaces with its own clock when the write lands.
pub fn server_timestamp() -> Value {
    let mut marker = Map::new();
    marker.insert(SERVER_TIMESTAMP_KEY.to_string(), Value::Bool(true));
    Value::Object(marker)
}

pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.len() == 1 && obj.get(SERVER_TIMESTAMP_KEY) == Some(&Value::Bool(true)))
}

pub fn subcollection_path(collection: &str, id: &str, sub: &str) -> String {
    format!("{collection}/{id}/{sub}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// Collection-scoped document database. Every call is a single attempt;
/// nothing here retries or caches.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts under a store-assigned id and returns that id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, AppError>;

    /// Writes the whole document under a caller-chosen id.
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), AppError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError>;

    async fn list(&self, collection: &str) -> Result<Vec<Document>, AppError>;

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, AppError>;

    /// Merges `patch` into an existing document. Fails with `NotFound` when
    /// the document does not exist.
    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), AppError>;

    /// Removes the document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError>;

    async fn append(
        &self,
        collection: &str,
        id: &str,
        sub: &str,
        fields: Fields,
    ) -> Result<String, AppError> {
        self.create(&subcollection_path(collection, id, sub), fields)
            .await
    }

    async fn list_sub(
        &self,
        collection: &str,
        id: &str,
        sub: &str,
    ) -> Result<Vec<Document>, AppError> {
        self.list(&subcollection_path(collection, id, sub)).await
    }
}
