pub mod agents;
pub mod shipments;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::backend::document::{Document, Fields};
use crate::error::AppError;

pub(crate) fn to_fields<T: Serialize>(value: &T) -> Result<Fields, AppError> {
    match serde_json::to_value(value).map_err(AppError::serialization)? {
        Value::Object(fields) => Ok(fields),
        other => Err(AppError::Internal(format!(
            "expected a document object, got {other}"
        ))),
    }
}

/// Decodes a document, exposing its store id as the `id` field.
pub(crate) fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, AppError> {
    let Document { id, mut fields } = doc;
    fields.insert("id".to_string(), Value::String(id));
    serde_json::from_value(Value::Object(fields)).map_err(AppError::serialization)
}

pub(crate) fn from_documents<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>, AppError> {
    docs.into_iter().map(from_document).collect()
}
