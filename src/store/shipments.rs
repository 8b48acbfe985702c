use std::sync::Arc;

use serde_json::{json, Value};

use crate::backend::document::{server_timestamp, DocumentStore, Fields};
use crate::error::AppError;
use crate::models::shipment::{
    Feedback, GeoLocation, ProofOfDelivery, Shipment, ShipmentPatch, ShipmentStatus, StatusUpdate,
};
use crate::store::{from_document, from_documents, to_fields};

pub const SHIPMENTS: &str = "shipments";
pub const STATUS_UPDATES: &str = "updates";
pub const PROOFS: &str = "pods";
pub const FEEDBACK: &str = "feedback";

/// Typed access to the `shipments` collection and its append-only
/// subcollections.
#[derive(Clone)]
pub struct ShipmentStore {
    documents: Arc<dyn DocumentStore>,
}

impl ShipmentStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn create(&self, shipment: &Shipment) -> Result<String, AppError> {
        let mut fields = to_fields(shipment)?;
        fields.remove("id");
        fields.insert("createdAt".to_string(), server_timestamp());

        self.documents.create(SHIPMENTS, fields).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Shipment>, AppError> {
        self.documents
            .get(SHIPMENTS, id)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<Shipment>, AppError> {
        from_documents(self.documents.list(SHIPMENTS).await?)
    }

    pub async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<Shipment>, AppError> {
        let docs = self
            .documents
            .query(SHIPMENTS, "agentId", &json!(agent_id))
            .await?;
        from_documents(docs)
    }

    /// First shipment carrying `tracking_id`, if any.
    pub async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Option<Shipment>, AppError> {
        let docs = self
            .documents
            .query(SHIPMENTS, "trackingId", &json!(tracking_id))
            .await?;
        docs.into_iter().next().map(from_document).transpose()
    }

    pub async fn update(&self, id: &str, patch: &ShipmentPatch) -> Result<(), AppError> {
        let fields = to_fields(patch)?;
        if fields.is_empty() {
            return Ok(());
        }
        self.documents.update(SHIPMENTS, id, fields).await
    }

    /// Writes status and last location together; a missing location clears it.
    pub async fn set_status(
        &self,
        id: &str,
        status: ShipmentStatus,
        location: Option<&GeoLocation>,
    ) -> Result<(), AppError> {
        let mut fields = Fields::new();
        fields.insert("status".to_string(), json!(status));
        fields.insert("lastLocation".to_string(), location_value(location)?);
        self.documents.update(SHIPMENTS, id, fields).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.documents.delete(SHIPMENTS, id).await
    }

    pub async fn append_status_update(
        &self,
        id: &str,
        status: ShipmentStatus,
        location: Option<&GeoLocation>,
    ) -> Result<String, AppError> {
        let mut fields = Fields::new();
        fields.insert("status".to_string(), json!(status));
        fields.insert("location".to_string(), location_value(location)?);
        fields.insert("at".to_string(), server_timestamp());
        self.documents
            .append(SHIPMENTS, id, STATUS_UPDATES, fields)
            .await
    }

    pub async fn append_proof(&self, id: &str, url: &str) -> Result<String, AppError> {
        let mut fields = Fields::new();
        fields.insert("url".to_string(), json!(url));
        fields.insert("at".to_string(), server_timestamp());
        self.documents.append(SHIPMENTS, id, PROOFS, fields).await
    }

    pub async fn append_feedback(
        &self,
        id: &str,
        rating: u8,
        comments: &str,
    ) -> Result<String, AppError> {
        let mut fields = Fields::new();
        fields.insert("rating".to_string(), json!(rating));
        fields.insert("comments".to_string(), json!(comments));
        fields.insert("at".to_string(), server_timestamp());
        self.documents.append(SHIPMENTS, id, FEEDBACK, fields).await
    }

    pub async fn status_updates(&self, id: &str) -> Result<Vec<StatusUpdate>, AppError> {
        from_documents(self.documents.list_sub(SHIPMENTS, id, STATUS_UPDATES).await?)
    }

    pub async fn proofs(&self, id: &str) -> Result<Vec<ProofOfDelivery>, AppError> {
        from_documents(self.documents.list_sub(SHIPMENTS, id, PROOFS).await?)
    }

    pub async fn feedback(&self, id: &str) -> Result<Vec<Feedback>, AppError> {
        from_documents(self.documents.list_sub(SHIPMENTS, id, FEEDBACK).await?)
    }
}

fn location_value(location: Option<&GeoLocation>) -> Result<Value, AppError> {
    match location {
        Some(location) => serde_json::to_value(location).map_err(AppError::serialization),
        None => Ok(Value::Null),
    }
}
