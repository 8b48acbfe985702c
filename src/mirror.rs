//! Flat projections written to the realtime mirror.
//!
//! The mirror always receives whole nodes. Partial patches would let the
//! mirror drift from the primary record field by field.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::backend::mirror::RealtimeMirror;
use crate::error::AppError;
use crate::models::agent::{Agent, AgentStatus};
use crate::models::shipment::{GeoLocation, Shipment, ShipmentStatus};

pub fn shipment_path(tracking_id: &str) -> String {
    format!("shipments/{tracking_id}")
}

pub fn agent_path(agent_id: &str) -> String {
    format!("agents/{agent_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentMirror {
    pub tracking_id: String,
    pub sender_name: String,
    pub receiver_name: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub status: ShipmentStatus,
    pub contact_number: String,
    pub agent_id: String,
    pub customer_email: String,
    pub last_location: Option<GeoLocation>,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl ShipmentMirror {
    /// Projects a primary record. A record without a server timestamp yet
    /// gets the current time.
    pub fn from_primary(shipment: &Shipment) -> Self {
        Self {
            tracking_id: shipment.tracking_id.clone(),
            sender_name: shipment.sender_name.clone(),
            receiver_name: shipment.receiver_name.clone(),
            pickup_address: shipment.pickup_address.clone(),
            delivery_address: shipment.delivery_address.clone(),
            status: shipment.status,
            contact_number: shipment.contact_number.clone(),
            agent_id: shipment.agent_id.clone().unwrap_or_default(),
            customer_email: shipment.customer_email.clone().unwrap_or_default(),
            last_location: shipment.last_location.clone(),
            created_at: shipment
                .created_at
                .map(|at| at.as_millis())
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
        }
    }

    pub fn with_status(mut self, status: ShipmentStatus, location: Option<GeoLocation>) -> Self {
        self.status = status;
        self.last_location = location;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMirror {
    pub id: String,
    pub name: String,
    pub email: String,
    pub status: AgentStatus,
}

impl AgentMirror {
    pub fn from_primary(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            email: agent.email.clone(),
            status: agent.status,
        }
    }
}

#[derive(Clone)]
pub struct MirrorSync {
    mirror: Arc<dyn RealtimeMirror>,
}

impl MirrorSync {
    pub fn new(mirror: Arc<dyn RealtimeMirror>) -> Self {
        Self { mirror }
    }

    /// Writes `snapshot` under the tracking id the caller holds, which is the
    /// key the node was created under.
    pub async fn write_shipment(
        &self,
        tracking_id: &str,
        snapshot: &ShipmentMirror,
    ) -> Result<(), AppError> {
        if snapshot.tracking_id != tracking_id {
            tracing::warn!(
                key = %tracking_id,
                record_tracking_id = %snapshot.tracking_id,
                "mirror key differs from record tracking id"
            );
        }
        let value = serde_json::to_value(snapshot).map_err(AppError::serialization)?;
        self.mirror.set(&shipment_path(tracking_id), value).await
    }

    pub async fn remove_shipment(&self, tracking_id: &str) -> Result<(), AppError> {
        self.mirror.remove(&shipment_path(tracking_id)).await
    }

    pub async fn write_agent(&self, snapshot: &AgentMirror) -> Result<(), AppError> {
        let value = serde_json::to_value(snapshot).map_err(AppError::serialization)?;
        self.mirror.set(&agent_path(&snapshot.id), value).await
    }

    pub async fn remove_agent(&self, agent_id: &str) -> Result<(), AppError> {
        self.mirror.remove(&agent_path(agent_id)).await
    }
}
