use serde::{Deserialize, Serialize};

use crate::models::timestamp::StoreTimestamp;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    #[default]
    Created,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    Delayed,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 6] = [
        ShipmentStatus::Created,
        ShipmentStatus::PickedUp,
        ShipmentStatus::InTransit,
        ShipmentStatus::OutForDelivery,
        ShipmentStatus::Delivered,
        ShipmentStatus::Delayed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Created => "created",
            ShipmentStatus::PickedUp => "picked_up",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::OutForDelivery => "out_for_delivery",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Delayed => "delayed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ShipmentStatus::Delivered)
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Shipment as held by the primary store. `id` is the store-assigned document
/// id and is never written into the document body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    #[serde(default)]
    pub id: String,
    pub tracking_id: String,
    pub sender_name: String,
    pub receiver_name: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub contact_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: ShipmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_delivery_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<StoreTimestamp>,
}

impl Shipment {
    /// Assigned agent, treating an empty id as unassigned.
    pub fn assigned_agent(&self) -> Option<&str> {
        self.agent_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Admin-supplied fields for a new shipment. The tracking id is always
/// generated, never accepted from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShipment {
    pub sender_name: String,
    pub receiver_name: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub contact_number: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub pickup_date: Option<String>,
    #[serde(default)]
    pub expected_delivery_date: Option<String>,
}

impl NewShipment {
    /// Builds the record to store. Blank optional selections are dropped so
    /// they are left out of the document entirely.
    pub fn into_shipment(self, tracking_id: String) -> Shipment {
        Shipment {
            id: String::new(),
            tracking_id,
            sender_name: self.sender_name,
            receiver_name: self.receiver_name,
            pickup_address: self.pickup_address,
            delivery_address: self.delivery_address,
            contact_number: self.contact_number,
            customer_email: self.customer_email,
            agent_id: non_blank(self.agent_id),
            status: ShipmentStatus::Created,
            last_location: None,
            pickup_date: non_blank(self.pickup_date),
            expected_delivery_date: non_blank(self.expected_delivery_date),
            created_at: None,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Partial update applied by admin edits. There is deliberately no tracking id
/// field: it is the mirror key and cannot change after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ShipmentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_delivery_date: Option<String>,
}

impl ShipmentPatch {
    pub fn assigned_agent(&self) -> Option<&str> {
        self.agent_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// One entry of the append-only status audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdate {
    pub status: ShipmentStatus,
    #[serde(default)]
    pub location: Option<GeoLocation>,
    #[serde(default)]
    pub at: Option<StoreTimestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProofOfDelivery {
    pub url: String,
    #[serde(default)]
    pub at: Option<StoreTimestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub rating: u8,
    pub comments: String,
    #[serde(default)]
    pub at: Option<StoreTimestamp>,
}
