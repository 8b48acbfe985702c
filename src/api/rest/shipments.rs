use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::lifecycle::coordinator::{CreatedShipment, ProofFile};
use crate::models::shipment::{
    Feedback, GeoLocation, NewShipment, ProofOfDelivery, Shipment, ShipmentPatch, ShipmentStatus,
    StatusUpdate,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shipments", post(create_shipment).get(list_shipments))
        .route(
            "/shipments/:id",
            get(get_shipment).patch(edit_shipment).delete(delete_shipment),
        )
        .route("/shipments/:id/status", post(update_status))
        .route("/shipments/:id/updates", get(list_status_updates))
        .route("/shipments/:id/proof/:file_name", put(upload_proof))
        .route("/shipments/:id/proofs", get(list_proofs))
        .route(
            "/shipments/:id/feedback",
            post(submit_feedback).get(list_feedback),
        )
        .route("/track/:tracking_id", get(track))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditShipmentRequest {
    pub tracking_id: String,
    #[serde(flatten)]
    pub patch: ShipmentPatch,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ShipmentStatus,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

#[derive(Deserialize)]
pub struct FeedbackRequest {
    pub rating: u8,
    #[serde(default)]
    pub comments: String,
}

#[derive(Serialize)]
pub struct ProofResponse {
    pub url: String,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("shipment {id} not found"))
}

fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} cannot be empty")));
    }
    Ok(())
}

async fn create_shipment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewShipment>,
) -> Result<Json<CreatedShipment>, AppError> {
    require_text("senderName", &payload.sender_name)?;
    require_text("receiverName", &payload.receiver_name)?;
    require_text("pickupAddress", &payload.pickup_address)?;
    require_text("deliveryAddress", &payload.delivery_address)?;

    let created = state.coordinator.create_shipment(payload).await?;
    Ok(Json(created))
}

async fn list_shipments(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Shipment>>, AppError> {
    Ok(Json(state.coordinator.list_shipments().await?))
}

async fn get_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Shipment>, AppError> {
    state
        .coordinator
        .get_shipment(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn track(
    State(state): State<Arc<AppState>>,
    Path(tracking_id): Path<String>,
) -> Result<Json<Shipment>, AppError> {
    state
        .coordinator
        .find_by_tracking_id(&tracking_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no shipment with tracking id {tracking_id}")))
}

async fn edit_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<EditShipmentRequest>,
) -> Result<Json<Shipment>, AppError> {
    state
        .coordinator
        .edit_shipment(&id, &payload.tracking_id, payload.patch)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Shipment>, AppError> {
    state
        .coordinator
        .update_status(&id, payload.status, payload.location)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

async fn list_status_updates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StatusUpdate>>, AppError> {
    Ok(Json(state.coordinator.status_updates(&id).await?))
}

async fn upload_proof(
    State(state): State<Arc<AppState>>,
    Path((id, file_name)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ProofResponse>, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("proof file is empty".to_string()));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let file = ProofFile {
        name: file_name,
        content_type,
        data: body.to_vec(),
    };

    state
        .coordinator
        .upload_proof(&id, file)
        .await?
        .map(|url| Json(ProofResponse { url }))
        .ok_or_else(|| not_found(&id))
}

async fn list_proofs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ProofOfDelivery>>, AppError> {
    Ok(Json(state.coordinator.proofs(&id).await?))
}

async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<StatusCode, AppError> {
    state
        .coordinator
        .submit_feedback(&id, payload.rating, &payload.comments)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Feedback>>, AppError> {
    Ok(Json(state.coordinator.feedback(&id).await?))
}

async fn delete_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = state.coordinator.delete_shipment(&id).await?;
    Ok(Json(DeleteResponse { deleted }))
}
