use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::agent::{Agent, AgentStatus, NewAgent};
use crate::models::shipment::Shipment;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(create_agent).get(list_agents))
        .route("/agents/:id", delete(delete_agent))
        .route("/agents/:id/status", patch(set_agent_status))
        .route("/agents/:id/shipments", get(list_agent_shipments))
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: AgentStatus,
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAgent>,
) -> Result<Json<Agent>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    Ok(Json(state.coordinator.create_agent(payload).await?))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Agent>>, AppError> {
    Ok(Json(state.coordinator.list_agents().await?))
}

async fn set_agent_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<Agent>, AppError> {
    Ok(Json(
        state
            .coordinator
            .set_agent_status(&id, payload.status)
            .await?,
    ))
}

async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.coordinator.delete_agent(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_agent_shipments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Shipment>>, AppError> {
    Ok(Json(state.coordinator.shipments_for_agent(&id).await?))
}
