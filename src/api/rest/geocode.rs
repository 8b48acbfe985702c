use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geo::Coordinates;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/geocode", get(geocode))
}

#[derive(Deserialize)]
pub struct GeocodeQuery {
    pub q: String,
}

#[derive(Serialize)]
pub struct GeocodeResponse {
    pub query: String,
    pub result: Option<Coordinates>,
}

async fn geocode(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeocodeQuery>,
) -> Result<Json<GeocodeResponse>, AppError> {
    if params.q.trim().is_empty() {
        return Err(AppError::BadRequest("q cannot be empty".to_string()));
    }

    let result = state.geocoder.geocode(&params.q).await;
    Ok(Json(GeocodeResponse {
        query: params.q,
        result,
    }))
}
