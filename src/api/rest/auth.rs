use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::user::{Role, User};
use crate::profile::AuthSession;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

/// The selected role is accepted for form compatibility but not enforced;
/// the stored profile decides where the user lands.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// Token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<AuthSession>, AppError> {
    let session = state
        .profiles
        .signup(&payload.email, &payload.password, &payload.name, payload.role)
        .await?;
    Ok(Json(session))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthSession>, AppError> {
    let session = state.profiles.login(&payload.email, &payload.password).await?;
    if payload.role.is_some_and(|role| role != session.user.role) {
        tracing::debug!(uid = %session.user.id, "login role differs from stored profile");
    }
    Ok(Json(session))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    state.profiles.logout(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `null` without a live session.
async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Option<User>>, AppError> {
    let user = match bearer_token(&headers) {
        Some(token) => state.profiles.current(token).await?,
        None => None,
    };
    Ok(Json(user))
}
