use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};

use super::{json_body, AppState};
use crate::error::Result;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest};
use crate::store::Store;

/// `POST /auth/register`
pub async fn register<S: Store>(
    State(state): State<AppState<S>>,
    payload: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.register(json_body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /auth/login`
pub async fn login<S: Store>(
    State(state): State<AppState<S>>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>> {
    let response = state.auth.login(json_body(payload)?).await?;
    Ok(Json(response))
}
