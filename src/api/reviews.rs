use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{json_body, AppState, AuthUser, Viewer};
use crate::error::Result;
use crate::models::{ReviewRequest, ReviewView, UpdateReviewRequest};
use crate::store::Store;

/// `POST /reviews`
pub async fn create<S: Store>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    payload: std::result::Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReviewView>)> {
    let (pub_id, input) = json_body(payload)?.validate()?;
    let review = state.reviews.create(pub_id, input, user.id).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// `GET /reviews`
pub async fn list_all<S: Store>(
    State(state): State<AppState<S>>,
    Viewer(viewer): Viewer,
) -> Result<Json<Vec<ReviewView>>> {
    Ok(Json(state.reviews.list_all(viewer).await?))
}

/// `GET /reviews/:id`
pub async fn get<S: Store>(
    State(state): State<AppState<S>>,
    Viewer(viewer): Viewer,
    Path(id): Path<Uuid>,
) -> Result<Json<ReviewView>> {
    Ok(Json(state.reviews.get(id, viewer).await?))
}

/// `GET /reviews/pub/:pub_id`
pub async fn list_by_pub<S: Store>(
    State(state): State<AppState<S>>,
    Viewer(viewer): Viewer,
    Path(pub_id): Path<Uuid>,
) -> Result<Json<Vec<ReviewView>>> {
    Ok(Json(state.reviews.list_by_pub(pub_id, viewer).await?))
}

/// `GET /reviews/user/:user_id`
pub async fn list_by_user<S: Store>(
    State(state): State<AppState<S>>,
    Viewer(viewer): Viewer,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<ReviewView>>> {
    Ok(Json(state.reviews.list_by_user(user_id, viewer).await?))
}

/// `PUT /reviews/:id`
pub async fn update<S: Store>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: std::result::Result<Json<UpdateReviewRequest>, JsonRejection>,
) -> Result<Json<ReviewView>> {
    let input = json_body(payload)?.validate()?;
    Ok(Json(state.reviews.update(id, input, user.id).await?))
}

/// `DELETE /reviews/:id`
pub async fn delete<S: Store>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.reviews.delete(id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /reviews/:id/like`
pub async fn like<S: Store>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ReviewView>> {
    Ok(Json(state.reviews.like(id, user.id).await?))
}

/// `DELETE /reviews/:id/like`
pub async fn unlike<S: Store>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ReviewView>> {
    Ok(Json(state.reviews.unlike(id, user.id).await?))
}
