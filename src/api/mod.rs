//! HTTP surface: router, shared state and handlers.

pub mod auth;
pub mod extractors;
pub mod pubs;
pub mod reviews;

pub use extractors::{AuthUser, Viewer};

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRef},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::{AuthService, TokenIssuer};
use crate::error::{Error, Result};
use crate::orchestrator::ReviewOrchestrator;
use crate::pubs::PubService;
use crate::store::Store;

/// State shared by every handler
pub struct AppState<S: Store> {
    pub auth: AuthService<S>,
    pub pubs: PubService<S>,
    pub reviews: ReviewOrchestrator<S>,
    pub tokens: TokenIssuer,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            auth: self.auth.clone(),
            pubs: self.pubs.clone(),
            reviews: self.reviews.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, tokens: TokenIssuer) -> Self {
        let store = Arc::new(store);
        Self {
            auth: AuthService::new(store.clone(), tokens.clone()),
            pubs: PubService::new(store.clone()),
            reviews: ReviewOrchestrator::new(store),
            tokens,
        }
    }
}

impl<S: Store> FromRef<AppState<S>> for TokenIssuer {
    fn from_ref(state: &AppState<S>) -> Self {
        state.tokens.clone()
    }
}

/// Build the application router
///
/// # Routes
///
/// - `GET /health`
/// - `POST /auth/register`, `POST /auth/login`
/// - `GET /pubs?sortBy=`, `GET /pubs/search?title=`, `GET /pubs/:id`
/// - `POST|GET /reviews`, `GET|PUT|DELETE /reviews/:id`
/// - `POST|DELETE /reviews/:id/like`
/// - `GET /reviews/pub/:pub_id`, `GET /reviews/user/:user_id`
pub fn router<S: Store>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register::<S>))
        .route("/auth/login", post(auth::login::<S>))
        .route("/pubs", get(pubs::list::<S>))
        .route("/pubs/search", get(pubs::search::<S>))
        .route("/pubs/:id", get(pubs::get::<S>))
        .route(
            "/reviews",
            post(reviews::create::<S>).get(reviews::list_all::<S>),
        )
        .route(
            "/reviews/:id",
            get(reviews::get::<S>)
                .put(reviews::update::<S>)
                .delete(reviews::delete::<S>),
        )
        .route(
            "/reviews/:id/like",
            post(reviews::like::<S>).delete(reviews::unlike::<S>),
        )
        .route("/reviews/pub/:pub_id", get(reviews::list_by_pub::<S>))
        .route("/reviews/user/:user_id", get(reviews::list_by_user::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe; does not touch the store
async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Unwrap a JSON body, reporting malformed input as a validation error
pub(crate) fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::validation(rejection.body_text()))
}
