//! Bearer-token extractors.
//!
//! - `AuthUser`: a valid token is required, otherwise 401
//! - `Viewer`: the token is optional; absent or unusable tokens mean an
//!   anonymous viewer

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::debug;
use uuid::Uuid;

use crate::auth::TokenIssuer;
use crate::error::Error;

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    TokenIssuer: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| Error::unauthorized("Missing bearer token"))?;

        let claims = TokenIssuer::from_ref(state).verify(token)?;

        Ok(Self {
            id: claims.sub,
            username: claims.username,
        })
    }
}

/// Possibly-anonymous caller, used only to annotate reads
#[derive(Debug, Clone, Copy, Default)]
pub struct Viewer(pub Option<Uuid>);

#[async_trait]
impl<S> FromRequestParts<S> for Viewer
where
    TokenIssuer: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(Self(None));
        };

        match TokenIssuer::from_ref(state).verify(token) {
            Ok(claims) => Ok(Self(Some(claims.sub))),
            Err(err) => {
                debug!(error = %err, "Ignoring unusable token on public endpoint");
                Ok(Self(None))
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
