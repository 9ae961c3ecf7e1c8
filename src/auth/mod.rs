pub mod password;
pub mod token;

pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenIssuer};

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, User};
use crate::store::{Store, Transaction, EMAIL_TAKEN, USERNAME_TAKEN};

const BAD_CREDENTIALS: &str = "Invalid username or password";

/// Account registration and login
pub struct AuthService<S: Store> {
    store: Arc<S>,
    tokens: TokenIssuer,
}

impl<S: Store> Clone for AuthService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

impl<S: Store> AuthService<S> {
    pub fn new(store: Arc<S>, tokens: TokenIssuer) -> Self {
        Self { store, tokens }
    }

    /// Create an account and return a token for it.
    /// Duplicate usernames and emails are rejected as conflicts.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse> {
        request.validate()?;

        let mut tx = self.store.begin().await?;

        if tx.username_exists(&request.username).await? {
            return Err(Error::conflict(USERNAME_TAKEN));
        }
        if tx.email_exists(&request.email).await? {
            return Err(Error::conflict(EMAIL_TAKEN));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: request.username,
            password_hash: hash_password(&request.password)?,
            name: request.name,
            surname: request.surname,
            email: request.email,
            created_at: Utc::now(),
        };

        tx.insert_user(&user).await?;
        tx.commit().await?;

        info!(user_id = %user.id, username = %user.username, "Registered user");

        self.respond(&user)
    }

    /// Check credentials and return a fresh token.
    /// Unknown usernames and wrong passwords fail identically.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse> {
        request.validate()?;

        let mut tx = self.store.begin().await?;
        let user = tx.find_user_by_username(&request.username).await?;
        tx.commit().await?;

        let Some(user) = user else {
            warn!(username = %request.username, "Login for unknown user");
            return Err(Error::unauthorized(BAD_CREDENTIALS));
        };

        if !verify_password(&request.password, &user.password_hash) {
            warn!(user_id = %user.id, "Login with wrong password");
            return Err(Error::unauthorized(BAD_CREDENTIALS));
        }

        info!(user_id = %user.id, "User logged in");

        self.respond(&user)
    }

    fn respond(&self, user: &User) -> Result<AuthResponse> {
        Ok(AuthResponse {
            token: self.tokens.issue(user.id, &user.username)?,
            account_id: user.id,
            username: user.username.clone(),
        })
    }
}
