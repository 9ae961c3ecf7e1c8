pub mod json;
pub mod postgres;

pub use json::JsonStore;
pub use postgres::PostgresStore;

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Pub, PubOrder, Review, ReviewDetails, ReviewLike, User};

pub const USERNAME_TAKEN: &str = "Username already exists";
pub const EMAIL_TAKEN: &str = "Email already exists";

/// Persistence backend. Every service operation runs inside exactly one
/// transaction obtained from [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: Transaction;

    /// Open a transaction. Dropping it without [`Transaction::commit`]
    /// discards every change made through it.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// Unit of work over users, pubs, reviews and review likes
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self) -> Result<()>;

    // Users

    async fn username_exists(&mut self, username: &str) -> Result<bool>;

    async fn email_exists(&mut self, email: &str) -> Result<bool>;

    /// Fails with a conflict ([`USERNAME_TAKEN`] or [`EMAIL_TAKEN`]) when
    /// another account already holds the username or email.
    async fn insert_user(&mut self, user: &User) -> Result<()>;

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>>;

    // Pubs

    async fn insert_pub(&mut self, venue: &Pub) -> Result<()>;

    async fn find_pub(&mut self, id: Uuid) -> Result<Option<Pub>>;

    async fn list_pubs(&mut self, order: PubOrder) -> Result<Vec<Pub>>;

    /// Pubs whose title contains `needle`, ignoring case
    async fn search_pubs(&mut self, needle: &str) -> Result<Vec<Pub>>;

    /// Persist the mutable columns of an existing pub
    async fn save_pub(&mut self, venue: &Pub) -> Result<()>;

    /// Delete a pub together with its reviews and their likes.
    /// Returns false if the pub did not exist.
    async fn delete_pub(&mut self, id: Uuid) -> Result<bool>;

    // Reviews

    async fn insert_review(&mut self, review: &Review) -> Result<()>;

    async fn find_review(&mut self, id: Uuid) -> Result<Option<ReviewDetails>>;

    /// Look up a review by id and owner in a single predicate
    async fn find_review_owned_by(
        &mut self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ReviewDetails>>;

    async fn list_reviews(&mut self) -> Result<Vec<ReviewDetails>>;

    async fn list_reviews_by_pub(&mut self, pub_id: Uuid) -> Result<Vec<ReviewDetails>>;

    async fn list_reviews_by_user(&mut self, user_id: Uuid) -> Result<Vec<ReviewDetails>>;

    /// Persist content, rate, like count and update time of an existing review
    async fn save_review(&mut self, review: &Review) -> Result<()>;

    /// Delete a review and its likes. Returns false if it did not exist.
    async fn delete_review(&mut self, id: Uuid) -> Result<bool>;

    /// Add `delta` to a review's like count, never going below zero.
    /// Returns the new count, or `None` if the review does not exist.
    async fn adjust_like_count(&mut self, review_id: Uuid, delta: i32) -> Result<Option<u32>>;

    // Review likes

    /// Insert a like unless one already exists for the same
    /// (review, user) pair. Returns whether a row was inserted.
    async fn insert_like(&mut self, like: &ReviewLike) -> Result<bool>;

    async fn like_exists(&mut self, review_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn find_like(&mut self, review_id: Uuid, user_id: Uuid) -> Result<Option<ReviewLike>>;

    async fn delete_like(&mut self, id: Uuid) -> Result<()>;

    async fn count_likes(&mut self, review_id: Uuid) -> Result<u64>;

    /// Ids of every review the user has liked
    async fn liked_review_ids(&mut self, user_id: Uuid) -> Result<HashSet<Uuid>>;
}
