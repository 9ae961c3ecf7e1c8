use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Store, Transaction, EMAIL_TAKEN, USERNAME_TAKEN};
use crate::error::{Error, Result};
use crate::models::{Pub, PubOrder, Review, ReviewDetails, ReviewLike, User};

/// Single-file JSON store for development and tests.
///
/// All tables live in memory; a transaction holds the table lock for its
/// whole lifetime and works on a copy, which replaces the shared tables and
/// is written to disk on commit.
#[derive(Clone)]
pub struct JsonStore {
    path: PathBuf,
    tables: Arc<Mutex<Tables>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    users: Vec<User>,
    pubs: Vec<Pub>,
    reviews: Vec<Review>,
    review_likes: Vec<ReviewLike>,
}

impl JsonStore {
    /// Open the store at `path`, creating parent directories as needed.
    /// A missing file starts an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create store directory: {}", parent.display()))?;
        }

        let tables = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read store: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse store: {}", path.display()))?
        } else {
            Tables::default()
        };

        info!(
            path = %path.display(),
            pubs = tables.pubs.len(),
            reviews = tables.reviews.len(),
            "Opened JSON store"
        );

        Ok(Self {
            path,
            tables: Arc::new(Mutex::new(tables)),
        })
    }
}

#[async_trait]
impl Store for JsonStore {
    type Tx = JsonTransaction;

    async fn begin(&self) -> Result<JsonTransaction> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(JsonTransaction {
            path: self.path.clone(),
            guard,
            working,
            dirty: false,
        })
    }
}

/// Transaction over a [`JsonStore`]
pub struct JsonTransaction {
    path: PathBuf,
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    dirty: bool,
}

impl JsonTransaction {
    fn details(&self, review: &Review) -> Result<ReviewDetails> {
        let user = self
            .working
            .users
            .iter()
            .find(|u| u.id == review.user_id)
            .ok_or_else(|| anyhow!("review {} references missing user {}", review.id, review.user_id))?;
        let venue = self
            .working
            .pubs
            .iter()
            .find(|p| p.id == review.pub_id)
            .ok_or_else(|| anyhow!("review {} references missing pub {}", review.id, review.pub_id))?;

        Ok(ReviewDetails {
            review: review.clone(),
            username: user.username.clone(),
            pub_title: venue.title.clone(),
        })
    }

    fn collect_details<'a>(
        &self,
        reviews: impl Iterator<Item = &'a Review>,
    ) -> Result<Vec<ReviewDetails>> {
        reviews.map(|r| self.details(r)).collect()
    }

    fn write_snapshot(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.working).context("Failed to encode store")?;
        let tmp = self.path.with_extension("json.tmp");

        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write store: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace store: {}", self.path.display()))?;

        Ok(())
    }
}

#[async_trait]
impl Transaction for JsonTransaction {
    async fn commit(mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        self.write_snapshot()?;
        *self.guard = std::mem::take(&mut self.working);

        debug!(path = %self.path.display(), "Committed JSON store");

        Ok(())
    }

    async fn username_exists(&mut self, username: &str) -> Result<bool> {
        Ok(self.working.users.iter().any(|u| u.username == username))
    }

    async fn email_exists(&mut self, email: &str) -> Result<bool> {
        Ok(self.working.users.iter().any(|u| u.email == email))
    }

    async fn insert_user(&mut self, user: &User) -> Result<()> {
        if self.working.users.iter().any(|u| u.username == user.username) {
            return Err(Error::conflict(USERNAME_TAKEN));
        }
        if self.working.users.iter().any(|u| u.email == user.email) {
            return Err(Error::conflict(EMAIL_TAKEN));
        }
        self.working.users.push(user.clone());
        self.dirty = true;
        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>> {
        Ok(self.working.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>> {
        Ok(self
            .working
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert_pub(&mut self, venue: &Pub) -> Result<()> {
        self.working.pubs.push(venue.clone());
        self.dirty = true;
        Ok(())
    }

    async fn find_pub(&mut self, id: Uuid) -> Result<Option<Pub>> {
        Ok(self.working.pubs.iter().find(|p| p.id == id).cloned())
    }

    async fn list_pubs(&mut self, order: PubOrder) -> Result<Vec<Pub>> {
        let mut pubs = self.working.pubs.clone();
        match order {
            PubOrder::Native => {}
            PubOrder::RatingAsc => pubs.sort_by(|a, b| a.rating.cmp(&b.rating)),
            PubOrder::RatingDesc => pubs.sort_by(|a, b| b.rating.cmp(&a.rating)),
        }
        Ok(pubs)
    }

    async fn search_pubs(&mut self, needle: &str) -> Result<Vec<Pub>> {
        let needle = needle.to_lowercase();
        Ok(self
            .working
            .pubs
            .iter()
            .filter(|p| p.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn save_pub(&mut self, venue: &Pub) -> Result<()> {
        let slot = self
            .working
            .pubs
            .iter_mut()
            .find(|p| p.id == venue.id)
            .ok_or_else(|| anyhow!("pub {} vanished before save", venue.id))?;
        *slot = venue.clone();
        self.dirty = true;
        Ok(())
    }

    async fn delete_pub(&mut self, id: Uuid) -> Result<bool> {
        if !self.working.pubs.iter().any(|p| p.id == id) {
            return Ok(false);
        }

        let review_ids: HashSet<Uuid> = self
            .working
            .reviews
            .iter()
            .filter(|r| r.pub_id == id)
            .map(|r| r.id)
            .collect();

        self.working
            .review_likes
            .retain(|l| !review_ids.contains(&l.review_id));
        self.working.reviews.retain(|r| r.pub_id != id);
        self.working.pubs.retain(|p| p.id != id);
        self.dirty = true;

        debug!(pub_id = %id, reviews = review_ids.len(), "Deleted pub");

        Ok(true)
    }

    async fn insert_review(&mut self, review: &Review) -> Result<()> {
        self.working.reviews.push(review.clone());
        self.dirty = true;
        Ok(())
    }

    async fn find_review(&mut self, id: Uuid) -> Result<Option<ReviewDetails>> {
        match self.working.reviews.iter().find(|r| r.id == id) {
            Some(review) => Ok(Some(self.details(review)?)),
            None => Ok(None),
        }
    }

    async fn find_review_owned_by(
        &mut self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ReviewDetails>> {
        match self
            .working
            .reviews
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
        {
            Some(review) => Ok(Some(self.details(review)?)),
            None => Ok(None),
        }
    }

    async fn list_reviews(&mut self) -> Result<Vec<ReviewDetails>> {
        self.collect_details(self.working.reviews.iter())
    }

    async fn list_reviews_by_pub(&mut self, pub_id: Uuid) -> Result<Vec<ReviewDetails>> {
        self.collect_details(self.working.reviews.iter().filter(|r| r.pub_id == pub_id))
    }

    async fn list_reviews_by_user(&mut self, user_id: Uuid) -> Result<Vec<ReviewDetails>> {
        self.collect_details(self.working.reviews.iter().filter(|r| r.user_id == user_id))
    }

    async fn save_review(&mut self, review: &Review) -> Result<()> {
        let slot = self
            .working
            .reviews
            .iter_mut()
            .find(|r| r.id == review.id)
            .ok_or_else(|| anyhow!("review {} vanished before save", review.id))?;
        *slot = review.clone();
        self.dirty = true;
        Ok(())
    }

    async fn delete_review(&mut self, id: Uuid) -> Result<bool> {
        if !self.working.reviews.iter().any(|r| r.id == id) {
            return Ok(false);
        }

        self.working.review_likes.retain(|l| l.review_id != id);
        self.working.reviews.retain(|r| r.id != id);
        self.dirty = true;

        Ok(true)
    }

    async fn adjust_like_count(&mut self, review_id: Uuid, delta: i32) -> Result<Option<u32>> {
        let Some(review) = self.working.reviews.iter_mut().find(|r| r.id == review_id) else {
            return Ok(None);
        };

        review.like_count = review.like_count.saturating_add_signed(delta);
        review.updated_at = Utc::now();
        self.dirty = true;

        Ok(Some(review.like_count))
    }

    async fn insert_like(&mut self, like: &ReviewLike) -> Result<bool> {
        if self.like_exists(like.review_id, like.user_id).await? {
            return Ok(false);
        }

        self.working.review_likes.push(like.clone());
        self.dirty = true;

        Ok(true)
    }

    async fn like_exists(&mut self, review_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .working
            .review_likes
            .iter()
            .any(|l| l.review_id == review_id && l.user_id == user_id))
    }

    async fn find_like(&mut self, review_id: Uuid, user_id: Uuid) -> Result<Option<ReviewLike>> {
        Ok(self
            .working
            .review_likes
            .iter()
            .find(|l| l.review_id == review_id && l.user_id == user_id)
            .cloned())
    }

    async fn delete_like(&mut self, id: Uuid) -> Result<()> {
        self.working.review_likes.retain(|l| l.id != id);
        self.dirty = true;
        Ok(())
    }

    async fn count_likes(&mut self, review_id: Uuid) -> Result<u64> {
        Ok(self
            .working
            .review_likes
            .iter()
            .filter(|l| l.review_id == review_id)
            .count() as u64)
    }

    async fn liked_review_ids(&mut self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        Ok(self
            .working
            .review_likes
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| l.review_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPub, Rating};
    use tempfile::tempdir;

    fn user(username: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: "hash".to_string(),
            name: "Test".to_string(),
            surname: "User".to_string(),
            email: format!("{}@example.com", username),
            created_at: Utc::now(),
        }
    }

    fn venue(title: &str, tenths: u8) -> Pub {
        let mut p = Pub::new(NewPub {
            title: title.to_string(),
            ..NewPub::default()
        });
        p.rating = Rating::from_tenths(tenths);
        p
    }

    #[tokio::test]
    async fn test_commit_persists_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");

        let store = JsonStore::open(&path).await.unwrap();
        let alice = user("alice");
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&alice).await.unwrap();
        tx.commit().await.unwrap();

        let reopened = JsonStore::open(&path).await.unwrap();
        let mut tx = reopened.begin().await.unwrap();
        let loaded = tx.find_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(loaded.id, alice.id);
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("db.json")).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_user(&user("bob")).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.username_exists("bob").await.unwrap());
        assert!(!dir.path().join("db.json").exists());
    }

    #[tokio::test]
    async fn test_insert_user_enforces_unique_credentials() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("db.json")).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&user("alice")).await.unwrap();

        let mut same_name = user("alice");
        same_name.email = "second@example.com".to_string();
        let err = tx.insert_user(&same_name).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(ref m) if m == USERNAME_TAKEN));

        let mut same_email = user("carol");
        same_email.email = "alice@example.com".to_string();
        let err = tx.insert_user(&same_email).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(ref m) if m == EMAIL_TAKEN));
    }

    #[tokio::test]
    async fn test_insert_like_is_conditional() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("db.json")).await.unwrap();
        let review_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_like(&ReviewLike::new(review_id, user_id)).await.unwrap());
        assert!(!tx.insert_like(&ReviewLike::new(review_id, user_id)).await.unwrap());
        assert_eq!(tx.count_likes(review_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_pub_fans_out() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("db.json")).await.unwrap();
        let alice = user("alice");
        let red_lion = venue("The Red Lion", 0);
        let crown = venue("The Crown", 0);
        let doomed = Review::new(alice.id, red_lion.id, "Great ales here".to_string(), 5);
        let kept = Review::new(alice.id, crown.id, "Quiet and cosy".to_string(), 3);

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&alice).await.unwrap();
        tx.insert_pub(&red_lion).await.unwrap();
        tx.insert_pub(&crown).await.unwrap();
        tx.insert_review(&doomed).await.unwrap();
        tx.insert_review(&kept).await.unwrap();
        tx.insert_like(&ReviewLike::new(doomed.id, alice.id)).await.unwrap();
        tx.insert_like(&ReviewLike::new(kept.id, alice.id)).await.unwrap();

        assert!(tx.delete_pub(red_lion.id).await.unwrap());
        assert!(!tx.delete_pub(red_lion.id).await.unwrap());

        assert!(tx.find_review(doomed.id).await.unwrap().is_none());
        assert!(tx.find_review(kept.id).await.unwrap().is_some());
        let liked = tx.liked_review_ids(alice.id).await.unwrap();
        assert_eq!(liked, HashSet::from([kept.id]));
    }

    #[tokio::test]
    async fn test_adjust_like_count_clamps_at_zero() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("db.json")).await.unwrap();
        let alice = user("alice");
        let red_lion = venue("The Red Lion", 0);
        let review = Review::new(alice.id, red_lion.id, "Great ales here".to_string(), 5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&alice).await.unwrap();
        tx.insert_pub(&red_lion).await.unwrap();
        tx.insert_review(&review).await.unwrap();

        assert_eq!(tx.adjust_like_count(review.id, -1).await.unwrap(), Some(0));
        assert_eq!(tx.adjust_like_count(review.id, 1).await.unwrap(), Some(1));
        assert_eq!(tx.adjust_like_count(Uuid::new_v4(), 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_pubs_ordering() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path().join("db.json")).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        for (title, tenths) in [("B", 30), ("A", 45), ("C", 10)] {
            tx.insert_pub(&venue(title, tenths)).await.unwrap();
        }

        let titles = |pubs: Vec<Pub>| pubs.into_iter().map(|p| p.title).collect::<Vec<_>>();

        assert_eq!(titles(tx.list_pubs(PubOrder::Native).await.unwrap()), ["B", "A", "C"]);
        assert_eq!(titles(tx.list_pubs(PubOrder::RatingAsc).await.unwrap()), ["C", "B", "A"]);
        assert_eq!(titles(tx.list_pubs(PubOrder::RatingDesc).await.unwrap()), ["A", "B", "C"]);
        assert_eq!(titles(tx.search_pubs("a").await.unwrap()), ["A"]);
    }
}
