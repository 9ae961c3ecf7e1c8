use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Review, ReviewDetails, ReviewLike, ReviewView};
use crate::rating::recompute_pub_rating;
use crate::store::{Store, Transaction};
use crate::validation::ReviewInput;

/// Coordinates the review lifecycle across reviews, likes and pubs.
///
/// Every method runs in one store transaction. Writes that change a pub's
/// review set or a review's rate recompute that pub's rating before commit.
pub struct ReviewOrchestrator<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for ReviewOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> ReviewOrchestrator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Submit a new review for `pub_id` by `author_id`
    pub async fn create(
        &self,
        pub_id: Uuid,
        input: ReviewInput,
        author_id: Uuid,
    ) -> Result<ReviewView> {
        let mut tx = self.store.begin().await?;

        let author = tx
            .find_user(author_id)
            .await?
            .ok_or_else(|| Error::not_found("User not found"))?;
        let venue = tx
            .find_pub(pub_id)
            .await?
            .ok_or_else(|| Error::not_found("Pub not found"))?;

        let review = Review::new(author.id, venue.id, input.content, input.rate);
        tx.insert_review(&review).await?;
        recompute_pub_rating(&mut tx, venue.id).await?;
        tx.commit().await?;

        info!(
            review_id = %review.id,
            pub_id = %venue.id,
            rate = review.rate,
            "Created review"
        );

        let details = ReviewDetails {
            review,
            username: author.username,
            pub_title: venue.title,
        };

        Ok(ReviewView::new(details, false))
    }

    /// Fetch one review, annotated for `viewer_id`
    pub async fn get(&self, review_id: Uuid, viewer_id: Option<Uuid>) -> Result<ReviewView> {
        let mut tx = self.store.begin().await?;

        let details = tx
            .find_review(review_id)
            .await?
            .ok_or_else(|| Error::not_found("Review not found"))?;

        let liked = match viewer_id {
            Some(viewer) => tx.like_exists(review_id, viewer).await?,
            None => false,
        };

        tx.commit().await?;

        Ok(ReviewView::new(details, liked))
    }

    pub async fn list_all(&self, viewer_id: Option<Uuid>) -> Result<Vec<ReviewView>> {
        let mut tx = self.store.begin().await?;
        let reviews = tx.list_reviews().await?;
        let views = annotate(&mut tx, reviews, viewer_id).await?;
        tx.commit().await?;
        Ok(views)
    }

    pub async fn list_by_pub(
        &self,
        pub_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> Result<Vec<ReviewView>> {
        let mut tx = self.store.begin().await?;
        let reviews = tx.list_reviews_by_pub(pub_id).await?;
        let views = annotate(&mut tx, reviews, viewer_id).await?;
        tx.commit().await?;
        Ok(views)
    }

    pub async fn list_by_user(
        &self,
        user_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> Result<Vec<ReviewView>> {
        let mut tx = self.store.begin().await?;
        let reviews = tx.list_reviews_by_user(user_id).await?;
        let views = annotate(&mut tx, reviews, viewer_id).await?;
        tx.commit().await?;
        Ok(views)
    }

    /// Replace content and rate of a review owned by `requester_id`.
    /// A review that exists but belongs to someone else is reported exactly
    /// like a missing one.
    pub async fn update(
        &self,
        review_id: Uuid,
        input: ReviewInput,
        requester_id: Uuid,
    ) -> Result<ReviewView> {
        let mut tx = self.store.begin().await?;

        let mut details = tx
            .find_review_owned_by(review_id, requester_id)
            .await?
            .ok_or_else(|| {
                Error::not_found("Review not found or you don't have permission to update it")
            })?;

        details.review.content = input.content;
        details.review.rate = input.rate;
        details.review.updated_at = Utc::now();

        tx.save_review(&details.review).await?;
        recompute_pub_rating(&mut tx, details.review.pub_id).await?;
        let liked = tx.like_exists(review_id, requester_id).await?;
        tx.commit().await?;

        info!(review_id = %review_id, rate = details.review.rate, "Updated review");

        Ok(ReviewView::new(details, liked))
    }

    /// Delete a review owned by `requester_id`, together with its likes
    pub async fn delete(&self, review_id: Uuid, requester_id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;

        let details = tx
            .find_review_owned_by(review_id, requester_id)
            .await?
            .ok_or_else(|| {
                Error::not_found("Review not found or you don't have permission to delete it")
            })?;

        let pub_id = details.review.pub_id;
        if !tx.delete_review(review_id).await? {
            return Err(anyhow!("review {} vanished while deleting", review_id).into());
        }
        recompute_pub_rating(&mut tx, pub_id).await?;
        tx.commit().await?;

        info!(review_id = %review_id, pub_id = %pub_id, "Deleted review");

        Ok(())
    }

    /// Record that `user_id` likes a review. Liking twice is a conflict.
    pub async fn like(&self, review_id: Uuid, user_id: Uuid) -> Result<ReviewView> {
        let mut tx = self.store.begin().await?;

        tx.find_review(review_id)
            .await?
            .ok_or_else(|| Error::not_found("Review not found"))?;
        tx.find_user(user_id)
            .await?
            .ok_or_else(|| Error::not_found("User not found"))?;

        if !tx.insert_like(&ReviewLike::new(review_id, user_id)).await? {
            return Err(Error::conflict("You have already liked this review"));
        }

        tx.adjust_like_count(review_id, 1)
            .await?
            .ok_or_else(|| anyhow!("review {} vanished while liking", review_id))?;

        let details = tx
            .find_review(review_id)
            .await?
            .ok_or_else(|| anyhow!("review {} vanished while liking", review_id))?;
        tx.commit().await?;

        debug!(
            review_id = %review_id,
            user_id = %user_id,
            like_count = details.review.like_count,
            "Liked review"
        );

        Ok(ReviewView::new(details, true))
    }

    /// Remove `user_id`'s like from a review
    pub async fn unlike(&self, review_id: Uuid, user_id: Uuid) -> Result<ReviewView> {
        let mut tx = self.store.begin().await?;

        tx.find_review(review_id)
            .await?
            .ok_or_else(|| Error::not_found("Review not found"))?;

        let like = tx
            .find_like(review_id, user_id)
            .await?
            .ok_or_else(|| Error::not_found("You haven't liked this review"))?;

        tx.delete_like(like.id).await?;

        tx.adjust_like_count(review_id, -1)
            .await?
            .ok_or_else(|| anyhow!("review {} vanished while unliking", review_id))?;

        let details = tx
            .find_review(review_id)
            .await?
            .ok_or_else(|| anyhow!("review {} vanished while unliking", review_id))?;
        tx.commit().await?;

        debug!(
            review_id = %review_id,
            user_id = %user_id,
            like_count = details.review.like_count,
            "Unliked review"
        );

        Ok(ReviewView::new(details, false))
    }
}

/// Map reviews to views using a single lookup of everything the viewer liked
async fn annotate<T: Transaction>(
    tx: &mut T,
    reviews: Vec<ReviewDetails>,
    viewer_id: Option<Uuid>,
) -> Result<Vec<ReviewView>> {
    let liked: HashSet<Uuid> = match viewer_id {
        Some(viewer) => tx.liked_review_ids(viewer).await?,
        None => HashSet::new(),
    };

    Ok(reviews
        .into_iter()
        .map(|details| {
            let is_liked = liked.contains(&details.review.id);
            ReviewView::new(details, is_liked)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPub, Pub, Rating, User};
    use crate::store::JsonStore;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        reviews: ReviewOrchestrator<JsonStore>,
        store: Arc<JsonStore>,
        alice: Uuid,
        bob: Uuid,
        red_lion: Uuid,
        _dir: TempDir,
    }

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

    async fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonStore::open(dir.path().join("db.json")).await.unwrap());
        let alice = user("alice");
        let bob = user("bob");
        let red_lion = Pub::new(NewPub {
            title: "The Red Lion".to_string(),
            ..NewPub::default()
        });

        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&alice).await.unwrap();
        tx.insert_user(&bob).await.unwrap();
        tx.insert_pub(&red_lion).await.unwrap();
        tx.commit().await.unwrap();

        Fixture {
            reviews: ReviewOrchestrator::new(store.clone()),
            store,
            alice: alice.id,
            bob: bob.id,
            red_lion: red_lion.id,
            _dir: dir,
        }
    }

    fn input(rate: u8) -> ReviewInput {
        ReviewInput {
            content: "A solid pub with friendly staff".to_string(),
            rate,
        }
    }

    async fn rating(f: &Fixture) -> Rating {
        let mut tx = f.store.begin().await.unwrap();
        tx.find_pub(f.red_lion).await.unwrap().unwrap().rating
    }

    #[tokio::test]
    async fn test_create_sets_rating() {
        let f = fixture().await;

        let view = f.reviews.create(f.red_lion, input(5), f.alice).await.unwrap();
        assert_eq!(view.like_count, 0);
        assert!(!view.is_liked_by_current_user);
        assert_eq!(view.username, "alice");
        assert_eq!(view.pub_title, "The Red Lion");
        assert_eq!(rating(&f).await.to_string(), "5.0");

        f.reviews.create(f.red_lion, input(4), f.bob).await.unwrap();
        assert_eq!(rating(&f).await.to_string(), "4.5");
    }

    #[tokio::test]
    async fn test_create_requires_pub_and_author() {
        let f = fixture().await;

        let err = f.reviews.create(Uuid::new_v4(), input(3), f.alice).await.unwrap_err();
        assert_eq!(err.to_string(), "Pub not found");

        let err = f.reviews.create(f.red_lion, input(3), Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.to_string(), "User not found");
    }

    #[tokio::test]
    async fn test_update_recomputes_and_keeps_likes() {
        let f = fixture().await;
        let created = f.reviews.create(f.red_lion, input(5), f.alice).await.unwrap();
        f.reviews.like(created.id, f.bob).await.unwrap();

        let updated = f.reviews.update(created.id, input(2), f.alice).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.rate, 2);
        assert_eq!(updated.like_count, 1);
        assert!(!updated.is_liked_by_current_user);
        assert_eq!(rating(&f).await.to_string(), "2.0");
    }

    #[tokio::test]
    async fn test_non_owner_matches_missing() {
        let f = fixture().await;
        let created = f.reviews.create(f.red_lion, input(5), f.alice).await.unwrap();

        let not_owner = f.reviews.update(created.id, input(1), f.bob).await.unwrap_err();
        let missing = f.reviews.update(Uuid::new_v4(), input(1), f.bob).await.unwrap_err();
        assert_eq!(not_owner.to_string(), missing.to_string());
        assert!(matches!(not_owner, Error::NotFound(_)));

        let not_owner = f.reviews.delete(created.id, f.bob).await.unwrap_err();
        let missing = f.reviews.delete(Uuid::new_v4(), f.bob).await.unwrap_err();
        assert_eq!(not_owner.to_string(), missing.to_string());

        // untouched
        assert_eq!(rating(&f).await.to_string(), "5.0");
        assert_eq!(f.reviews.get(created.id, None).await.unwrap().rate, 5);
    }

    #[tokio::test]
    async fn test_delete_last_review_resets_rating() {
        let f = fixture().await;
        let created = f.reviews.create(f.red_lion, input(3), f.alice).await.unwrap();
        f.reviews.like(created.id, f.bob).await.unwrap();

        f.reviews.delete(created.id, f.alice).await.unwrap();

        assert_eq!(rating(&f).await, Rating::ZERO);
        assert!(matches!(
            f.reviews.get(created.id, None).await.unwrap_err(),
            Error::NotFound(_)
        ));
        let mut tx = f.store.begin().await.unwrap();
        assert!(tx.liked_review_ids(f.bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_like_twice_conflicts() {
        let f = fixture().await;
        let created = f.reviews.create(f.red_lion, input(4), f.alice).await.unwrap();

        let liked = f.reviews.like(created.id, f.bob).await.unwrap();
        assert!(liked.is_liked_by_current_user);
        assert_eq!(liked.like_count, 1);

        let err = f.reviews.like(created.id, f.bob).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(f.reviews.get(created.id, None).await.unwrap().like_count, 1);

        // liking never touches the rating
        assert_eq!(rating(&f).await.to_string(), "4.0");
    }

    #[tokio::test]
    async fn test_like_requires_review_and_user() {
        let f = fixture().await;
        let created = f.reviews.create(f.red_lion, input(4), f.alice).await.unwrap();

        let err = f.reviews.like(Uuid::new_v4(), f.bob).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m == "Review not found"));

        let err = f.reviews.like(created.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m == "User not found"));

        let err = f.reviews.unlike(Uuid::new_v4(), f.bob).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m == "Review not found"));

        // nothing was recorded by the failed attempts
        assert_eq!(f.reviews.get(created.id, None).await.unwrap().like_count, 0);
    }

    #[tokio::test]
    async fn test_unlike() {
        let f = fixture().await;
        let created = f.reviews.create(f.red_lion, input(4), f.alice).await.unwrap();

        let err = f.reviews.unlike(created.id, f.bob).await.unwrap_err();
        assert_eq!(err.to_string(), "You haven't liked this review");

        f.reviews.like(created.id, f.bob).await.unwrap();
        let unliked = f.reviews.unlike(created.id, f.bob).await.unwrap();
        assert!(!unliked.is_liked_by_current_user);
        assert_eq!(unliked.like_count, 0);

        // like again after unlike is allowed
        f.reviews.like(created.id, f.bob).await.unwrap();
    }

    #[tokio::test]
    async fn test_unlike_clamps_corrupt_count() {
        let f = fixture().await;
        let created = f.reviews.create(f.red_lion, input(4), f.alice).await.unwrap();
        f.reviews.like(created.id, f.bob).await.unwrap();

        // simulate drift: like row present, counter already zero
        let mut tx = f.store.begin().await.unwrap();
        let mut details = tx.find_review(created.id).await.unwrap().unwrap();
        details.review.like_count = 0;
        tx.save_review(&details.review).await.unwrap();
        tx.commit().await.unwrap();

        let unliked = f.reviews.unlike(created.id, f.bob).await.unwrap();
        assert_eq!(unliked.like_count, 0);
    }

    #[tokio::test]
    async fn test_viewer_annotation() {
        let f = fixture().await;
        let first = f.reviews.create(f.red_lion, input(5), f.alice).await.unwrap();
        let second = f.reviews.create(f.red_lion, input(3), f.alice).await.unwrap();
        f.reviews.like(first.id, f.bob).await.unwrap();

        let as_bob = f.reviews.list_all(Some(f.bob)).await.unwrap();
        let liked: Vec<_> = as_bob
            .iter()
            .filter(|v| v.is_liked_by_current_user)
            .map(|v| v.id)
            .collect();
        assert_eq!(liked, [first.id]);

        let by_pub = f.reviews.list_by_pub(f.red_lion, Some(f.bob)).await.unwrap();
        assert_eq!(by_pub.len(), 2);
        assert!(by_pub.iter().any(|v| v.id == second.id && !v.is_liked_by_current_user));

        let by_user = f.reviews.list_by_user(f.alice, Some(f.alice)).await.unwrap();
        assert!(by_user.iter().all(|v| !v.is_liked_by_current_user));

        let anonymous = f.reviews.list_all(None).await.unwrap();
        assert!(anonymous.iter().all(|v| !v.is_liked_by_current_user));

        assert!(f.reviews.get(first.id, Some(f.bob)).await.unwrap().is_liked_by_current_user);
        assert!(!f.reviews.get(first.id, Some(f.alice)).await.unwrap().is_liked_by_current_user);
        assert!(!f.reviews.get(first.id, None).await.unwrap().is_liked_by_current_user);
    }
}
