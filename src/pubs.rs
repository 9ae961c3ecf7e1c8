use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{NewPub, Pub, PubOrder, PubView};
use crate::store::{Store, Transaction};

/// Read access to pubs, plus the administrative create/delete used by the CLI
pub struct PubService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for PubService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> PubService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// List pubs. `sort_by` of `asc`/`desc` (any case) orders by rating;
    /// anything else keeps the store's native order.
    pub async fn get_all_pubs(&self, sort_by: Option<&str>) -> Result<Vec<PubView>> {
        let order = PubOrder::from_sort_by(sort_by);

        let mut tx = self.store.begin().await?;
        let pubs = tx.list_pubs(order).await?;
        tx.commit().await?;

        Ok(pubs.into_iter().map(PubView::from).collect())
    }

    pub async fn get_pub_by_id(&self, id: Uuid) -> Result<PubView> {
        let mut tx = self.store.begin().await?;
        let venue = tx.find_pub(id).await?;
        tx.commit().await?;

        venue
            .map(PubView::from)
            .ok_or_else(|| Error::not_found(format!("Pub not found with id: {}", id)))
    }

    /// Pubs whose title contains `title`, ignoring case
    pub async fn search_pubs(&self, title: &str) -> Result<Vec<PubView>> {
        let mut tx = self.store.begin().await?;
        let pubs = tx.search_pubs(title.trim()).await?;
        tx.commit().await?;

        Ok(pubs.into_iter().map(PubView::from).collect())
    }

    /// Create a pub with a zero rating
    pub async fn add_pub(&self, new: NewPub) -> Result<Pub> {
        if new.title.trim().is_empty() {
            return Err(Error::validation("Title is required"));
        }
        if new.title.chars().count() > 200 {
            return Err(Error::validation("Title must not exceed 200 characters"));
        }

        let venue = Pub::new(new);

        let mut tx = self.store.begin().await?;
        tx.insert_pub(&venue).await?;
        tx.commit().await?;

        info!(pub_id = %venue.id, title = %venue.title, "Added pub");

        Ok(venue)
    }

    /// Delete a pub along with its reviews and their likes
    pub async fn delete_pub(&self, id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_pub(id).await? {
            return Err(Error::not_found(format!("Pub not found with id: {}", id)));
        }
        tx.commit().await?;

        info!(pub_id = %id, "Deleted pub");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rating;
    use crate::store::JsonStore;
    use tempfile::{tempdir, TempDir};

    async fn service() -> (PubService<JsonStore>, Arc<JsonStore>, TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(JsonStore::open(dir.path().join("db.json")).await.unwrap());
        (PubService::new(store.clone()), store, dir)
    }

    async fn add_rated(service: &PubService<JsonStore>, store: &JsonStore, title: &str, tenths: u8) {
        let mut venue = service
            .add_pub(NewPub {
                title: title.to_string(),
                ..NewPub::default()
            })
            .await
            .unwrap();
        venue.rating = Rating::from_tenths(tenths);

        let mut tx = store.begin().await.unwrap();
        tx.save_pub(&venue).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_sorting_modes() {
        let (pubs, store, _dir) = service().await;
        add_rated(&pubs, &store, "Crown", 30).await;
        add_rated(&pubs, &store, "Anchor", 45).await;
        add_rated(&pubs, &store, "Bell", 10).await;

        let ratings = |views: Vec<PubView>| views.iter().map(|v| v.rating.tenths()).collect::<Vec<_>>();

        assert_eq!(ratings(pubs.get_all_pubs(Some("asc")).await.unwrap()), [10, 30, 45]);
        assert_eq!(ratings(pubs.get_all_pubs(Some("DESC")).await.unwrap()), [45, 30, 10]);

        let native = ratings(pubs.get_all_pubs(None).await.unwrap());
        assert_eq!(native, [30, 45, 10]);
        assert_eq!(ratings(pubs.get_all_pubs(Some("")).await.unwrap()), native);
        assert_eq!(ratings(pubs.get_all_pubs(Some("rating")).await.unwrap()), native);
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let (pubs, _store, _dir) = service().await;
        let venue = pubs
            .add_pub(NewPub {
                title: "The Red Lion".to_string(),
                ..NewPub::default()
            })
            .await
            .unwrap();

        let view = pubs.get_pub_by_id(venue.id).await.unwrap();
        assert_eq!(view.title, "The Red Lion");
        assert_eq!(view.rating, Rating::ZERO);

        let err = pubs.get_pub_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_and_delete() {
        let (pubs, _store, _dir) = service().await;
        let lion = pubs
            .add_pub(NewPub {
                title: "The Red Lion".to_string(),
                ..NewPub::default()
            })
            .await
            .unwrap();
        pubs.add_pub(NewPub {
            title: "The Crown".to_string(),
            ..NewPub::default()
        })
        .await
        .unwrap();

        let found = pubs.search_pubs("red LION").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, lion.id);

        pubs.delete_pub(lion.id).await.unwrap();
        assert!(pubs.search_pubs("lion").await.unwrap().is_empty());
        assert!(matches!(
            pubs.delete_pub(lion.id).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_blank_title_rejected() {
        let (pubs, _store, _dir) = service().await;
        let err = pubs.add_pub(NewPub::default()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
