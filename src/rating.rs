//! Aggregate pub rating.
//!
//! A pub's rating is always derived from scratch from the rates of the
//! reviews currently linked to it, never patched incrementally. It is
//! recomputed inside the same transaction as every write that changes a
//! pub's review set or a review's rate. Likes never affect it.

use anyhow::anyhow;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Rating;
use crate::store::Transaction;

/// Arithmetic mean of `rates`, rounded half-up to one decimal place.
/// An empty set yields exactly zero.
pub fn average_rating(rates: impl IntoIterator<Item = u8>) -> Rating {
    let (sum, count) = rates
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), rate| (sum + u64::from(rate), count + 1));

    if count == 0 {
        return Rating::ZERO;
    }

    // round(10 * sum / count) with ties rounding up, in exact integer arithmetic
    let tenths = (20 * sum + count) / (2 * count);

    Rating::from_tenths(u8::try_from(tenths).unwrap_or(Rating::MAX.tenths()))
}

/// Recompute and persist the rating of `pub_id`.
///
/// The pub is written back even when the value is unchanged. A pub that
/// cannot be found here is an internal inconsistency and fails the
/// enclosing operation.
pub async fn recompute_pub_rating<T: Transaction>(tx: &mut T, pub_id: Uuid) -> Result<Rating> {
    let reviews = tx.list_reviews_by_pub(pub_id).await?;
    let rating = average_rating(reviews.iter().map(|d| d.review.rate));

    let mut venue = tx
        .find_pub(pub_id)
        .await?
        .ok_or_else(|| anyhow!("Pub not found during rating recomputation: {}", pub_id))?;

    venue.rating = rating;
    venue.updated_at = Utc::now();
    tx.save_pub(&venue).await?;

    debug!(pub_id = %pub_id, reviews = reviews.len(), rating = %rating, "Recomputed pub rating");

    Ok(rating)
}
