use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Aggregate pub rating with exactly one fractional digit.
///
/// Stored as a whole number of tenths so that values such as `4.5` are exact.
/// Serialized as a JSON number (`4.5`, `5.0`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rating(u8);

impl Rating {
    pub const ZERO: Rating = Rating(0);

    /// Highest representable rating (`5.0`).
    pub const MAX: Rating = Rating(50);

    pub fn from_tenths(tenths: u8) -> Self {
        Self(tenths.min(Self::MAX.0))
    }

    pub fn tenths(self) -> u8 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl Serialize for Rating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        if !(0.0..=5.0).contains(&value) {
            return Err(serde::de::Error::custom(format!(
                "rating out of range: {}",
                value
            )));
        }
        Ok(Self::from_tenths((value * 10.0).round() as u8))
    }
}

/// Ordering applied when listing pubs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PubOrder {
    /// Whatever order the store returns (insertion order)
    #[default]
    Native,
    RatingAsc,
    RatingDesc,
}

impl PubOrder {
    /// Parse the `sortBy` query value. Anything other than `asc`/`desc`
    /// (case-insensitive), including an absent value, means native order.
    pub fn from_sort_by(sort_by: Option<&str>) -> Self {
        match sort_by {
            Some(s) if s.eq_ignore_ascii_case("asc") => PubOrder::RatingAsc,
            Some(s) if s.eq_ignore_ascii_case("desc") => PubOrder::RatingDesc,
            _ => PubOrder::Native,
        }
    }
}

/// A registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A venue being reviewed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pub {
    pub id: Uuid,
    pub title: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub menu_url: Option<String>,
    pub image_url: Option<String>,
    pub rating: Rating,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a pub
#[derive(Debug, Clone, Default)]
pub struct NewPub {
    pub title: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub menu_url: Option<String>,
    pub image_url: Option<String>,
}

impl Pub {
    pub fn new(new: NewPub) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            short_description: new.short_description,
            long_description: new.long_description,
            menu_url: new.menu_url,
            image_url: new.image_url,
            rating: Rating::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user's text and rate for a pub
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub pub_id: Uuid,
    pub content: String,
    pub rate: u8,
    pub like_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn new(user_id: Uuid, pub_id: Uuid, content: String, rate: u8) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            pub_id,
            content,
            rate,
            like_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A review joined with the author's username and the pub's title
#[derive(Debug, Clone)]
pub struct ReviewDetails {
    pub review: Review,
    pub username: String,
    pub pub_title: String,
}

/// Record that a user liked a review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewLike {
    pub id: Uuid,
    pub review_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl ReviewLike {
    pub fn new(review_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            review_id,
            user_id,
            created_at: Utc::now(),
        }
    }
}

/// Body of `POST /auth/register`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub email: String,
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by register and login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub account_id: Uuid,
    pub username: String,
}

/// Body of `POST /reviews`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewRequest {
    pub pub_id: Option<Uuid>,
    pub content: String,
    pub rate: Option<i64>,
}

/// Body of `PUT /reviews/{id}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateReviewRequest {
    pub content: String,
    pub rate: Option<i64>,
}

/// Review as presented to a particular viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub pub_id: Uuid,
    pub pub_title: String,
    pub content: String,
    pub rate: u8,
    pub like_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "isLikedByCurrentUser")]
    pub is_liked_by_current_user: bool,
}

impl ReviewView {
    pub fn new(details: ReviewDetails, liked: bool) -> Self {
        let ReviewDetails {
            review,
            username,
            pub_title,
        } = details;
        Self {
            id: review.id,
            user_id: review.user_id,
            username,
            pub_id: review.pub_id,
            pub_title,
            content: review.content,
            rate: review.rate,
            like_count: review.like_count,
            created_at: review.created_at,
            updated_at: review.updated_at,
            is_liked_by_current_user: liked,
        }
    }
}

/// Pub as presented over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubView {
    pub id: Uuid,
    pub title: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub menu_url: Option<String>,
    pub image_url: Option<String>,
    pub rating: Rating,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Pub> for PubView {
    fn from(p: Pub) -> Self {
        Self {
            id: p.id,
            title: p.title,
            short_description: p.short_description,
            long_description: p.long_description,
            menu_url: p.menu_url,
            image_url: p.image_url,
            rating: p.rating,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}
