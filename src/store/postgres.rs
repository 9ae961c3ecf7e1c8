use std::collections::HashSet;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Store, Transaction, EMAIL_TAKEN, USERNAME_TAKEN};
use crate::error::{Error, Result};
use crate::models::{Pub, PubOrder, Rating, Review, ReviewDetails, ReviewLike, User};

const USER_COLUMNS: &str =
    "SELECT id, username, password_hash, name, surname, email, created_at FROM users";

const PUB_COLUMNS: &str = r#"
    SELECT id, title, short_description, long_description, menu_url, image_url,
           (rating * 10)::SMALLINT AS rating_tenths, created_at, updated_at
    FROM pubs
"#;

const REVIEW_COLUMNS: &str = r#"
    SELECT r.id, r.user_id, r.pub_id, r.content, r.rate, r.like_count,
           r.created_at, r.updated_at, u.username, p.title AS pub_title
    FROM reviews r
    JOIN users u ON u.id = r.user_id
    JOIN pubs p ON p.id = r.pub_id
"#;

/// PostgreSQL-backed store for production persistence
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL with the given connection string
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!(max_connections, "Connected to PostgreSQL");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;

        info!("Database migrations complete");

        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }
}

/// Transaction over a [`PostgresStore`]; rolled back when dropped uncommitted
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn username_exists(&mut self, username: &str) -> Result<bool> {
        let exists = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn email_exists(&mut self, email: &str) -> Result<bool> {
        let exists = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn insert_user(&mut self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, name, surname, email, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.surname)
        .bind(&user.email)
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(user_conflict)?;

        debug!(user_id = %user.id, "Inserted user");

        Ok(())
    }

    async fn find_user(&mut self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("{USER_COLUMNS} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_username(&mut self, username: &str) -> Result<Option<User>> {
        let sql = format!("{USER_COLUMNS} WHERE username = $1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_pub(&mut self, venue: &Pub) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pubs (
                id, title, short_description, long_description, menu_url, image_url,
                rating, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7::NUMERIC / 10, $8, $9)
            "#,
        )
        .bind(venue.id)
        .bind(&venue.title)
        .bind(&venue.short_description)
        .bind(&venue.long_description)
        .bind(&venue.menu_url)
        .bind(&venue.image_url)
        .bind(i16::from(venue.rating.tenths()))
        .bind(venue.created_at)
        .bind(venue.updated_at)
        .execute(&mut *self.tx)
        .await?;

        debug!(pub_id = %venue.id, "Inserted pub");

        Ok(())
    }

    async fn find_pub(&mut self, id: Uuid) -> Result<Option<Pub>> {
        let sql = format!("{PUB_COLUMNS} WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(pub_from_row).transpose()
    }

    async fn list_pubs(&mut self, order: PubOrder) -> Result<Vec<Pub>> {
        let order_by = match order {
            PubOrder::Native => "created_at, id",
            PubOrder::RatingAsc => "rating ASC, created_at, id",
            PubOrder::RatingDesc => "rating DESC, created_at, id",
        };
        let sql = format!("{PUB_COLUMNS} ORDER BY {order_by}");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        rows.iter().map(pub_from_row).collect()
    }

    async fn search_pubs(&mut self, needle: &str) -> Result<Vec<Pub>> {
        let pattern = format!("%{}%", escape_like(needle));
        let sql = format!("{PUB_COLUMNS} WHERE title ILIKE $1 ORDER BY created_at, id");
        let rows = sqlx::query(&sql)
            .bind(pattern)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(pub_from_row).collect()
    }

    async fn save_pub(&mut self, venue: &Pub) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE pubs SET
                title = $2,
                short_description = $3,
                long_description = $4,
                menu_url = $5,
                image_url = $6,
                rating = $7::NUMERIC / 10,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(venue.id)
        .bind(&venue.title)
        .bind(&venue.short_description)
        .bind(&venue.long_description)
        .bind(&venue.menu_url)
        .bind(&venue.image_url)
        .bind(i16::from(venue.rating.tenths()))
        .bind(venue.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("pub {} vanished before save", venue.id).into());
        }

        Ok(())
    }

    async fn delete_pub(&mut self, id: Uuid) -> Result<bool> {
        sqlx::query(
            r#"
            DELETE FROM review_likes
            WHERE review_id IN (SELECT id FROM reviews WHERE pub_id = $1)
            "#,
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?;

        let reviews = sqlx::query("DELETE FROM reviews WHERE pub_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        let result = sqlx::query("DELETE FROM pubs WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        debug!(pub_id = %id, reviews = reviews.rows_affected(), "Deleted pub");

        Ok(result.rows_affected() > 0)
    }

    async fn insert_review(&mut self, review: &Review) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (
                id, user_id, pub_id, content, rate, like_count, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(review.id)
        .bind(review.user_id)
        .bind(review.pub_id)
        .bind(&review.content)
        .bind(i16::from(review.rate))
        .bind(review.like_count as i32)
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&mut *self.tx)
        .await?;

        debug!(review_id = %review.id, "Inserted review");

        Ok(())
    }

    async fn find_review(&mut self, id: Uuid) -> Result<Option<ReviewDetails>> {
        let sql = format!("{REVIEW_COLUMNS} WHERE r.id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn find_review_owned_by(
        &mut self,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ReviewDetails>> {
        let sql = format!("{REVIEW_COLUMNS} WHERE r.id = $1 AND r.user_id = $2");
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn list_reviews(&mut self) -> Result<Vec<ReviewDetails>> {
        let sql = format!("{REVIEW_COLUMNS} ORDER BY r.created_at, r.id");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        rows.iter().map(review_from_row).collect()
    }

    async fn list_reviews_by_pub(&mut self, pub_id: Uuid) -> Result<Vec<ReviewDetails>> {
        let sql = format!("{REVIEW_COLUMNS} WHERE r.pub_id = $1 ORDER BY r.created_at, r.id");
        let rows = sqlx::query(&sql)
            .bind(pub_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(review_from_row).collect()
    }

    async fn list_reviews_by_user(&mut self, user_id: Uuid) -> Result<Vec<ReviewDetails>> {
        let sql = format!("{REVIEW_COLUMNS} WHERE r.user_id = $1 ORDER BY r.created_at, r.id");
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(review_from_row).collect()
    }

    async fn save_review(&mut self, review: &Review) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE reviews SET
                content = $2,
                rate = $3,
                like_count = $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(review.id)
        .bind(&review.content)
        .bind(i16::from(review.rate))
        .bind(review.like_count as i32)
        .bind(review.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("review {} vanished before save", review.id).into());
        }

        Ok(())
    }

    async fn delete_review(&mut self, id: Uuid) -> Result<bool> {
        sqlx::query("DELETE FROM review_likes WHERE review_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn adjust_like_count(&mut self, review_id: Uuid, delta: i32) -> Result<Option<u32>> {
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE reviews
            SET like_count = GREATEST(like_count + $2, 0), updated_at = NOW()
            WHERE id = $1
            RETURNING like_count
            "#,
        )
        .bind(review_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(count.map(|c| c.max(0) as u32))
    }

    async fn insert_like(&mut self, like: &ReviewLike) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO review_likes (id, review_id, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (review_id, user_id) DO NOTHING
            "#,
        )
        .bind(like.id)
        .bind(like.review_id)
        .bind(like.user_id)
        .bind(like.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn like_exists(&mut self, review_id: Uuid, user_id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM review_likes WHERE review_id = $1 AND user_id = $2)",
        )
        .bind(review_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn find_like(&mut self, review_id: Uuid, user_id: Uuid) -> Result<Option<ReviewLike>> {
        let row = sqlx::query(
            r#"
            SELECT id, review_id, user_id, created_at
            FROM review_likes
            WHERE review_id = $1 AND user_id = $2
            "#,
        )
        .bind(review_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(ReviewLike {
                id: row.try_get("id")?,
                review_id: row.try_get("review_id")?,
                user_id: row.try_get("user_id")?,
                created_at: row.try_get("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn delete_like(&mut self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM review_likes WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn count_likes(&mut self, review_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_likes WHERE review_id = $1")
            .bind(review_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(count as u64)
    }

    async fn liked_review_ids(&mut self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT review_id FROM review_likes WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(ids.into_iter().collect())
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        name: row.try_get("name")?,
        surname: row.try_get("surname")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}

fn pub_from_row(row: &PgRow) -> Result<Pub> {
    let tenths: i16 = row.try_get("rating_tenths")?;
    Ok(Pub {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        short_description: row.try_get("short_description")?,
        long_description: row.try_get("long_description")?,
        menu_url: row.try_get("menu_url")?,
        image_url: row.try_get("image_url")?,
        rating: Rating::from_tenths(tenths.clamp(0, i16::from(Rating::MAX.tenths())) as u8),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn review_from_row(row: &PgRow) -> Result<ReviewDetails> {
    let rate: i16 = row.try_get("rate")?;
    let like_count: i32 = row.try_get("like_count")?;
    Ok(ReviewDetails {
        review: Review {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            pub_id: row.try_get("pub_id")?,
            content: row.try_get("content")?,
            rate: rate.clamp(0, 5) as u8,
            like_count: like_count.max(0) as u32,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        },
        username: row.try_get("username")?,
        pub_title: row.try_get("pub_title")?,
    })
}

/// Escape `LIKE` wildcards so user input matches literally
/// A concurrent registration that slipped past the existence checks still
/// surfaces as a conflict
fn user_conflict(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some("uq_users_email") => Error::conflict(EMAIL_TAKEN),
                _ => Error::conflict(USERNAME_TAKEN),
            };
        }
    }
    Error::Database(err)
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
