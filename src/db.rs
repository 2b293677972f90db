//! SQLite-backed credential and review store.
//!
//! Reviews keep their ratings embedded as a JSON list in the review row, so
//! a review is read and written as one document. The single connection sits
//! behind a mutex and is only touched from the blocking pool; every write
//! that depends on a prior read runs in one transaction while holding it.

use crate::models::review::{NewReview, Review, ReviewListing, ReviewUpdate, Reviewer};
use crate::models::user::User;
use crate::rules::{self, RatingError};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::sync::Arc;
use thiserror::Error;
use tokio::{sync::Mutex, task};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt ratings document: {0}")]
    Ratings(#[from] serde_json::Error),

    #[error("corrupt timestamp {0:?}")]
    Timestamp(String),

    #[error("username {0:?} already exists")]
    DuplicateUsername(String),

    #[error("review not found")]
    NotFound,

    #[error(transparent)]
    Rating(#[from] RatingError),

    #[error("store worker failed: {0}")]
    Worker(#[from] task::JoinError),
}

const REVIEW_COLUMNS: &str =
    "r.id, r.book_title, r.author, r.review_content, r.reviewer_id, r.ratings, r.created_at";

// Raw column values; decoding the embedded document happens outside the
// rusqlite row callback so its errors keep their own type.
struct ReviewRow {
    id: String,
    book_title: String,
    author: String,
    review_content: String,
    reviewer_id: String,
    ratings: String,
    created_at: String,
}

impl ReviewRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ReviewRow {
            id: row.get(0)?,
            book_title: row.get(1)?,
            author: row.get(2)?,
            review_content: row.get(3)?,
            reviewer_id: row.get(4)?,
            ratings: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_review(self) -> Result<Review, DbError> {
        Ok(Review {
            ratings: serde_json::from_str(&self.ratings)?,
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            book_title: self.book_title,
            author: self.author,
            review_content: self.review_content,
            reviewer: self.reviewer_id,
        })
    }

    fn into_listing(self, username: String) -> Result<ReviewListing, DbError> {
        let review = self.into_review()?;
        Ok(ReviewListing {
            reviewer: Reviewer {
                id: review.reviewer,
                username,
            },
            id: review.id,
            book_title: review.book_title,
            author: review.author,
            review_content: review.review_content,
            ratings: review.ratings,
            created_at: review.created_at,
        })
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    // Fixed width so lexical order matches time order.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| DbError::Timestamp(raw.to_string()))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

fn load_review(conn: &Connection, review_id: &str) -> Result<Option<Review>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {REVIEW_COLUMNS} FROM reviews r WHERE r.id = ?"),
            [review_id],
            ReviewRow::read,
        )
        .optional()?;
    row.map(ReviewRow::into_review).transpose()
}

fn read_user(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn find_user(conn: &Connection, column: &str, value: &str) -> Result<Option<User>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT id, username, password_hash, created_at FROM users WHERE {column} = ?"),
            [value],
            read_user,
        )
        .optional()?;

    row.map(|(id, username, password_hash, created_at)| {
        Ok(User {
            id,
            username,
            password_hash,
            created_at: parse_timestamp(&created_at)?,
        })
    })
    .transpose()
}

fn find_listing(conn: &Connection, review_id: &str) -> Result<Option<ReviewListing>, DbError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {REVIEW_COLUMNS}, u.username
                FROM reviews r
                JOIN users u ON u.id = r.reviewer_id
                WHERE r.id = ?"
            ),
            [review_id],
            |row| Ok((ReviewRow::read(row)?, row.get::<_, String>(7)?)),
        )
        .optional()?;

    row.map(|(review, username)| review.into_listing(username))
        .transpose()
}

// Stored timestamps keep microseconds; records are built at that precision
// so what a write returns equals what a later read returns.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// Define a struct to represent a database connection
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    // Create a new database connection
    pub fn new(db_path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        info!("Database connection established at: {}", db_path);
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `op` against the connection on the blocking pool so SQLite I/O
    /// never stalls an async worker.
    async fn run<T, F>(&self, op: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, DbError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            op(&mut conn)
        })
        .await?
    }

    // Create the database schema
    pub async fn create_schema(&self) -> Result<(), DbError> {
        self.run(|conn| {
            // 1. Users table
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );",
            )?;

            // 2. Reviews table, ratings embedded as a JSON list
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS reviews (
                    id TEXT PRIMARY KEY,
                    book_title TEXT NOT NULL,
                    author TEXT NOT NULL,
                    review_content TEXT NOT NULL,
                    reviewer_id TEXT NOT NULL,
                    ratings TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (reviewer_id) REFERENCES users(id)
                );",
            )?;
            debug!("[DB] Schema ready");
            Ok(())
        })
        .await
    }

    pub async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, DbError> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now(),
        };

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)",
                params![
                    &user.id,
                    &user.username,
                    &user.password_hash,
                    format_timestamp(user.created_at)
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::DuplicateUsername(user.username.clone())
                } else {
                    e.into()
                }
            })?;

            info!("[DB] User created: {} ({})", user.username, user.id);
            Ok(user)
        })
        .await
    }

    pub async fn find_user_by_name(&self, username: &str) -> Result<Option<User>, DbError> {
        let username = username.to_string();
        self.run(move |conn| find_user(conn, "username", &username)).await
    }

    pub async fn find_user_by_id(&self, user_id: &str) -> Result<Option<User>, DbError> {
        let user_id = user_id.to_string();
        self.run(move |conn| find_user(conn, "id", &user_id)).await
    }

    pub async fn create_review(&self, reviewer_id: &str, new: NewReview) -> Result<Review, DbError> {
        let review = Review {
            id: Uuid::new_v4().to_string(),
            book_title: new.book_title,
            author: new.author,
            review_content: new.review_content,
            reviewer: reviewer_id.to_string(),
            ratings: Vec::new(),
            created_at: now(),
        };

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO reviews (id, book_title, author, review_content, reviewer_id, ratings, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    &review.id,
                    &review.book_title,
                    &review.author,
                    &review.review_content,
                    &review.reviewer,
                    serde_json::to_string(&review.ratings)?,
                    format_timestamp(review.created_at),
                ],
            )?;

            info!("[DB] Review created: {} by {}", review.id, review.reviewer);
            Ok(review)
        })
        .await
    }

    // Retrieve all reviews, oldest first, with the reviewer's username
    pub async fn find_all_reviews(&self) -> Result<Vec<ReviewListing>, DbError> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REVIEW_COLUMNS}, u.username
                FROM reviews r
                JOIN users u ON u.id = r.reviewer_id
                ORDER BY r.created_at ASC, r.rowid ASC"
            ))?;

            let rows =
                stmt.query_map([], |row| Ok((ReviewRow::read(row)?, row.get::<_, String>(7)?)))?;

            let mut result = Vec::new();
            for row in rows {
                let (review, username) = row?;
                result.push(review.into_listing(username)?);
            }
            debug!("[DB] Fetched {} reviews", result.len());
            Ok(result)
        })
        .await
    }

    pub async fn find_review(&self, review_id: &str) -> Result<Option<Review>, DbError> {
        let review_id = review_id.to_string();
        self.run(move |conn| load_review(conn, &review_id)).await
    }

    pub async fn find_review_listing(&self, review_id: &str) -> Result<Option<ReviewListing>, DbError> {
        let review_id = review_id.to_string();
        self.run(move |conn| find_listing(conn, &review_id)).await
    }

    /// Applies the present fields of `update`. Callers authorize first.
    pub async fn update_review(&self, review_id: &str, update: ReviewUpdate) -> Result<Review, DbError> {
        let review_id = review_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;

            let mut review = load_review(&tx, &review_id)?.ok_or(DbError::NotFound)?;
            update.apply(&mut review);

            tx.execute(
                "UPDATE reviews SET book_title = ?, author = ?, review_content = ? WHERE id = ?",
                params![&review.book_title, &review.author, &review.review_content, &review_id],
            )?;
            tx.commit()?;

            info!("[DB] Review updated: {}", review_id);
            Ok(review)
        })
        .await
    }

    /// Removes the review. Callers authorize first.
    pub async fn delete_review(&self, review_id: &str) -> Result<(), DbError> {
        let review_id = review_id.to_string();
        self.run(move |conn| {
            let deleted = conn.execute("DELETE FROM reviews WHERE id = ?", [&review_id])?;
            if deleted == 0 {
                return Err(DbError::NotFound);
            }
            info!("[DB] Review deleted: {}", review_id);
            Ok(())
        })
        .await
    }

    /// Appends a rating only if the rating rules still hold at write time.
    ///
    /// The read, the rule check and the write share one transaction under
    /// the connection lock, so concurrent submissions cannot both pass the
    /// duplicate check or overwrite each other's ratings.
    pub async fn add_rating(&self, review_id: &str, user_id: &str, value: i64) -> Result<Review, DbError> {
        let review_id = review_id.to_string();
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;

            let mut review = load_review(&tx, &review_id)?.ok_or(DbError::NotFound)?;
            rules::apply_rating(&mut review, &user_id, value)?;

            tx.execute(
                "UPDATE reviews SET ratings = ? WHERE id = ?",
                params![serde_json::to_string(&review.ratings)?, &review_id],
            )?;
            tx.commit()?;

            info!("[DB] Rating {} added to {} by {}", value, review_id, user_id);
            Ok(review)
        })
        .await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::review::Rating;

    impl Database {
        async fn ratings_for(&self, review_id: &str) -> Vec<Rating> {
            self.find_review(review_id).await.unwrap().unwrap().ratings
        }
    }

    // Helper function to create test database
    async fn create_test_db() -> Database {
        let db = Database::new(":memory:").unwrap();
        db.create_schema().await.unwrap();
        db
    }

    fn dune() -> NewReview {
        NewReview {
            book_title: "Dune".into(),
            author: "Herbert".into(),
            review_content: "great".into(),
        }
    }

    #[tokio::test]
    async fn test_schema_creation() {
        let db = create_test_db().await;

        // Verify tables exist
        let conn = db.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"reviews".to_string()));
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let db = create_test_db().await;
        db.create_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_user_lookup_and_duplicates() {
        let db = create_test_db().await;
        let alice = db.create_user("alice", "hash").await.unwrap();

        let found = db.find_user_by_name("alice").await.unwrap().unwrap();
        assert_eq!(found, alice);
        assert!(db.find_user_by_name("nobody").await.unwrap().is_none());

        let by_id = db.find_user_by_id(&alice.id).await.unwrap().unwrap();
        assert_eq!(by_id, alice);
        assert!(db.find_user_by_id("ghost-user").await.unwrap().is_none());

        let err = db.create_user("alice", "other").await.unwrap_err();
        assert!(matches!(err, DbError::DuplicateUsername(name) if name == "alice"));
    }

    #[tokio::test]
    async fn test_full_review_lifecycle() {
        let db = create_test_db().await;
        let alice = db.create_user("alice", "hash").await.unwrap();

        // Creation
        let review = db.create_review(&alice.id, dune()).await.unwrap();
        assert_eq!(review.reviewer, alice.id);
        assert!(review.ratings.is_empty());

        // Retrieval
        let stored = db.find_review(&review.id).await.unwrap().unwrap();
        assert_eq!(stored, review);

        let listing = db.find_all_reviews().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].reviewer.username, "alice");
        assert_eq!(listing[0].reviewer.id, alice.id);

        // Update
        let update = ReviewUpdate {
            review_content: Some("even better".into()),
            ..Default::default()
        };
        let updated = db.update_review(&review.id, update).await.unwrap();
        assert_eq!(updated.review_content, "even better");
        assert_eq!(updated.book_title, "Dune");
        assert_eq!(
            db.find_review(&review.id).await.unwrap().unwrap().review_content,
            "even better"
        );

        // Deletion
        db.delete_review(&review.id).await.unwrap();
        assert!(db.find_review(&review.id).await.unwrap().is_none());
        assert!(db.find_all_reviews().await.unwrap().is_empty());
        assert!(matches!(db.delete_review(&review.id).await, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn test_find_all_keeps_creation_order() {
        let db = create_test_db().await;
        let alice = db.create_user("alice", "hash").await.unwrap();
        let bob = db.create_user("bob", "hash").await.unwrap();

        db.create_review(&alice.id, dune()).await.unwrap();
        let mut second = dune();
        second.book_title = "Emma".into();
        db.create_review(&bob.id, second).await.unwrap();

        let listing = db.find_all_reviews().await.unwrap();
        let titles: Vec<_> = listing.iter().map(|r| r.book_title.as_str()).collect();
        assert_eq!(titles, ["Dune", "Emma"]);
        assert_eq!(listing[1].reviewer.username, "bob");
    }

    #[tokio::test]
    async fn test_rating_rules_enforced_at_write() {
        let db = create_test_db().await;
        let alice = db.create_user("alice", "hash").await.unwrap();
        let bob = db.create_user("bob", "hash").await.unwrap();
        let review = db.create_review(&alice.id, dune()).await.unwrap();

        let rated = db.add_rating(&review.id, &bob.id, 4).await.unwrap();
        assert_eq!(rated.ratings, vec![Rating { user: bob.id.clone(), rating: 4 }]);

        assert!(matches!(
            db.add_rating(&review.id, &bob.id, 5).await,
            Err(DbError::Rating(RatingError::DuplicateRating))
        ));
        assert!(matches!(
            db.add_rating(&review.id, &alice.id, 5).await,
            Err(DbError::Rating(RatingError::SelfRating))
        ));
        assert!(matches!(
            db.add_rating("missing", &bob.id, 5).await,
            Err(DbError::NotFound)
        ));

        // Rejected attempts leave the document untouched
        assert_eq!(db.ratings_for(&review.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ratings_from_same_user() {
        let db = create_test_db().await;
        let alice = db.create_user("alice", "hash").await.unwrap();
        let bob = db.create_user("bob", "hash").await.unwrap();
        let review = db.create_review(&alice.id, dune()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let db = db.clone();
                let review_id = review.id.clone();
                let bob_id = bob.id.clone();
                tokio::spawn(async move { db.add_rating(&review_id, &bob_id, 1 + i % 5).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(DbError::Rating(RatingError::DuplicateRating)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(db.ratings_for(&review.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_review() {
        let db = create_test_db().await;
        let result = db.update_review("missing", ReviewUpdate::default()).await;
        assert!(matches!(result, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn test_created_at_matches_later_reads() {
        let db = create_test_db().await;
        let alice = db.create_user("alice", "hash").await.unwrap();
        let review = db.create_review(&alice.id, dune()).await.unwrap();

        let stored_user = db.find_user_by_name("alice").await.unwrap().unwrap();
        assert_eq!(stored_user.created_at, alice.created_at);

        let listing = db.find_review_listing(&review.id).await.unwrap().unwrap();
        assert_eq!(listing.created_at, review.created_at);
        assert_eq!(db.find_all_reviews().await.unwrap()[0].created_at, review.created_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ratings_from_distinct_users() {
        let db = create_test_db().await;
        let alice = db.create_user("alice", "hash").await.unwrap();
        let review = db.create_review(&alice.id, dune()).await.unwrap();

        let mut raters = Vec::new();
        for i in 0..16 {
            raters.push(db.create_user(&format!("rater-{i}"), "hash").await.unwrap());
        }

        let handles: Vec<_> = raters
            .iter()
            .enumerate()
            .map(|(i, rater)| {
                let db = db.clone();
                let review_id = review.id.clone();
                let rater_id = rater.id.clone();
                let value = 1 + (i as i64) % 5;
                tokio::spawn(async move { db.add_rating(&review_id, &rater_id, value).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // No rating is lost to an interleaved read-then-write
        let ratings = db.ratings_for(&review.id).await;
        assert_eq!(ratings.len(), raters.len());
        for rater in &raters {
            assert_eq!(ratings.iter().filter(|r| r.user == rater.id).count(), 1);
        }
    }
}
