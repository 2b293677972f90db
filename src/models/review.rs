// src/models/review.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single peer score attached to a review. At most one per user.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Rating {
    pub user: String, // ID of the user who submitted the rating
    pub rating: u8,   // Score in 1..=5
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: String,             // Unique ID for the review
    pub book_title: String,     // Title of the reviewed book
    pub author: String,         // Author of the reviewed book
    pub review_content: String, // Body of the review
    pub reviewer: String,       // ID of the user who wrote the review
    pub ratings: Vec<Rating>,   // Peer ratings, in submission order
    pub created_at: DateTime<Utc>,
}

/// Reviewer identity as shown on read endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Reviewer {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
}

/// A review with its reviewer resolved to a display name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewListing {
    #[serde(rename = "_id")]
    pub id: String,
    pub book_title: String,
    pub author: String,
    pub review_content: String,
    pub reviewer: Reviewer,
    pub ratings: Vec<Rating>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/reviews`.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub book_title: String,
    pub author: String,
    pub review_content: String,
}

/// Body of `PUT /api/reviews/:id`. Absent fields are left untouched.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUpdate {
    pub book_title: Option<String>,
    pub author: Option<String>,
    pub review_content: Option<String>,
}

/// Body of `POST /api/reviews/:id/rate`.
///
/// The value is kept wide so out-of-range scores reach the rule set
/// instead of failing deserialization.
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct RateRequest {
    pub rating: i64,
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} is required"))
    } else {
        Ok(())
    }
}

impl NewReview {
    pub fn validate(&self) -> Result<(), String> {
        require("bookTitle", &self.book_title)?;
        require("author", &self.author)?;
        require("reviewContent", &self.review_content)
    }
}

impl ReviewUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.book_title {
            require("bookTitle", title)?;
        }
        if let Some(author) = &self.author {
            require("author", author)?;
        }
        if let Some(content) = &self.review_content {
            require("reviewContent", content)?;
        }
        Ok(())
    }

    /// Applies the present fields onto `review`. Reviewer and ratings are
    /// never touched.
    pub fn apply(self, review: &mut Review) {
        if let Some(title) = self.book_title {
            review.book_title = title;
        }
        if let Some(author) = self.author {
            review.author = author;
        }
        if let Some(content) = self.review_content {
            review.review_content = content;
        }
    }
}
