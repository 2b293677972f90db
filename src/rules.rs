//! Authorization and rating-integrity rules for reviews.
//!
//! Checks run in a fixed order so the same request always reports the same
//! failure: existence, then ownership (or self-rating), then duplicate
//! rating, then the rating value.

use crate::models::review::{Rating, Review};
use thiserror::Error;

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

/// Owner-only actions on a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Edit,
    Delete,
}

impl Action {
    pub fn verb(self) -> &'static str {
        match self {
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Review not found")]
    NotFound,

    #[error("Not authorized to {} this review", .0.verb())]
    NotOwner(Action),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatingError {
    #[error("You cannot rate your own review")]
    SelfRating,

    #[error("You have already rated this review")]
    DuplicateRating,

    #[error("Rating must be an integer between 1 and 5, got {0}")]
    InvalidValue(i64),
}

/// True iff `actor` wrote `review`.
pub fn can_modify(review: &Review, actor: &str) -> bool {
    review.reviewer == actor
}

/// Gates edit and delete. A missing review is reported as not found
/// regardless of who asks.
pub fn authorize(review: Option<Review>, actor: &str, action: Action) -> Result<Review, AccessError> {
    let review = review.ok_or(AccessError::NotFound)?;
    if !can_modify(&review, actor) {
        return Err(AccessError::NotOwner(action));
    }
    Ok(review)
}

/// Decides whether `actor` may attach `value` to `review` and returns the
/// rating to append.
pub fn can_rate(review: &Review, actor: &str, value: i64) -> Result<Rating, RatingError> {
    if review.reviewer == actor {
        return Err(RatingError::SelfRating);
    }
    if review.ratings.iter().any(|r| r.user == actor) {
        return Err(RatingError::DuplicateRating);
    }
    if !(MIN_RATING..=MAX_RATING).contains(&value) {
        return Err(RatingError::InvalidValue(value));
    }
    Ok(Rating {
        user: actor.to_string(),
        rating: value as u8,
    })
}

/// Runs [`can_rate`] and appends the rating on success.
pub fn apply_rating(review: &mut Review, actor: &str, value: i64) -> Result<(), RatingError> {
    let rating = can_rate(review, actor, value)?;
    review.ratings.push(rating);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn review_by(reviewer: &str) -> Review {
        Review {
            id: "review-1".into(),
            book_title: "Dune".into(),
            author: "Herbert".into(),
            review_content: "great".into(),
            reviewer: reviewer.into(),
            ratings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_can_modify() {
        let review = review_by("alice");
        assert!(can_modify(&review, "alice"));
        assert!(!can_modify(&review, "bob"));
    }

    #[test]
    fn test_authorize_reports_missing_before_ownership() {
        assert_eq!(
            authorize(None, "anyone", Action::Delete).unwrap_err(),
            AccessError::NotFound
        );
    }

    #[test]
    fn test_authorize_messages() {
        let err = authorize(Some(review_by("alice")), "bob", Action::Edit).unwrap_err();
        assert_eq!(err.to_string(), "Not authorized to edit this review");
        let err = authorize(Some(review_by("alice")), "bob", Action::Delete).unwrap_err();
        assert_eq!(err.to_string(), "Not authorized to delete this review");
    }

    #[test]
    fn test_self_rating_reported_before_value() {
        let review = review_by("alice");
        assert_eq!(can_rate(&review, "alice", 9), Err(RatingError::SelfRating));
    }

    #[test]
    fn test_duplicate_reported_before_value() {
        let mut review = review_by("alice");
        apply_rating(&mut review, "bob", 4).unwrap();
        assert_eq!(can_rate(&review, "bob", 0), Err(RatingError::DuplicateRating));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let review = review_by("alice");
        assert!(can_rate(&review, "bob", 1).is_ok());
        assert!(can_rate(&review, "bob", 5).is_ok());
        assert_eq!(can_rate(&review, "bob", 0), Err(RatingError::InvalidValue(0)));
        assert_eq!(can_rate(&review, "bob", 6), Err(RatingError::InvalidValue(6)));
    }

    #[test]
    fn test_ratings_keep_submission_order() {
        let mut review = review_by("alice");
        apply_rating(&mut review, "bob", 4).unwrap();
        apply_rating(&mut review, "carol", 2).unwrap();
        let users: Vec<_> = review.ratings.iter().map(|r| r.user.as_str()).collect();
        assert_eq!(users, ["bob", "carol"]);
    }

    proptest! {
        #[test]
        fn prop_rating_once_then_duplicate(value in 1i64..=5, second in any::<i64>()) {
            let mut review = review_by("alice");
            apply_rating(&mut review, "bob", value).unwrap();

            let entries: Vec<_> = review.ratings.iter().filter(|r| r.user == "bob").collect();
            prop_assert_eq!(entries.len(), 1);
            prop_assert_eq!(entries[0].rating as i64, value);
            prop_assert_eq!(
                apply_rating(&mut review, "bob", second),
                Err(RatingError::DuplicateRating)
            );
            prop_assert_eq!(review.ratings.len(), 1);
        }

        #[test]
        fn prop_reviewer_never_rates_own_review(value in any::<i64>()) {
            let mut review = review_by("alice");
            prop_assert_eq!(apply_rating(&mut review, "alice", value), Err(RatingError::SelfRating));
            prop_assert!(review.ratings.is_empty());
        }

        #[test]
        fn prop_out_of_range_always_invalid(
            value in any::<i64>().prop_filter("out of range", |v| !(1..=5).contains(v))
        ) {
            let review = review_by("alice");
            prop_assert_eq!(can_rate(&review, "bob", value), Err(RatingError::InvalidValue(value)));
        }

        #[test]
        fn prop_only_reviewer_may_modify(actor in "[a-z]{1,12}") {
            let review = review_by("alice");
            let result = authorize(Some(review.clone()), &actor, Action::Edit);
            if actor == "alice" {
                prop_assert_eq!(result, Ok(review));
            } else {
                prop_assert_eq!(result, Err(AccessError::NotOwner(Action::Edit)));
            }
        }
    }
}
