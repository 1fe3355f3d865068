//! Reputation scoring.
//!
//! A user's reputation is always derived from the full set of active reviews
//! that target them; it is never updated incrementally.

use thiserror::Error;
use uuid::Uuid;

use crate::db::StoreError;

pub mod aggregator;
pub mod badge;
pub mod policy;
pub mod record;
pub mod service;

pub use aggregator::aggregate;
pub use badge::{AwardedBadge, BadgeCategory, BadgeDefinition};
pub use policy::{RatingStats, ReputationPolicy, Tier};
pub use record::{DimensionAverages, ReputationRecord};
pub use service::{NewReview, RatingDistribution, ReputationService, ReviewEdit, SubRatingInput};

#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("rating {0} is outside the allowed range")]
    RatingOutOfRange(i64),
    #[error("an active review already exists for this task, reviewer, target and type")]
    DuplicateReview,
    #[error("users cannot review themselves")]
    SelfReviewNotAllowed,
    #[error("review {0} not found")]
    ReviewNotFound(Uuid),
    #[error("only the author may change review {0}")]
    NotReviewAuthor(Uuid),
    #[error("review {0} can no longer be edited")]
    EditWindowExpired(Uuid),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ReputationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateReview => ReputationError::DuplicateReview,
            StoreError::ReviewNotFound(id) => ReputationError::ReviewNotFound(id),
            other => ReputationError::Store(other),
        }
    }
}

impl ReputationError {
    pub fn code(&self) -> &'static str {
        match self {
            ReputationError::RatingOutOfRange(_) => "RATING_OUT_OF_RANGE",
            ReputationError::DuplicateReview => "DUPLICATE_REVIEW",
            ReputationError::SelfReviewNotAllowed => "SELF_REVIEW_NOT_ALLOWED",
            ReputationError::ReviewNotFound(_) => "REVIEW_NOT_FOUND",
            ReputationError::NotReviewAuthor(_) => "NOT_REVIEW_AUTHOR",
            ReputationError::EditWindowExpired(_) => "EDIT_WINDOW_EXPIRED",
            ReputationError::Store(_) => "STORAGE_ERROR",
        }
    }
}
