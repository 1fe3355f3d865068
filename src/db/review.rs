use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::utils::string_enum;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    PublisherToHunter,
    HunterToPublisher,
}

string_enum!(ReviewType {
    PublisherToHunter => "publisher_to_hunter",
    HunterToPublisher => "hunter_to_publisher",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Active,
    Deleted,
}

string_enum!(ReviewStatus {
    Active => "active",
    Deleted => "deleted",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRatings {
    #[serde(default, rename = "quality_rating")]
    pub quality: Option<u8>,
    #[serde(default, rename = "communication_rating")]
    pub communication: Option<u8>,
    #[serde(default, rename = "timeliness_rating")]
    pub timeliness: Option<u8>,
    #[serde(default, rename = "professionalism_rating")]
    pub professionalism: Option<u8>,
}

impl SubRatings {
    pub fn values(&self) -> [Option<u8>; 4] {
        [self.quality, self.communication, self.timeliness, self.professionalism]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub task_id: Uuid,
    pub reviewer_id: Uuid,
    pub target_id: Uuid,
    pub review_type: ReviewType,
    pub rating: u8,
    pub comment: Option<String>,
    #[serde(flatten)]
    pub sub_ratings: SubRatings,
    pub is_anonymous: bool,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn is_active(&self) -> bool {
        self.status == ReviewStatus::Active
    }

    /// Two active reviews with the same key may not coexist.
    pub fn same_key(&self, other: &Review) -> bool {
        self.task_id == other.task_id
            && self.reviewer_id == other.reviewer_id
            && self.target_id == other.target_id
            && self.review_type == other.review_type
    }

    /// Hides the reviewer for anonymous reviews before they leave the service.
    pub fn redacted(mut self) -> Self {
        if self.is_anonymous {
            self.reviewer_id = Uuid::nil();
        }
        self
    }
}

/// A change to the review set of one target, committed together with the
/// recomputed reputation.
#[derive(Debug, Clone)]
pub enum ReviewChange {
    Create(Review),
    Edit {
        review_id: Uuid,
        rating: u8,
        comment: Option<String>,
        sub_ratings: SubRatings,
        at: DateTime<Utc>,
    },
    Delete {
        review_id: Uuid,
        at: DateTime<Utc>,
    },
    Recompute(Uuid),
}
