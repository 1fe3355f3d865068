use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::badge::AwardedBadge;
use super::policy::{ReputationPolicy, Tier};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionAverages {
    pub quality: f64,
    pub communication: f64,
    pub timeliness: f64,
    pub professionalism: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub user_id: Uuid,
    pub policy: ReputationPolicy,
    pub score: f64,
    pub tier: Tier,
    pub total_reviews: u32,
    pub positive_reviews: u32,
    pub neutral_reviews: u32,
    pub negative_reviews: u32,
    pub average_rating: f64,
    pub dimensions: DimensionAverages,
    pub badges: Vec<AwardedBadge>,
    pub updated_at: DateTime<Utc>,
}

impl ReputationRecord {
    /// Equal in everything except when it was written.
    pub fn same_standing(&self, other: &ReputationRecord) -> bool {
        self.user_id == other.user_id
            && self.policy == other.policy
            && self.score == other.score
            && self.tier == other.tier
            && self.total_reviews == other.total_reviews
            && self.positive_reviews == other.positive_reviews
            && self.neutral_reviews == other.neutral_reviews
            && self.negative_reviews == other.negative_reviews
            && self.average_rating == other.average_rating
            && self.dimensions == other.dimensions
            && self.badges == other.badges
    }

    pub fn holds_badge(&self, code: &str) -> bool {
        self.badges.iter().any(|badge| badge.code == code)
    }
}
