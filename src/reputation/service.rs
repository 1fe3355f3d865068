use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregator::aggregate;
use super::badge::BadgeDefinition;
use super::policy::{rating_in_range, ReputationPolicy};
use super::record::ReputationRecord;
use super::ReputationError;
use crate::db::{Review, ReviewChange, ReviewStatus, ReviewStore, ReviewType, SubRatings};

/// A review as submitted. Ratings are plain integers here so that out of
/// range values reach the range check instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub task_id: Uuid,
    pub target_id: Uuid,
    pub review_type: ReviewType,
    pub rating: i64,
    pub comment: Option<String>,
    #[serde(flatten)]
    pub sub_ratings: SubRatingInput,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewEdit {
    pub rating: i64,
    pub comment: Option<String>,
    #[serde(flatten)]
    pub sub_ratings: SubRatingInput,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SubRatingInput {
    #[serde(default, rename = "quality_rating")]
    pub quality: Option<i64>,
    #[serde(default, rename = "communication_rating")]
    pub communication: Option<i64>,
    #[serde(default, rename = "timeliness_rating")]
    pub timeliness: Option<i64>,
    #[serde(default, rename = "professionalism_rating")]
    pub professionalism: Option<i64>,
}

impl SubRatingInput {
    fn checked(self) -> Result<SubRatings, ReputationError> {
        let check = |value: Option<i64>| value.map(checked_rating).transpose();
        Ok(SubRatings {
            quality: check(self.quality)?,
            communication: check(self.communication)?,
            timeliness: check(self.timeliness)?,
            professionalism: check(self.professionalism)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RatingDistribution {
    pub total_reviews: u32,
    pub five_star: u32,
    pub four_star: u32,
    pub three_star: u32,
    pub two_star: u32,
    pub one_star: u32,
}

impl RatingDistribution {
    fn add(&mut self, rating: u8) {
        self.total_reviews += 1;
        match rating {
            5 => self.five_star += 1,
            4 => self.four_star += 1,
            3 => self.three_star += 1,
            2 => self.two_star += 1,
            _ => self.one_star += 1,
        }
    }
}

/// Review lifecycle plus the synchronous reputation recomputation that every
/// review change triggers.
pub struct ReputationService {
    store: Arc<dyn ReviewStore>,
    policy: ReputationPolicy,
    badges: Arc<Vec<BadgeDefinition>>,
    edit_window: Duration,
}

impl ReputationService {
    pub fn new(
        store: Arc<dyn ReviewStore>,
        policy: ReputationPolicy,
        badges: Vec<BadgeDefinition>,
        edit_window: Duration,
    ) -> Self {
        Self {
            store,
            policy,
            badges: Arc::new(badges),
            edit_window,
        }
    }

    pub fn badge_catalogue(&self) -> &[BadgeDefinition] {
        &self.badges
    }

    pub async fn submit_review(
        &self,
        reviewer_id: Uuid,
        req: NewReview,
    ) -> Result<(Review, ReputationRecord), ReputationError> {
        if reviewer_id == req.target_id {
            return Err(ReputationError::SelfReviewNotAllowed);
        }
        let rating = checked_rating(req.rating)?;
        let sub_ratings = req.sub_ratings.checked()?;

        let now = Utc::now();
        let review = Review {
            id: Uuid::new_v4(),
            task_id: req.task_id,
            reviewer_id,
            target_id: req.target_id,
            review_type: req.review_type,
            rating,
            comment: req.comment,
            sub_ratings,
            is_anonymous: req.is_anonymous,
            status: ReviewStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let review_id = review.id;
        let (review, record) = self.commit(ReviewChange::Create(review)).await?;
        let review = review.ok_or(ReputationError::ReviewNotFound(review_id))?;
        tracing::info!(
            "review {} created for user {}, score now {}",
            review.id,
            review.target_id,
            record.score
        );
        Ok((review, record))
    }

    pub async fn edit_review(
        &self,
        reviewer_id: Uuid,
        review_id: Uuid,
        edit: ReviewEdit,
    ) -> Result<(Review, ReputationRecord), ReputationError> {
        let existing = self.authored_review(reviewer_id, review_id).await?;
        let now = Utc::now();
        if now - existing.created_at > self.edit_window {
            return Err(ReputationError::EditWindowExpired(review_id));
        }
        let rating = checked_rating(edit.rating)?;
        let sub_ratings = edit.sub_ratings.checked()?;

        let (review, record) = self
            .commit(ReviewChange::Edit {
                review_id,
                rating,
                comment: edit.comment,
                sub_ratings,
                at: now,
            })
            .await?;
        let review = review.ok_or(ReputationError::ReviewNotFound(review_id))?;
        tracing::info!("review {review_id} edited, score of {} now {}", review.target_id, record.score);
        Ok((review, record))
    }

    pub async fn delete_review(
        &self,
        reviewer_id: Uuid,
        review_id: Uuid,
    ) -> Result<ReputationRecord, ReputationError> {
        self.authored_review(reviewer_id, review_id).await?;
        let (_, record) = self
            .commit(ReviewChange::Delete { review_id, at: Utc::now() })
            .await?;
        tracing::info!("review {review_id} deleted, score of {} now {}", record.user_id, record.score);
        Ok(record)
    }

    pub async fn recompute_reputation(&self, user_id: Uuid) -> Result<ReputationRecord, ReputationError> {
        let (_, record) = self.commit(ReviewChange::Recompute(user_id)).await?;
        Ok(record)
    }

    /// Stored record, created from the current review set on first access.
    pub async fn reputation(&self, user_id: Uuid) -> Result<ReputationRecord, ReputationError> {
        match self.store.find_reputation(user_id).await? {
            Some(record) => Ok(record),
            None => self.recompute_reputation(user_id).await,
        }
    }

    pub async fn reviews_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Review>, u64), ReputationError> {
        let offset = page.saturating_sub(1).saturating_mul(limit);
        let (reviews, total) = self.store.list_reviews_for_target(user_id, offset, limit).await?;
        Ok((reviews.into_iter().map(Review::redacted).collect(), total))
    }

    pub async fn reviews_for_task(&self, task_id: Uuid) -> Result<Vec<Review>, ReputationError> {
        let reviews = self.store.list_reviews_for_task(task_id).await?;
        Ok(reviews.into_iter().map(Review::redacted).collect())
    }

    pub async fn rating_distribution(&self, user_id: Uuid) -> Result<RatingDistribution, ReputationError> {
        let (reviews, _) = self
            .store
            .list_reviews_for_target(user_id, 0, u64::MAX)
            .await?;
        let mut distribution = RatingDistribution::default();
        for review in reviews.iter().filter(|review| review.is_active()) {
            distribution.add(review.rating);
        }
        Ok(distribution)
    }

    async fn authored_review(&self, reviewer_id: Uuid, review_id: Uuid) -> Result<Review, ReputationError> {
        let review = self
            .store
            .find_review(review_id)
            .await?
            .filter(Review::is_active)
            .ok_or(ReputationError::ReviewNotFound(review_id))?;
        if review.reviewer_id != reviewer_id {
            tracing::warn!("user {reviewer_id} tried to change review {review_id}");
            return Err(ReputationError::NotReviewAuthor(review_id));
        }
        Ok(review)
    }

    async fn commit(&self, change: ReviewChange) -> Result<(Option<Review>, ReputationRecord), ReputationError> {
        let policy = self.policy;
        let badges = Arc::clone(&self.badges);
        let recompute = move |user_id: Uuid, reviews: &[Review], prior: Option<&ReputationRecord>| {
            let now: DateTime<Utc> = Utc::now();
            aggregate(user_id, reviews, policy, &badges, prior, now)
        };
        self.store.commit_review_change(change, &recompute).await
    }
}

fn checked_rating(rating: i64) -> Result<u8, ReputationError> {
    u8::try_from(rating)
        .ok()
        .filter(|rating| rating_in_range(*rating))
        .ok_or(ReputationError::RatingOutOfRange(rating))
}
