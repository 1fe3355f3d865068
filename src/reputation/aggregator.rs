use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::badge::{self, BadgeDefinition, BadgeInputs};
use super::policy::{rating_in_range, RatingStats, ReputationPolicy};
use super::record::{DimensionAverages, ReputationRecord};
use super::ReputationError;
use crate::db::Review;

#[derive(Debug, Default, Clone, Copy)]
struct Dimension {
    sum: u32,
    count: u32,
}

impl Dimension {
    fn add(&mut self, rating: Option<u8>) {
        if let Some(rating) = rating {
            self.sum += u32::from(rating);
            self.count += 1;
        }
    }

    fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| round2(f64::from(self.sum) / f64::from(self.count)))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn check_rating(rating: u8) -> Result<(), ReputationError> {
    if rating_in_range(rating) {
        Ok(())
    } else {
        Err(ReputationError::RatingOutOfRange(i64::from(rating)))
    }
}

/// Recomputes the reputation of `user_id` from `reviews`.
///
/// Only active reviews targeting the user count. Badges held in `prior` are
/// kept. When nothing derived has changed `prior` is returned as is, so
/// recomputing an unchanged review set is a no-op.
pub fn aggregate(
    user_id: Uuid,
    reviews: &[Review],
    policy: ReputationPolicy,
    badges: &[BadgeDefinition],
    prior: Option<&ReputationRecord>,
    now: DateTime<Utc>,
) -> Result<ReputationRecord, ReputationError> {
    let active: Vec<&Review> = reviews
        .iter()
        .filter(|review| review.target_id == user_id && review.is_active())
        .collect();

    let mut quality = Dimension::default();
    let mut communication = Dimension::default();
    let mut timeliness = Dimension::default();
    let mut professionalism = Dimension::default();

    for review in &active {
        check_rating(review.rating)?;
        for rating in review.sub_ratings.values().into_iter().flatten() {
            check_rating(rating)?;
        }
        quality.add(review.sub_ratings.quality);
        communication.add(review.sub_ratings.communication);
        timeliness.add(review.sub_ratings.timeliness);
        professionalism.add(review.sub_ratings.professionalism);
    }

    let stats = RatingStats::from_ratings(active.iter().map(|review| review.rating));
    let score = policy.score(&stats);
    let neutral = active.iter().filter(|review| review.rating == 3).count() as u32;
    let average_rating = (stats.count > 0).then(|| round2(stats.mean()));

    let inputs = BadgeInputs {
        total_reviews: stats.count,
        average_rating,
        quality: quality.average(),
        communication: communication.average(),
        timeliness: timeliness.average(),
        professionalism: professionalism.average(),
    };

    let mut held = prior.map(|record| record.badges.clone()).unwrap_or_default();
    let earned = badge::newly_earned(badges, &inputs, &held, now);
    for award in &earned {
        tracing::info!("user {user_id} earned badge {}", award.code);
    }
    held.extend(earned);

    let record = ReputationRecord {
        user_id,
        policy,
        score,
        tier: policy.tier(score),
        total_reviews: stats.count,
        positive_reviews: stats.good,
        neutral_reviews: neutral,
        negative_reviews: stats.bad,
        average_rating: average_rating.unwrap_or(0.0),
        dimensions: DimensionAverages {
            quality: inputs.quality.unwrap_or(0.0),
            communication: inputs.communication.unwrap_or(0.0),
            timeliness: inputs.timeliness.unwrap_or(0.0),
            professionalism: inputs.professionalism.unwrap_or(0.0),
        },
        badges: held,
        updated_at: now,
    };

    match prior {
        Some(prior) if prior.same_standing(&record) => Ok(prior.clone()),
        _ => Ok(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ReviewStatus, ReviewType, SubRatings};
    use crate::reputation::badge::BadgeCategory;
    use crate::reputation::Tier;

    fn review(target: Uuid, rating: u8, sub: SubRatings) -> Review {
        let now = Utc::now();
        Review {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            reviewer_id: Uuid::new_v4(),
            target_id: target,
            review_type: ReviewType::PublisherToHunter,
            rating,
            comment: None,
            sub_ratings: sub,
            is_anonymous: false,
            status: ReviewStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn empty_review_set_is_baseline() {
        let user = Uuid::new_v4();
        let record = aggregate(user, &[], ReputationPolicy::A, &[], None, Utc::now()).unwrap();
        assert_eq!(record.score, 50.0);
        assert_eq!(record.total_reviews, 0);
        assert_eq!(record.average_rating, 0.0);
        assert!(!record.score.is_nan());
    }

    #[test]
    fn ignores_deleted_and_foreign_reviews() {
        let user = Uuid::new_v4();
        let mut deleted = review(user, 1, SubRatings::default());
        deleted.status = ReviewStatus::Deleted;
        let foreign = review(Uuid::new_v4(), 1, SubRatings::default());
        let kept = review(user, 4, SubRatings::default());

        let record = aggregate(user, &[deleted, foreign, kept], ReputationPolicy::B, &[], None, Utc::now())
            .unwrap();
        assert_eq!(record.total_reviews, 1);
        assert_eq!(record.score, 8.0);
        assert_eq!(record.tier, Tier::Platinum);
        assert_eq!(record.positive_reviews, 1);
    }

    #[test]
    fn dimensions_average_only_contributors() {
        let user = Uuid::new_v4();
        let reviews = vec![
            review(user, 5, SubRatings { quality: Some(5), ..Default::default() }),
            review(user, 3, SubRatings { quality: Some(4), timeliness: Some(2), ..Default::default() }),
            review(user, 2, SubRatings::default()),
        ];
        let record = aggregate(user, &reviews, ReputationPolicy::A, &[], None, Utc::now()).unwrap();
        assert_eq!(record.dimensions.quality, 4.5);
        assert_eq!(record.dimensions.timeliness, 2.0);
        assert_eq!(record.dimensions.communication, 0.0);
        assert_eq!(record.neutral_reviews, 1);
        assert_eq!(record.negative_reviews, 1);
        assert_eq!(record.average_rating, 3.33);
    }

    #[test]
    fn rejects_out_of_range_ratings() {
        let user = Uuid::new_v4();
        let bad = review(user, 7, SubRatings::default());
        let err = aggregate(user, &[bad], ReputationPolicy::A, &[], None, Utc::now()).unwrap_err();
        assert!(matches!(err, ReputationError::RatingOutOfRange(7)));

        let bad_sub = review(user, 4, SubRatings { professionalism: Some(0), ..Default::default() });
        let err = aggregate(user, &[bad_sub], ReputationPolicy::A, &[], None, Utc::now()).unwrap_err();
        assert!(matches!(err, ReputationError::RatingOutOfRange(0)));
    }

    #[test]
    fn unchanged_set_returns_prior_untouched() {
        let user = Uuid::new_v4();
        let reviews = vec![review(user, 4, SubRatings::default())];
        let defs = vec![BadgeDefinition::new("first", "First", BadgeCategory::ReviewCount, 1.0, 0)];
        let first = aggregate(user, &reviews, ReputationPolicy::A, &defs, None, Utc::now()).unwrap();
        let later = first.updated_at + chrono::Duration::hours(1);
        let second = aggregate(user, &reviews, ReputationPolicy::A, &defs, Some(&first), later).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn badges_survive_score_drop() {
        let user = Uuid::new_v4();
        let defs = vec![BadgeDefinition::new("avg", "Avg", BadgeCategory::AverageRating, 4.5, 1)];
        let good = vec![review(user, 5, SubRatings::default())];
        let first = aggregate(user, &good, ReputationPolicy::A, &defs, None, Utc::now()).unwrap();
        assert!(first.holds_badge("avg"));

        let mut worse = good.clone();
        worse.push(review(user, 1, SubRatings::default()));
        let second = aggregate(user, &worse, ReputationPolicy::A, &defs, Some(&first), Utc::now()).unwrap();
        assert!(second.holds_badge("avg"));
        assert_eq!(second.badges.len(), 1);
    }
}
