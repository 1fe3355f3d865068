use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::review::{MAX_RATING, MIN_RATING};

/// Rating counts a scoring policy works from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingStats {
    pub count: u32,
    pub sum: u32,
    /// ratings >= 4
    pub good: u32,
    /// ratings <= 2
    pub bad: u32,
}

impl RatingStats {
    pub fn from_ratings(ratings: impl IntoIterator<Item = u8>) -> Self {
        ratings.into_iter().fold(Self::default(), |mut stats, rating| {
            stats.count += 1;
            stats.sum += u32::from(rating);
            if rating >= 4 {
                stats.good += 1;
            }
            if rating <= 2 {
                stats.bad += 1;
            }
            stats
        })
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        f64::from(self.sum) / f64::from(self.count)
    }

    // share >= numerator/denominator, in integers so band edges are exact
    fn share_at_least(part: u32, count: u32, numerator: u32, denominator: u32) -> bool {
        u64::from(part) * u64::from(denominator) >= u64::from(count) * u64::from(numerator)
    }
}

/// The two scoring formulas. They are deliberately kept apart: one is picked
/// per deployment and never blended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReputationPolicy {
    /// 0–100 with good/bad-rate bands and a review count bonus.
    #[default]
    A,
    /// 0–10, twice the mean rating.
    B,
}

impl ReputationPolicy {
    /// Score of a user nobody has reviewed yet.
    pub fn baseline(&self) -> f64 {
        match self {
            ReputationPolicy::A => 50.0,
            ReputationPolicy::B => 0.0,
        }
    }

    pub fn score(&self, stats: &RatingStats) -> f64 {
        if stats.count == 0 {
            return self.baseline();
        }
        match self {
            ReputationPolicy::A => score_a(stats),
            ReputationPolicy::B => score_b(stats),
        }
    }

    pub fn tier(&self, score: f64) -> Tier {
        match self {
            ReputationPolicy::A => Tier::from_ten_point(score / 10.0),
            ReputationPolicy::B => Tier::from_ten_point(score),
        }
    }
}

fn score_a(stats: &RatingStats) -> f64 {
    let mut score = f64::from(stats.sum * 20) / f64::from(stats.count);

    if RatingStats::share_at_least(stats.good, stats.count, 8, 10) {
        score += 10.0;
    } else if RatingStats::share_at_least(stats.good, stats.count, 6, 10) {
        score += 5.0;
    }

    if RatingStats::share_at_least(stats.bad, stats.count, 3, 10) {
        score -= 15.0;
    } else if RatingStats::share_at_least(stats.bad, stats.count, 2, 10) {
        score -= 10.0;
    }

    score += match stats.count {
        n if n >= 50 => 5.0,
        n if n >= 20 => 3.0,
        n if n >= 10 => 1.0,
        _ => 0.0,
    };

    score.round().clamp(0.0, 100.0)
}

fn score_b(stats: &RatingStats) -> f64 {
    let score = f64::from(stats.sum * 2) / f64::from(stats.count);
    ((score * 100.0).round() / 100.0).clamp(0.0, 10.0)
}

impl FromStr for ReputationPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(ReputationPolicy::A),
            "B" => Ok(ReputationPolicy::B),
            other => Err(format!("unknown reputation policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Newbie,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    pub fn from_ten_point(score: f64) -> Tier {
        match score {
            s if s >= 9.0 => Tier::Diamond,
            s if s >= 8.0 => Tier::Platinum,
            s if s >= 7.0 => Tier::Gold,
            s if s >= 6.0 => Tier::Silver,
            s if s >= 5.0 => Tier::Bronze,
            _ => Tier::Newbie,
        }
    }
}

pub fn rating_in_range(rating: u8) -> bool {
    (MIN_RATING..=MAX_RATING).contains(&rating)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(ratings: &[u8]) -> RatingStats {
        RatingStats::from_ratings(ratings.iter().copied())
    }

    #[test]
    fn empty_set_scores_baseline() {
        assert_eq!(ReputationPolicy::A.score(&RatingStats::default()), 50.0);
        assert_eq!(ReputationPolicy::B.score(&RatingStats::default()), 0.0);
        assert_eq!(ReputationPolicy::B.tier(0.0), Tier::Newbie);
    }

    #[test]
    fn policy_a_clamps_high_scores() {
        // mean 4.6, nine of ten >= 4, none <= 2
        let s = stats(&[5, 5, 5, 5, 5, 5, 4, 4, 5, 3]);
        assert_eq!(s.sum, 46);
        assert_eq!(ReputationPolicy::A.score(&s), 100.0);
    }

    #[test]
    fn policy_a_good_rate_band_edges() {
        // 4 of 5 good = exactly 0.8
        assert_eq!(ReputationPolicy::A.score(&stats(&[4, 4, 4, 4, 3])), 86.0);
        // 3 of 5 good = exactly 0.6
        assert_eq!(ReputationPolicy::A.score(&stats(&[4, 4, 4, 3, 3])), 77.0);
        // 2 of 5 good
        assert_eq!(ReputationPolicy::A.score(&stats(&[4, 4, 3, 3, 3])), 68.0);
    }

    #[test]
    fn policy_a_bad_rate_penalties() {
        // 3 of 10 bad = 0.3: mean 3.0 -> 60, -15
        let s = stats(&[1, 2, 2, 4, 4, 4, 4, 3, 3, 3]);
        assert_eq!(s.sum, 30);
        assert_eq!(ReputationPolicy::A.score(&s), 60.0 - 15.0 + 1.0);
        // 1 of 5 bad = 0.2: mean 2.6 -> 52, -10
        assert_eq!(ReputationPolicy::A.score(&stats(&[1, 3, 3, 3, 3])), 42.0);
    }

    #[test]
    fn policy_a_never_below_zero() {
        assert_eq!(ReputationPolicy::A.score(&stats(&[1, 1, 1])), 5.0);
        let all_ones = RatingStats { count: 60, sum: 60, good: 0, bad: 60 };
        assert_eq!(ReputationPolicy::A.score(&all_ones), 10.0);
    }

    #[test]
    fn policy_a_count_bonus() {
        let twenty = RatingStats { count: 20, sum: 60, good: 0, bad: 0 };
        assert_eq!(ReputationPolicy::A.score(&twenty), 63.0);
        let fifty = RatingStats { count: 50, sum: 150, good: 0, bad: 0 };
        assert_eq!(ReputationPolicy::A.score(&fifty), 65.0);
    }

    #[test]
    fn policy_b_doubles_mean_and_maps_tiers() {
        let s = stats(&[4, 4, 4]);
        let score = ReputationPolicy::B.score(&s);
        assert_eq!(score, 8.0);
        assert_eq!(ReputationPolicy::B.tier(score), Tier::Platinum);
        assert_eq!(ReputationPolicy::B.tier(7.99), Tier::Gold);
        assert_eq!(ReputationPolicy::B.tier(9.0), Tier::Diamond);
        assert_eq!(ReputationPolicy::B.tier(4.99), Tier::Newbie);
    }

    #[test]
    fn policy_b_rounds_to_two_places() {
        // mean 13/3 = 4.333.. -> 8.67
        assert_eq!(ReputationPolicy::B.score(&stats(&[4, 4, 5])), 8.67);
        assert_eq!(ReputationPolicy::B.score(&stats(&[5, 5])), 10.0);
    }

    #[test]
    fn policy_a_tier_uses_ten_point_table() {
        assert_eq!(ReputationPolicy::A.tier(100.0), Tier::Diamond);
        assert_eq!(ReputationPolicy::A.tier(50.0), Tier::Bronze);
        assert_eq!(ReputationPolicy::A.tier(49.0), Tier::Newbie);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("a".parse::<ReputationPolicy>().unwrap(), ReputationPolicy::A);
        assert_eq!(" B ".parse::<ReputationPolicy>().unwrap(), ReputationPolicy::B);
        assert!("C".parse::<ReputationPolicy>().is_err());
    }
}
