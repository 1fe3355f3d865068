use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::review::MAX_RATING;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCategory {
    Quality,
    Communication,
    Timeliness,
    Professionalism,
    ReviewCount,
    AverageRating,
}

impl BadgeCategory {
    fn is_rating(&self) -> bool {
        !matches!(self, BadgeCategory::ReviewCount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeDefinition {
    pub code: String,
    pub name: String,
    pub category: BadgeCategory,
    pub threshold: f64,
    /// Reviews a user needs before a rating badge can be earned.
    #[serde(default)]
    pub min_reviews: u32,
}

impl BadgeDefinition {
    pub fn new(code: &str, name: &str, category: BadgeCategory, threshold: f64, min_reviews: u32) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            category,
            threshold,
            min_reviews,
        }
    }

    pub fn check(&self) -> Result<(), &'static str> {
        if self.code.trim().is_empty() {
            return Err("empty badge code");
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err("threshold must be a non-negative number");
        }
        if self.category.is_rating() && self.threshold > f64::from(MAX_RATING) {
            return Err("rating threshold above the rating scale");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardedBadge {
    pub code: String,
    pub name: String,
    pub awarded_at: DateTime<Utc>,
}

/// What a badge rule can be measured against. A dimension with no
/// contributing reviews has `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BadgeInputs {
    pub total_reviews: u32,
    pub average_rating: Option<f64>,
    pub quality: Option<f64>,
    pub communication: Option<f64>,
    pub timeliness: Option<f64>,
    pub professionalism: Option<f64>,
}

impl BadgeInputs {
    fn measure(&self, category: BadgeCategory) -> Option<f64> {
        match category {
            BadgeCategory::Quality => self.quality,
            BadgeCategory::Communication => self.communication,
            BadgeCategory::Timeliness => self.timeliness,
            BadgeCategory::Professionalism => self.professionalism,
            BadgeCategory::AverageRating => self.average_rating,
            BadgeCategory::ReviewCount => Some(f64::from(self.total_reviews)),
        }
    }
}

/// Badges newly earned by `inputs`. Already held badges are never returned
/// again and nothing is ever taken away; malformed definitions are skipped.
pub fn newly_earned(
    definitions: &[BadgeDefinition],
    inputs: &BadgeInputs,
    held: &[AwardedBadge],
    now: DateTime<Utc>,
) -> Vec<AwardedBadge> {
    let mut earned: Vec<AwardedBadge> = Vec::new();

    for definition in definitions {
        if let Err(reason) = definition.check() {
            tracing::warn!("skipping badge definition {:?}: {reason}", definition.code);
            continue;
        }
        let already_held = held.iter().chain(earned.iter()).any(|b| b.code == definition.code);
        if already_held || inputs.total_reviews < definition.min_reviews {
            continue;
        }
        let Some(value) = inputs.measure(definition.category) else {
            continue;
        };
        if value >= definition.threshold {
            earned.push(AwardedBadge {
                code: definition.code.clone(),
                name: definition.name.clone(),
                awarded_at: now,
            });
        }
    }

    earned
}

pub fn default_catalogue() -> Vec<BadgeDefinition> {
    vec![
        BadgeDefinition::new("first_review", "First Review", BadgeCategory::ReviewCount, 1.0, 0),
        BadgeDefinition::new("rising_star", "Rising Star", BadgeCategory::ReviewCount, 10.0, 0),
        BadgeDefinition::new("veteran", "Veteran Hunter", BadgeCategory::ReviewCount, 50.0, 0),
        BadgeDefinition::new("five_star", "Five Star", BadgeCategory::AverageRating, 4.9, 20),
        BadgeDefinition::new("quality_master", "Quality Master", BadgeCategory::Quality, 4.8, 5),
        BadgeDefinition::new("great_communicator", "Great Communicator", BadgeCategory::Communication, 4.8, 5),
        BadgeDefinition::new("always_on_time", "Always On Time", BadgeCategory::Timeliness, 4.8, 5),
        BadgeDefinition::new("consummate_pro", "Consummate Professional", BadgeCategory::Professionalism, 4.8, 5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(total_reviews: u32, quality: Option<f64>) -> BadgeInputs {
        BadgeInputs {
            total_reviews,
            average_rating: Some(4.0),
            quality,
            ..Default::default()
        }
    }

    #[test]
    fn default_catalogue_is_well_formed() {
        assert!(default_catalogue().iter().all(|d| d.check().is_ok()));
    }

    #[test]
    fn awards_once_threshold_met() {
        let defs = vec![BadgeDefinition::new("q", "Q", BadgeCategory::Quality, 4.5, 2)];
        let now = Utc::now();
        assert!(newly_earned(&defs, &inputs(1, Some(5.0)), &[], now).is_empty());
        let earned = newly_earned(&defs, &inputs(2, Some(4.5)), &[], now);
        assert_eq!(earned.len(), 1);
        assert_eq!(earned[0].code, "q");
    }

    #[test]
    fn held_badges_are_not_awarded_twice() {
        let defs = vec![BadgeDefinition::new("count", "Count", BadgeCategory::ReviewCount, 1.0, 0)];
        let now = Utc::now();
        let held = newly_earned(&defs, &inputs(3, None), &[], now);
        assert!(newly_earned(&defs, &inputs(3, None), &held, now).is_empty());
    }

    #[test]
    fn dimension_without_contributors_never_awards() {
        let defs = vec![BadgeDefinition::new("q", "Q", BadgeCategory::Quality, 0.0, 0)];
        assert!(newly_earned(&defs, &inputs(10, None), &[], Utc::now()).is_empty());
    }

    #[test]
    fn malformed_definitions_are_skipped() {
        let defs = vec![
            BadgeDefinition::new("", "Nameless", BadgeCategory::ReviewCount, 1.0, 0),
            BadgeDefinition::new("nan", "NaN", BadgeCategory::ReviewCount, f64::NAN, 0),
            BadgeDefinition::new("too_high", "Too High", BadgeCategory::Quality, 6.0, 0),
            BadgeDefinition::new("ok", "Ok", BadgeCategory::ReviewCount, 1.0, 0),
        ];
        let earned = newly_earned(&defs, &inputs(1, Some(5.0)), &[], Utc::now());
        let codes: Vec<_> = earned.iter().map(|b| b.code.as_str()).collect();
        assert_eq!(codes, vec!["ok"]);
    }
}
