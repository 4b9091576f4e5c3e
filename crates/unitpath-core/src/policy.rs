//! Progression thresholds.
//!
//! Every star, completion and placement cutoff lives here. Older call sites
//! disagreed with each other:
//!
//! | Concern | Values seen | Used here |
//! |---------|-------------|-----------|
//! | stars | 0.6 / 0.8 and 0.3 / 0.7 / 1.0 | 0.6 / 0.8 |
//! | unit completion | 0.8 | 0.8 |
//! | placement unlock | "any correct" and "rate ≥ 0.6" | any correct (configurable) |
//!
//! The 0.3 / 0.7 / 1.0 star set is not reproduced anywhere.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Completion rate at which a unit earns two stars.
pub const STAR_TWO_RATE: f64 = 0.6;

/// Completion rate at which a unit earns three stars.
pub const STAR_THREE_RATE: f64 = 0.8;

/// Completion rate at which a unit counts as completed and opens its
/// successor.
pub const COMPLETION_RATE: f64 = 0.8;

/// Minimum rate for [`PlacementRule::MinRate`] when none is configured.
pub const PLACEMENT_MIN_RATE: f64 = 0.6;

/// How much a 100% error rate discounts mastery.
pub const MASTERY_ERROR_WEIGHT: f64 = 0.5;

/// When a placement test is passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PlacementRule {
    /// At least one scored answer is correct.
    #[default]
    AnyCorrect,
    /// Correct answers divided by scored items reaches `rate`.
    MinRate { rate: f64 },
}

impl PlacementRule {
    pub fn passes(&self, correct: u32, scored: u32) -> bool {
        match self {
            PlacementRule::AnyCorrect => correct > 0,
            PlacementRule::MinRate { rate } => scored > 0 && ratio(correct, scored) >= *rate,
        }
    }
}

/// Whether ungraded application answers count before a human grades them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationPolicy {
    /// Count as solved immediately. Matches existing behaviour but may let
    /// a learner complete a unit with unreviewed work.
    #[default]
    CountAsPassed,
    /// Record the answer but leave it out of completion until graded.
    ExcludeUntilGraded,
}

/// The threshold set used by aggregation, gating and placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPolicy {
    #[serde(default = "default_star_two")]
    pub star_two_rate: f64,
    #[serde(default = "default_star_three")]
    pub star_three_rate: f64,
    #[serde(default = "default_completion")]
    pub completion_rate: f64,
    #[serde(default = "default_error_weight")]
    pub mastery_error_weight: f64,
    #[serde(default)]
    pub placement: PlacementRule,
    #[serde(default)]
    pub application: ApplicationPolicy,
}

fn default_star_two() -> f64 {
    STAR_TWO_RATE
}
fn default_star_three() -> f64 {
    STAR_THREE_RATE
}
fn default_completion() -> f64 {
    COMPLETION_RATE
}
fn default_error_weight() -> f64 {
    MASTERY_ERROR_WEIGHT
}

impl Default for ProgressPolicy {
    fn default() -> Self {
        Self {
            star_two_rate: STAR_TWO_RATE,
            star_three_rate: STAR_THREE_RATE,
            completion_rate: COMPLETION_RATE,
            mastery_error_weight: MASTERY_ERROR_WEIGHT,
            placement: PlacementRule::default(),
            application: ApplicationPolicy::default(),
        }
    }
}

impl ProgressPolicy {
    /// Reject threshold sets that would break the star ordering.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut rates = vec![
            ("star_two_rate", self.star_two_rate),
            ("star_three_rate", self.star_three_rate),
            ("completion_rate", self.completion_rate),
            ("mastery_error_weight", self.mastery_error_weight),
        ];
        if let PlacementRule::MinRate { rate } = self.placement {
            rates.push(("placement.rate", rate));
        }
        if let Some(&(field, value)) = rates.iter().find(|(_, v)| !(0.0..=1.0).contains(v)) {
            return Err(PolicyError::OutOfRange { field, value });
        }
        if self.star_two_rate > self.star_three_rate {
            return Err(PolicyError::StarsInverted {
                two: self.star_two_rate,
                three: self.star_three_rate,
            });
        }
        Ok(())
    }

    /// Stars for a completion rate: 0 when nothing is done, then 1, 2, 3.
    pub fn stars(&self, completion_rate: f64) -> u8 {
        if completion_rate <= 0.0 {
            0
        } else if completion_rate < self.star_two_rate {
            1
        } else if completion_rate < self.star_three_rate {
            2
        } else {
            3
        }
    }

    pub fn is_completed(&self, completion_rate: f64) -> bool {
        completion_rate >= self.completion_rate
    }

    /// Completion discounted by the historical error rate, clamped to
    /// `[0, 1]`.
    pub fn mastery(&self, completion_rate: f64, correct: u32, incorrect: u32) -> f64 {
        let error_rate = ratio(incorrect, correct + incorrect);
        (completion_rate * (1.0 - self.mastery_error_weight * error_rate)).clamp(0.0, 1.0)
    }
}

/// `num / den`, or 0 when `den` is 0.
pub fn ratio(num: u32, den: u32) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
