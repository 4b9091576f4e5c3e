//! One-retry attempt policy.
//!
//! An [`Attempt`] is the state of one exercise during one render lifecycle:
//!
//! ```text
//! Unanswered --correct--> Resolved(true)
//! Unanswered --wrong----> FirstWrong --correct--> Resolved(true)
//!                                    --wrong----> Resolved(false)
//! Unanswered | FirstWrong --skip--> Resolved(false)
//! ```
//!
//! Only transitions into `Resolved` produce a [`DurableOutcome`]; a first
//! wrong answer is never persisted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AttemptError;
use crate::evaluator::Verdict;

/// Where an attempt stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    #[default]
    Unanswered,
    FirstWrong,
    Resolved { correct: bool },
}

/// What the learner should see after a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    /// Gentle retry prompt plus the exercise's optional help content.
    RetryPrompt,
    /// The attempt is over; show the explanation.
    RevealExplanation,
}

/// An outcome that must be written as an answer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurableOutcome {
    pub is_correct: bool,
    pub skipped: bool,
    /// Set when the verdict was `Ungraded`.
    pub pending_review: bool,
    pub attempt_count: u32,
}

/// Result of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptStep {
    pub verdict: Verdict,
    pub state: AttemptState,
    pub feedback: Feedback,
    pub durable: Option<DurableOutcome>,
}

/// Retry state for one exercise, passed explicitly into every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub exercise_id: String,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default)]
    pub state: AttemptState,
    #[serde(default)]
    pub last_outcome: Option<Verdict>,
}

impl Attempt {
    pub fn new(exercise_id: impl Into<String>) -> Self {
        Self {
            exercise_id: exercise_id.into(),
            attempt_count: 0,
            state: AttemptState::Unanswered,
            last_outcome: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, AttemptState::Resolved { .. })
    }

    /// Apply a graded submission.
    pub fn submit(&mut self, verdict: Verdict) -> Result<AttemptStep, AttemptError> {
        let next = match (self.state, verdict.is_correct()) {
            (AttemptState::Resolved { .. }, _) => {
                return Err(AttemptError::AlreadyResolved(self.exercise_id.clone()))
            }
            (_, true) => AttemptState::Resolved { correct: true },
            (AttemptState::Unanswered, false) => AttemptState::FirstWrong,
            (AttemptState::FirstWrong, false) => AttemptState::Resolved { correct: false },
        };

        self.attempt_count += 1;
        self.state = next;
        self.last_outcome = Some(verdict);
        tracing::debug!(
            exercise_id = %self.exercise_id,
            attempt = self.attempt_count,
            state = ?next,
            "attempt transition"
        );

        let (feedback, durable) = match next {
            AttemptState::Resolved { correct } => (
                Feedback::RevealExplanation,
                Some(DurableOutcome {
                    is_correct: correct,
                    skipped: false,
                    pending_review: verdict.is_ungraded(),
                    attempt_count: self.attempt_count,
                }),
            ),
            _ => (Feedback::RetryPrompt, None),
        };

        Ok(AttemptStep {
            verdict,
            state: next,
            feedback,
            durable,
        })
    }

    /// Give up on the exercise, bypassing the retry leniency.
    pub fn skip(&mut self) -> Result<DurableOutcome, AttemptError> {
        if self.is_resolved() {
            return Err(AttemptError::AlreadyResolved(self.exercise_id.clone()));
        }
        self.state = AttemptState::Resolved { correct: false };
        self.last_outcome = Some(Verdict::Incorrect);
        Ok(DurableOutcome {
            is_correct: false,
            skipped: true,
            pending_review: false,
            attempt_count: self.attempt_count,
        })
    }
}

/// Attempts of one practice session, keyed by exercise id.
#[derive(Debug, Clone, Default)]
pub struct AttemptTracker {
    attempts: HashMap<String, Attempt>,
}

impl AttemptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current attempt for an exercise, starting one if needed.
    pub fn current(&mut self, exercise_id: &str) -> &mut Attempt {
        self.attempts
            .entry(exercise_id.to_string())
            .or_insert_with(|| Attempt::new(exercise_id))
    }

    pub fn get(&self, exercise_id: &str) -> Option<&Attempt> {
        self.attempts.get(exercise_id)
    }

    /// Replace the attempt for its exercise, e.g. with the copy a server
    /// returned.
    pub fn put(&mut self, attempt: Attempt) {
        self.attempts.insert(attempt.exercise_id.clone(), attempt);
    }

    pub fn submit(&mut self, exercise_id: &str, verdict: Verdict) -> Result<AttemptStep, AttemptError> {
        self.current(exercise_id).submit(verdict)
    }

    pub fn skip(&mut self, exercise_id: &str) -> Result<DurableOutcome, AttemptError> {
        self.current(exercise_id).skip()
    }

    /// Start a new render lifecycle for the exercise.
    pub fn reset(&mut self, exercise_id: &str) {
        self.attempts.remove(exercise_id);
    }
}
