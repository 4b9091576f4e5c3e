//! Client-side practice session.
//!
//! Holds the session context and the per-exercise attempts of one practice
//! run. When the gateway is unreachable the answer is graded locally so the
//! learner still gets feedback, and any resolved outcome is queued as
//! unsynced. The queue is only flushed by an explicit [`PracticeSession::resync`].

use std::collections::VecDeque;
use std::sync::Arc;

use uuid::Uuid;

use crate::attempt::{AttemptTracker, Feedback};
use crate::engine::{SkipRequest, SubmitOutcome, SubmitRequest};
use crate::error::EngineError;
use crate::evaluator::{evaluate_submitted, Verdict};
use crate::model::{Answer, Exercise, SessionContext};
use crate::traits::AnswerGateway;

/// A resolved outcome the gateway has not accepted yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Unsynced {
    Submit(SubmitRequest),
    Skip(SkipRequest),
}

impl Unsynced {
    pub fn exercise_id(&self) -> &str {
        match self {
            Unsynced::Submit(r) => &r.exercise_id,
            Unsynced::Skip(r) => &r.exercise_id,
        }
    }
}

/// What the learner sees after one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStep {
    pub is_correct: bool,
    pub feedback: Feedback,
    /// `false` when the result was computed locally and not persisted.
    pub synced: bool,
    /// Server-side outcome, present when `synced`.
    pub outcome: Option<SubmitOutcome>,
}

/// Result of a [`PracticeSession::resync`] pass.
#[derive(Debug, Default)]
pub struct ResyncReport {
    pub synced: usize,
    /// Entries that hit a non-retryable error and were dropped.
    pub dropped: Vec<(String, EngineError)>,
    /// Entries still waiting after a retryable error.
    pub remaining: usize,
}

pub struct PracticeSession {
    ctx: SessionContext,
    gateway: Arc<dyn AnswerGateway>,
    attempts: AttemptTracker,
    unsynced: VecDeque<Unsynced>,
}

impl PracticeSession {
    pub fn new(ctx: SessionContext, gateway: Arc<dyn AnswerGateway>) -> Self {
        Self {
            ctx,
            gateway,
            attempts: AttemptTracker::new(),
            unsynced: VecDeque::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn attempts(&self) -> &AttemptTracker {
        &self.attempts
    }

    pub fn unsynced(&self) -> impl Iterator<Item = &Unsynced> {
        self.unsynced.iter()
    }

    pub fn unsynced_len(&self) -> usize {
        self.unsynced.len()
    }

    /// A new render of the exercise starts a fresh attempt.
    pub fn render(&mut self, exercise_id: &str) {
        self.attempts.reset(exercise_id);
    }

    pub async fn submit(
        &mut self,
        exercise: &Exercise,
        answer: Answer,
        response_time_ms: u64,
    ) -> Result<SessionStep, EngineError> {
        let request = SubmitRequest {
            exercise_id: exercise.id.clone(),
            unit_id: exercise.unit_id.clone(),
            answer: answer.into(),
            attempt: self.attempts.get(&exercise.id).cloned(),
            response_time_ms,
            request_id: Some(Uuid::new_v4()),
        };

        match self.gateway.submit(&self.ctx, &request).await {
            Ok(outcome) => {
                self.attempts.put(outcome.attempt.clone());
                Ok(SessionStep {
                    is_correct: outcome.is_correct,
                    feedback: outcome.feedback,
                    synced: true,
                    outcome: Some(outcome),
                })
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(exercise_id = %exercise.id, "submission not synced: {e}");
                let verdict = evaluate_submitted(exercise, &request.answer);
                let step = self.attempts.submit(&exercise.id, verdict)?;
                if step.durable.is_some() {
                    self.unsynced.push_back(Unsynced::Submit(request));
                }
                Ok(SessionStep {
                    is_correct: verdict.is_correct(),
                    feedback: step.feedback,
                    synced: false,
                    outcome: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn skip(
        &mut self,
        exercise: &Exercise,
        response_time_ms: u64,
    ) -> Result<SessionStep, EngineError> {
        let request = SkipRequest {
            exercise_id: exercise.id.clone(),
            unit_id: exercise.unit_id.clone(),
            attempt: self.attempts.get(&exercise.id).cloned(),
            response_time_ms,
            request_id: Some(Uuid::new_v4()),
        };

        match self.gateway.skip(&self.ctx, &request).await {
            Ok(outcome) => {
                self.attempts.put(outcome.attempt.clone());
                Ok(SessionStep {
                    is_correct: false,
                    feedback: outcome.feedback,
                    synced: true,
                    outcome: Some(outcome),
                })
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(exercise_id = %exercise.id, "skip not synced: {e}");
                self.attempts.skip(&exercise.id)?;
                self.unsynced.push_back(Unsynced::Skip(request));
                Ok(SessionStep {
                    is_correct: Verdict::Incorrect.is_correct(),
                    feedback: Feedback::RevealExplanation,
                    synced: false,
                    outcome: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Replay unsynced outcomes in order. Stops at the first retryable
    /// failure so records keep their order.
    pub async fn resync(&mut self) -> ResyncReport {
        let mut report = ResyncReport::default();
        while let Some(entry) = self.unsynced.pop_front() {
            let result = match &entry {
                Unsynced::Submit(r) => self.gateway.submit(&self.ctx, r).await,
                Unsynced::Skip(r) => self.gateway.skip(&self.ctx, r).await,
            };
            match result {
                Ok(_) => report.synced += 1,
                Err(e) if e.is_retryable() => {
                    self.unsynced.push_front(entry);
                    break;
                }
                Err(e) => {
                    tracing::warn!(exercise_id = entry.exercise_id(), "dropping unsynced outcome: {e}");
                    report.dropped.push((entry.exercise_id().to_string(), e));
                }
            }
        }
        report.remaining = self.unsynced.len();
        report
    }
}
