//! Central learning engine.
//!
//! Ties evaluation, the attempt policy, aggregation, gating and placement to
//! a content source and a progress store. Every call carries an explicit
//! [`SessionContext`]; nothing is read from ambient state.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as RowMutex;
use tracing::instrument;
use uuid::Uuid;

use crate::attempt::{Attempt, DurableOutcome, Feedback};
use crate::error::{EngineError, StoreError};
use crate::evaluator::{evaluate_submitted, Verdict};
use crate::gate::{self, UnitAccess};
use crate::model::{
    Answer, AnswerRecord, Exercise, Grading, PracticeMode, SessionContext, SubmittedAnswer, Track,
    Unit, UnitProgress,
};
use crate::placement::{self, PlacementPlan, PlacementStatus};
use crate::policy::{ApplicationPolicy, ProgressPolicy};
use crate::progress::{ProgressAggregator, ProgressDelta};
use crate::traits::{AnswerGateway, ContentSource, ProgressStore};

/// Default timeout for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the learning engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy: ProgressPolicy,
    /// Upper bound for each progress store call.
    pub store_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: ProgressPolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// An answer submission. `attempt` is the value the previous call returned
/// for this exercise, or absent for a fresh render.
///
/// `request_id` becomes the id of the answer record. A replay carrying an
/// id that is already in the log is answered from the log and not written
/// again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub exercise_id: String,
    pub unit_id: String,
    pub answer: SubmittedAnswer,
    #[serde(default)]
    pub attempt: Option<Attempt>,
    #[serde(default)]
    pub response_time_ms: u64,
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipRequest {
    pub exercise_id: String,
    pub unit_id: String,
    #[serde(default)]
    pub attempt: Option<Attempt>,
    #[serde(default)]
    pub response_time_ms: u64,
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

/// Result of a submission or skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub is_correct: bool,
    pub verdict: Verdict,
    /// The updated attempt, to be sent back with the next submission.
    pub attempt: Attempt,
    pub feedback: Feedback,
    /// Whether an answer record was written.
    pub durable: bool,
    pub record_id: Option<Uuid>,
    pub points_awarded: u32,
    pub mastery_level: f64,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub total_answers: u32,
    pub completed_exercises: u32,
    pub unit_completed: bool,
    /// Revealed once the attempt resolves.
    pub explanation: Option<String>,
    /// Offered with the retry prompt.
    pub help: Option<String>,
}

/// Access state of a whole track for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAccess {
    pub subject_code: String,
    pub grade: Option<u8>,
    pub name: String,
    pub units: Vec<UnitAccess>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPlacement {
    pub subject_code: String,
    #[serde(default)]
    pub grade: Option<u8>,
    pub start_unit_id: String,
    pub target_unit_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementAnswer {
    pub exercise_id: String,
    pub answer: SubmittedAnswer,
    #[serde(default)]
    pub response_time_ms: u64,
}

/// The question a placement test is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementQuestion {
    pub unit_id: String,
    pub exercise_id: String,
    pub prompt: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementView {
    pub plan_id: String,
    pub status: PlacementStatus,
    pub current: Option<PlacementQuestion>,
    /// Items already answered or skipped.
    pub position: usize,
    pub total: usize,
    /// Outcome of the answer this view responds to.
    pub last_correct: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResult {
    pub plan_id: String,
    pub passed: bool,
    pub correct: u32,
    pub scored: u32,
    pub unlocked: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUnlock {
    pub unlocked: Vec<String>,
}

struct Persisted {
    record_id: Uuid,
    row: UnitProgress,
    delta: ProgressDelta,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The learning engine.
pub struct LearningEngine {
    content: Arc<dyn ContentSource>,
    store: Arc<dyn ProgressStore>,
    aggregator: ProgressAggregator,
    config: EngineConfig,
    row_locks: Mutex<HashMap<(String, String), Arc<RowMutex<()>>>>,
    application_warned: AtomicBool,
}

impl LearningEngine {
    pub fn new(
        content: Arc<dyn ContentSource>,
        store: Arc<dyn ProgressStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            content,
            store,
            aggregator: ProgressAggregator::new(config.policy.clone()),
            config,
            row_locks: Mutex::new(HashMap::new()),
            application_warned: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    pub fn content_name(&self) -> &str {
        self.content.name()
    }

    // -- answers -----------------------------------------------------------

    /// Grade an answer, advance its attempt and, when the attempt resolves,
    /// write the answer record and fold it into the unit's progress.
    #[instrument(skip(self, request), fields(student = %ctx.student_id, exercise = %request.exercise_id))]
    pub async fn submit_answer(
        &self,
        ctx: &SessionContext,
        request: &SubmitRequest,
    ) -> Result<SubmitOutcome, EngineError> {
        ensure_practice(ctx)?;
        let (exercise, unit) = self.exercise_in_unit(&request.exercise_id, &request.unit_id).await?;
        let mut attempt = attempt_for(request.attempt.as_ref(), &exercise.id)?;

        let verdict = evaluate_submitted(&exercise, &request.answer);
        let step = attempt.submit(verdict)?;

        let persisted = match step.durable {
            Some(durable) => Some(
                self.persist(
                    ctx,
                    &exercise,
                    &unit,
                    durable,
                    request.request_id,
                    request.answer.parsed().cloned(),
                    request.response_time_ms,
                )
                .await?,
            ),
            None => None,
        };
        let row = match &persisted {
            Some(p) => p.row.clone(),
            None => self.row_or_fresh(&ctx.student_id, &unit).await?,
        };

        Ok(outcome(&exercise, attempt, verdict, step.feedback, row, persisted.as_ref()))
    }

    /// Give up on an exercise. Always writes one incorrect record with no
    /// answer.
    #[instrument(skip(self, request), fields(student = %ctx.student_id, exercise = %request.exercise_id))]
    pub async fn skip(
        &self,
        ctx: &SessionContext,
        request: &SkipRequest,
    ) -> Result<SubmitOutcome, EngineError> {
        ensure_practice(ctx)?;
        let (exercise, unit) = self.exercise_in_unit(&request.exercise_id, &request.unit_id).await?;
        let mut attempt = attempt_for(request.attempt.as_ref(), &exercise.id)?;

        let durable = attempt.skip()?;
        let persisted = self
            .persist(
                ctx,
                &exercise,
                &unit,
                durable,
                request.request_id,
                None,
                request.response_time_ms,
            )
            .await?;
        let row = persisted.row.clone();

        Ok(outcome(
            &exercise,
            attempt,
            Verdict::Incorrect,
            Feedback::RevealExplanation,
            row,
            Some(&persisted),
        ))
    }

    /// Write the answer record and fold it into the unit's row.
    ///
    /// The row is only saved after the record is appended, so a failed save
    /// leaves the row behind its log. Such a row is rebuilt from the log
    /// before the next fold. A record id already in the log is not appended
    /// twice.
    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        ctx: &SessionContext,
        exercise: &Exercise,
        unit: &Unit,
        durable: DurableOutcome,
        request_id: Option<Uuid>,
        answer: Option<Answer>,
        response_time_ms: u64,
    ) -> Result<Persisted, EngineError> {
        let grading = if durable.pending_review {
            self.note_application(exercise);
            Grading::PendingReview
        } else {
            Grading::Auto
        };
        let record = AnswerRecord {
            id: request_id.unwrap_or_else(Uuid::new_v4),
            student_id: ctx.student_id.clone(),
            exercise_id: exercise.id.clone(),
            unit_id: unit.id.clone(),
            is_correct: durable.is_correct,
            user_answer: answer,
            response_time_ms,
            session_id: ctx.session_id.clone(),
            practice_mode: ctx.practice_mode,
            grading,
            attempt_count: durable.attempt_count,
            created_at: Utc::now(),
        };

        let lock = self.row_lock(&ctx.student_id, &unit.id);
        let _guard = lock.lock().await;

        let prior = self
            .timed("answers", self.store.answers(&ctx.student_id, &unit.id))
            .await?;
        let mut row = self
            .timed("load_progress", self.store.load_progress(&ctx.student_id, &unit.id))
            .await?
            .unwrap_or_else(|| {
                UnitProgress::new(&ctx.student_id, unit.id.clone(), unit.total_exercises())
            });

        if !self.aggregator.in_step(&row, &prior) {
            tracing::warn!(
                unit = %unit.id,
                total_answers = row.total_answer_count,
                records = prior.len(),
                "progress row behind its answer log; rebuilding"
            );
            let points = self.exercise_points(&unit.id).await?;
            row = self.aggregator.repair(&row, unit, &prior, |id| {
                points.get(id).copied().unwrap_or_default()
            });
        }

        if let Some(index) = prior.iter().position(|r| r.id == record.id) {
            self.timed("save_progress", self.store.save_progress(&row))
                .await?;
            tracing::info!(record_id = %record.id, unit = %unit.id, "submission already recorded");
            let delta = self.aggregator.replayed(unit, &prior, index, exercise.points);
            return Ok(Persisted {
                record_id: record.id,
                row,
                delta,
            });
        }

        self.timed("append_answer", self.store.append_answer(&record))
            .await?;
        let delta = self
            .aggregator
            .apply(&mut row, unit, &record, &prior, exercise.points);
        self.timed("save_progress", self.store.save_progress(&row))
            .await?;

        tracing::info!(
            record_id = %record.id,
            unit = %unit.id,
            correct = record.is_correct,
            skipped = durable.skipped,
            completed_exercises = row.completed_exercises,
            "answer recorded"
        );
        if delta.newly_completed {
            tracing::info!(unit = %unit.id, stars = row.stars, "unit completed");
        }

        Ok(Persisted {
            record_id: record.id,
            row,
            delta,
        })
    }

    fn note_application(&self, exercise: &Exercise) {
        if self.config.policy.application == ApplicationPolicy::CountAsPassed
            && !self.application_warned.swap(true, Ordering::Relaxed)
        {
            tracing::warn!(
                exercise_id = %exercise.id,
                "application answers count as passed before human review (policy.application = count_as_passed)"
            );
        }
    }

    // -- progress and access -----------------------------------------------

    /// The student's row for a unit, or a fresh one if they never touched it.
    #[instrument(skip(self))]
    pub async fn get_unit_progress(
        &self,
        student_id: &str,
        unit_id: &str,
    ) -> Result<UnitProgress, EngineError> {
        let (track, pos) = self.locate_unit(unit_id).await?;
        self.row_or_fresh(student_id, &track.units[pos]).await
    }

    /// Access state of every unit in a track.
    #[instrument(skip(self))]
    pub async fn track_access(
        &self,
        student_id: &str,
        subject_code: &str,
        grade: Option<u8>,
    ) -> Result<TrackAccess, EngineError> {
        let track = self.find_track(subject_code, grade).await?;
        let rows = self.rows_for(student_id, &track.units).await?;
        Ok(TrackAccess {
            units: gate::track_access(&track, &rows),
            subject_code: track.subject_code,
            grade: track.grade,
            name: track.name,
        })
    }

    /// Access state of one unit.
    #[instrument(skip(self))]
    pub async fn unit_access(
        &self,
        student_id: &str,
        unit_id: &str,
    ) -> Result<UnitAccess, EngineError> {
        let (track, pos) = self.locate_unit(unit_id).await?;
        let window = &track.units[pos.saturating_sub(1)..=pos];
        let rows = self.rows_for(student_id, window).await?;
        gate::track_access(&track, &rows)
            .into_iter()
            .nth(pos)
            .ok_or_else(|| EngineError::not_found("unit", unit_id))
    }

    // -- placement ---------------------------------------------------------

    /// Build and persist a placement plan over `[start, target]`. The plan id
    /// is the session id.
    #[instrument(skip(self, request), fields(student = %ctx.student_id, subject = %request.subject_code))]
    pub async fn start_placement(
        &self,
        ctx: &SessionContext,
        request: &StartPlacement,
    ) -> Result<PlacementView, EngineError> {
        let track = self.find_track(&request.subject_code, request.grade).await?;
        let range = match track.range(&request.start_unit_id, &request.target_unit_id) {
            Some(range) => range,
            None if track.position(&request.start_unit_id).is_none()
                || track.position(&request.target_unit_id).is_none() =>
            {
                return Err(EngineError::InvalidRequest(format!(
                    "{} and {} are not both units of track {}",
                    request.start_unit_id, request.target_unit_id, track.subject_code
                )))
            }
            None => {
                return Err(EngineError::InvalidRequest(format!(
                    "start unit {} comes after target unit {}",
                    request.start_unit_id, request.target_unit_id
                )))
            }
        };

        let existing = self
            .timed(
                "load_placement",
                self.store.load_placement(&ctx.student_id, &ctx.session_id),
            )
            .await?;
        if existing.is_some() {
            return Err(EngineError::InvalidRequest(format!(
                "session {} already has a placement test",
                ctx.session_id
            )));
        }

        let fetched = try_join_all(
            range
                .iter()
                .map(|unit| self.content.exercises_for_unit(&unit.id)),
        )
        .await?;
        let exercises: HashMap<String, Vec<Exercise>> = range
            .iter()
            .map(|unit| unit.id.clone())
            .zip(fetched)
            .collect();

        let mut solved = HashSet::new();
        for unit in range {
            let records = self
                .timed("answers", self.store.answers(&ctx.student_id, &unit.id))
                .await?;
            solved.extend(
                self.aggregator
                    .solved_exercises(unit, &records)
                    .into_iter()
                    .map(str::to_string),
            );
        }

        let plan = PlacementPlan::new(
            ctx.session_id.clone(),
            ctx.student_id.clone(),
            &track,
            range,
            &exercises,
            &solved,
        );
        self.timed("save_placement", self.store.save_placement(&plan))
            .await?;
        tracing::info!(
            plan = %plan.id,
            items = plan.items.len(),
            target = %plan.target_unit_id,
            "placement test started"
        );

        self.placement_view(&plan, None).await
    }

    /// Grade the answer to the current placement item. Placement answers are
    /// durable records that do not feed unit progress.
    #[instrument(skip(self, request), fields(student = %ctx.student_id))]
    pub async fn answer_placement(
        &self,
        ctx: &SessionContext,
        plan_id: &str,
        request: &PlacementAnswer,
    ) -> Result<PlacementView, EngineError> {
        let mut plan = self.load_plan(&ctx.student_id, plan_id).await?;
        if plan.status != PlacementStatus::InProgress {
            return Err(EngineError::InvalidRequest(format!(
                "placement test {plan_id} is already finished"
            )));
        }
        let Some(item) = plan.current().cloned() else {
            return Err(EngineError::InvalidRequest(
                "no question is waiting; finish the placement test".into(),
            ));
        };
        if item.exercise_id != request.exercise_id {
            return Err(EngineError::InvalidRequest(format!(
                "expected an answer for {}, got {}",
                item.exercise_id, request.exercise_id
            )));
        }

        let exercise = self.load_exercise(&item.exercise_id).await?;
        let correct = evaluate_submitted(&exercise, &request.answer) == Verdict::Correct;
        let record = AnswerRecord {
            id: Uuid::new_v4(),
            student_id: ctx.student_id.clone(),
            exercise_id: exercise.id.clone(),
            unit_id: item.unit_id.clone(),
            is_correct: correct,
            user_answer: request.answer.parsed().cloned(),
            response_time_ms: request.response_time_ms,
            session_id: plan.id.clone(),
            practice_mode: PracticeMode::PlacementTest,
            grading: Grading::Auto,
            attempt_count: 1,
            created_at: Utc::now(),
        };
        self.timed("append_answer", self.store.append_answer(&record))
            .await?;

        plan.record(correct);
        self.timed("save_placement", self.store.save_placement(&plan))
            .await?;
        tracing::debug!(plan = %plan.id, exercise = %exercise.id, correct, "placement answer");

        self.placement_view(&plan, Some(correct)).await
    }

    /// Score a placement test from its durable records and, when it passes,
    /// unlock its range minus the target. Finishing twice returns the first
    /// result.
    #[instrument(skip(self), fields(student = %ctx.student_id))]
    pub async fn finish_placement(
        &self,
        ctx: &SessionContext,
        plan_id: &str,
    ) -> Result<PlacementResult, EngineError> {
        let mut plan = self.load_plan(&ctx.student_id, plan_id).await?;
        let records = self
            .timed(
                "answers_in_session",
                self.store.answers_in_session(&ctx.student_id, &plan.id),
            )
            .await?;
        let score = placement::score(&plan, &records);

        if plan.status != PlacementStatus::InProgress {
            return Ok(PlacementResult {
                plan_id: plan.id,
                passed: plan.status == PlacementStatus::Passed,
                correct: score.correct,
                scored: score.scored,
                unlocked: plan.unlocked,
            });
        }
        if !plan.is_answered() {
            return Err(EngineError::InvalidRequest(format!(
                "placement test {} has unanswered questions",
                plan.id
            )));
        }

        let passed = self.config.policy.placement.passes(score.correct, score.scored);
        let unlocked = if passed {
            let track = self.find_track(&plan.subject_code, plan.grade).await?;
            let ids = placement::unlock_candidates(&track, &plan);
            if !ids.is_empty() {
                self.apply_unlock(&ctx.student_id, &track, &ids).await?;
            }
            ids
        } else {
            Vec::new()
        };

        plan.status = if passed {
            PlacementStatus::Passed
        } else {
            PlacementStatus::Failed
        };
        plan.unlocked = unlocked.clone();
        self.timed("save_placement", self.store.save_placement(&plan))
            .await?;
        tracing::info!(
            plan = %plan.id,
            passed,
            correct = score.correct,
            scored = score.scored,
            unlocked = unlocked.len(),
            "placement test finished"
        );

        Ok(PlacementResult {
            plan_id: plan.id,
            passed,
            correct: score.correct,
            scored: score.scored,
            unlocked,
        })
    }

    /// Unlock units requested by a client. Eligibility is recomputed from the
    /// placement records of the calling session; if any requested unit is
    /// not eligible the whole request is rejected.
    #[instrument(skip(self, unit_ids), fields(student = %ctx.student_id, session = %ctx.session_id))]
    pub async fn batch_unlock(
        &self,
        ctx: &SessionContext,
        unit_ids: &[String],
    ) -> Result<BatchUnlock, EngineError> {
        let mut requested: Vec<String> = Vec::with_capacity(unit_ids.len());
        for id in unit_ids {
            if !requested.contains(id) {
                requested.push(id.clone());
            }
        }
        if requested.is_empty() {
            return Ok(BatchUnlock { unlocked: vec![] });
        }

        let plan = self
            .timed(
                "load_placement",
                self.store.load_placement(&ctx.student_id, &ctx.session_id),
            )
            .await?
            .ok_or_else(|| {
                EngineError::UnlockRejected(format!(
                    "session {} has no placement test",
                    ctx.session_id
                ))
            })?;
        if plan.status == PlacementStatus::Failed
            || (plan.status == PlacementStatus::InProgress && !plan.is_answered())
        {
            return Err(EngineError::UnlockRejected(format!(
                "placement test {} is not complete or did not pass",
                plan.id
            )));
        }
        let track = self.find_track(&plan.subject_code, plan.grade).await?;
        let records = self
            .timed(
                "answers_in_session",
                self.store.answers_in_session(&ctx.student_id, &plan.id),
            )
            .await?;
        let eligible = placement::eligible_units(&track, &plan, &records, &self.config.policy.placement);

        let rejected: Vec<&str> = requested
            .iter()
            .filter(|id| !eligible.contains(id))
            .map(String::as_str)
            .collect();
        if !rejected.is_empty() {
            tracing::warn!(rejected = ?rejected, "batch unlock rejected");
            return Err(EngineError::UnlockRejected(format!(
                "not eligible: {}",
                rejected.join(", ")
            )));
        }

        self.apply_unlock(&ctx.student_id, &track, &requested).await?;
        Ok(BatchUnlock {
            unlocked: requested,
        })
    }

    /// Set `unlock_next` on every listed unit, all-or-nothing. Never touches
    /// `completed` or `stars`.
    async fn apply_unlock(
        &self,
        student_id: &str,
        track: &Track,
        unit_ids: &[String],
    ) -> Result<(), EngineError> {
        let mut ordered: Vec<&String> = unit_ids.iter().collect();
        ordered.sort();
        let mut guards = Vec::with_capacity(ordered.len());
        for id in &ordered {
            guards.push(self.row_lock(student_id, id).lock_owned().await);
        }

        let existing = self
            .timed(
                "progress_for_units",
                self.store.progress_for_units(student_id, unit_ids),
            )
            .await?;
        let mut rows = Vec::with_capacity(unit_ids.len());
        for id in unit_ids {
            let unit = track
                .unit(id)
                .ok_or_else(|| EngineError::not_found("unit", id.clone()))?;
            let mut row = existing.get(id).cloned().unwrap_or_else(|| {
                UnitProgress::new(student_id, unit.id.clone(), unit.total_exercises())
            });
            row.unlock_next = true;
            row.updated_at = Utc::now();
            rows.push(row);
        }

        let timeout_ms = self.config.store_timeout.as_millis() as u64;
        match tokio::time::timeout(self.config.store_timeout, self.store.unlock_units(&rows)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("batch unlock rolled back: {e}");
                return Err(EngineError::UnlockConsistency(e));
            }
            Err(_) => {
                return Err(EngineError::Timeout {
                    operation: "unlock_units",
                    timeout_ms,
                })
            }
        }
        drop(guards);

        tracing::info!(units = ?unit_ids, "units unlocked");
        Ok(())
    }

    /// Remove everything stored for a student.
    #[instrument(skip(self))]
    pub async fn forget_student(&self, student_id: &str) -> Result<usize, EngineError> {
        let removed = self
            .timed("delete_student", self.store.delete_student(student_id))
            .await?;
        tracing::info!(removed, "student data deleted");
        Ok(removed)
    }

    // -- helpers -----------------------------------------------------------

    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => {
                let timeout_ms = self.config.store_timeout.as_millis() as u64;
                tracing::warn!(operation, timeout_ms, "store call timed out");
                Err(EngineError::Timeout {
                    operation,
                    timeout_ms,
                })
            }
        }
    }

    fn row_lock(&self, student_id: &str, unit_id: &str) -> Arc<RowMutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.len() > 4096 {
            locks.retain(|_, l| Arc::strong_count(l) > 1);
        }
        Arc::clone(
            locks
                .entry((student_id.to_string(), unit_id.to_string()))
                .or_default(),
        )
    }

    async fn load_exercise(&self, exercise_id: &str) -> Result<Exercise, EngineError> {
        self.content
            .exercise(exercise_id)
            .await?
            .ok_or_else(|| EngineError::not_found("exercise", exercise_id))
    }

    async fn exercise_points(&self, unit_id: &str) -> Result<HashMap<String, u32>, EngineError> {
        Ok(self
            .content
            .exercises_for_unit(unit_id)
            .await?
            .into_iter()
            .map(|e| (e.id, e.points))
            .collect())
    }

    async fn exercise_in_unit(
        &self,
        exercise_id: &str,
        unit_id: &str,
    ) -> Result<(Exercise, Unit), EngineError> {
        let exercise = self.load_exercise(exercise_id).await?;
        let (track, pos) = self.locate_unit(unit_id).await?;
        let unit = track.units[pos].clone();
        if exercise.unit_id != unit.id && !unit.exercise_ids.contains(&exercise.id) {
            return Err(EngineError::InvalidRequest(format!(
                "exercise {exercise_id} does not belong to unit {unit_id}"
            )));
        }
        Ok((exercise, unit))
    }

    async fn locate_unit(&self, unit_id: &str) -> Result<(Track, usize), EngineError> {
        let track = self
            .content
            .track_containing(unit_id)
            .await?
            .ok_or_else(|| EngineError::not_found("unit", unit_id))?;
        let pos = track
            .position(unit_id)
            .ok_or_else(|| EngineError::not_found("unit", unit_id))?;
        Ok((track, pos))
    }

    async fn find_track(&self, subject_code: &str, grade: Option<u8>) -> Result<Track, EngineError> {
        self.content
            .track(subject_code, grade)
            .await?
            .ok_or_else(|| EngineError::not_found("track", subject_code))
    }

    async fn row_or_fresh(&self, student_id: &str, unit: &Unit) -> Result<UnitProgress, EngineError> {
        let row = self
            .timed("load_progress", self.store.load_progress(student_id, &unit.id))
            .await?;
        Ok(row.unwrap_or_else(|| {
            UnitProgress::new(student_id, unit.id.clone(), unit.total_exercises())
        }))
    }

    async fn rows_for(
        &self,
        student_id: &str,
        units: &[Unit],
    ) -> Result<HashMap<String, UnitProgress>, EngineError> {
        let ids: Vec<String> = units.iter().map(|u| u.id.clone()).collect();
        self.timed(
            "progress_for_units",
            self.store.progress_for_units(student_id, &ids),
        )
        .await
    }

    async fn load_plan(&self, student_id: &str, plan_id: &str) -> Result<PlacementPlan, EngineError> {
        self.timed("load_placement", self.store.load_placement(student_id, plan_id))
            .await?
            .ok_or_else(|| EngineError::not_found("placement test", plan_id))
    }

    async fn placement_view(
        &self,
        plan: &PlacementPlan,
        last_correct: Option<bool>,
    ) -> Result<PlacementView, EngineError> {
        let current = match plan.current() {
            Some(item) => {
                let exercise = self.load_exercise(&item.exercise_id).await?;
                Some(PlacementQuestion {
                    unit_id: item.unit_id.clone(),
                    exercise_id: exercise.id,
                    prompt: exercise.prompt,
                    options: exercise.options,
                })
            }
            None => None,
        };
        Ok(PlacementView {
            plan_id: plan.id.clone(),
            status: plan.status,
            current,
            position: plan.cursor.min(plan.items.len()),
            total: plan.items.len(),
            last_correct,
        })
    }
}

#[async_trait]
impl AnswerGateway for LearningEngine {
    async fn submit(
        &self,
        ctx: &SessionContext,
        request: &SubmitRequest,
    ) -> Result<SubmitOutcome, EngineError> {
        self.submit_answer(ctx, request).await
    }

    async fn skip(
        &self,
        ctx: &SessionContext,
        request: &SkipRequest,
    ) -> Result<SubmitOutcome, EngineError> {
        LearningEngine::skip(self, ctx, request).await
    }
}

fn ensure_practice(ctx: &SessionContext) -> Result<(), EngineError> {
    if ctx.practice_mode.counts_toward_progress() {
        Ok(())
    } else {
        Err(EngineError::InvalidRequest(
            "placement answers go through the placement test".into(),
        ))
    }
}

fn attempt_for(given: Option<&Attempt>, exercise_id: &str) -> Result<Attempt, EngineError> {
    match given {
        Some(a) if a.exercise_id != exercise_id => Err(EngineError::InvalidRequest(format!(
            "attempt belongs to exercise {}, not {exercise_id}",
            a.exercise_id
        ))),
        Some(a) => Ok(a.clone()),
        None => Ok(Attempt::new(exercise_id)),
    }
}

fn outcome(
    exercise: &Exercise,
    attempt: Attempt,
    verdict: Verdict,
    feedback: Feedback,
    row: UnitProgress,
    persisted: Option<&Persisted>,
) -> SubmitOutcome {
    let (explanation, help) = match feedback {
        Feedback::RevealExplanation => (
            Some(exercise.explanation.clone()).filter(|s| !s.is_empty()),
            None,
        ),
        Feedback::RetryPrompt => (None, exercise.help.clone()),
    };
    SubmitOutcome {
        is_correct: verdict.is_correct(),
        verdict,
        attempt,
        feedback,
        durable: persisted.is_some(),
        record_id: persisted.map(|p| p.record_id),
        points_awarded: persisted.map_or(0, |p| p.delta.points_awarded),
        mastery_level: row.mastery_level,
        correct_count: row.correct_count,
        incorrect_count: row.incorrect_count,
        total_answers: row.total_answer_count,
        completed_exercises: row.completed_exercises,
        unit_completed: row.completed,
        explanation,
        help,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PracticeMode;

    #[test]
    fn submit_request_wire_shape() {
        let req: SubmitRequest = serde_json::from_str(
            r#"{
                "exerciseId": "e1",
                "unitId": "u1",
                "answer": {"type": "choice", "selected": 1},
                "attempt": {"exerciseId": "e1", "attemptCount": 1, "state": "first_wrong"}
            }"#,
        )
        .unwrap();
        assert_eq!(req.response_time_ms, 0);
        assert!(req.request_id.is_none());
        assert_eq!(req.attempt.unwrap().attempt_count, 1);

        let req: SubmitRequest = serde_json::from_str(
            r#"{
                "exerciseId": "e1",
                "unitId": "u1",
                "answer": {"type": "choice", "selected": [1]},
                "requestId": "0b6f2f8e-9c1d-4e57-8a4b-2d3c4e5f6a7b"
            }"#,
        )
        .unwrap();
        assert!(req.answer.parsed().is_none());
        assert!(req.request_id.is_some());
    }

    #[test]
    fn attempt_must_match_exercise() {
        assert!(attempt_for(None, "e1").is_ok());
        let other = Attempt::new("e2");
        assert!(matches!(
            attempt_for(Some(&other), "e1"),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn placement_context_cannot_submit_practice_answers() {
        let ctx = SessionContext::new("s1", "x").with_mode(PracticeMode::PlacementTest);
        assert!(ensure_practice(&ctx).is_err());
        assert!(ensure_practice(&SessionContext::new("s1", "x")).is_ok());
    }

    #[test]
    fn outcome_reveals_explanation_only_when_resolved() {
        let exercise: Exercise = serde_json::from_value(serde_json::json!({
            "id": "e1",
            "unitId": "u1",
            "type": "choice",
            "explanation": "because",
            "help": "hint"
        }))
        .unwrap();
        let row = UnitProgress::new("s1", "u1", 1);

        let retry = outcome(
            &exercise,
            Attempt::new("e1"),
            Verdict::Incorrect,
            Feedback::RetryPrompt,
            row.clone(),
            None,
        );
        assert_eq!(retry.help.as_deref(), Some("hint"));
        assert!(retry.explanation.is_none());
        assert!(!retry.durable);

        let done = outcome(
            &exercise,
            Attempt::new("e1"),
            Verdict::Correct,
            Feedback::RevealExplanation,
            row,
            None,
        );
        assert_eq!(done.explanation.as_deref(), Some("because"));
        assert!(done.help.is_none());
    }
}
