//! Folding durable answer records into unit progress rows.
//!
//! Counters (`correct_count`, `incorrect_count`, `total_answer_count`) are
//! incremented per record. `completed_exercises` is recomputed from the
//! record history every time, which keeps it idempotent when an already
//! solved exercise is answered again.

use std::collections::HashSet;

use chrono::Utc;

use crate::model::{AnswerRecord, Grading, Unit, UnitProgress};
use crate::policy::{ratio, ApplicationPolicy, ProgressPolicy};

/// What a single fold changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressDelta {
    /// The record was applied to the counters.
    pub counted: bool,
    /// The record solved an exercise for the first time.
    pub newly_solved: bool,
    pub points_awarded: u32,
    /// The unit flipped to completed with this record.
    pub newly_completed: bool,
}

/// Applies the progress policy to answer records.
#[derive(Debug, Clone, Default)]
pub struct ProgressAggregator {
    policy: ProgressPolicy,
}

impl ProgressAggregator {
    pub fn new(policy: ProgressPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ProgressPolicy {
        &self.policy
    }

    /// Whether a record marks its exercise as solved.
    pub fn solves(&self, record: &AnswerRecord) -> bool {
        record.is_correct
            && (record.grading != Grading::PendingReview
                || self.policy.application == ApplicationPolicy::CountAsPassed)
    }

    /// Distinct unit exercises solved by any of `records`.
    pub fn solved_exercises<'a>(
        &self,
        unit: &Unit,
        records: impl IntoIterator<Item = &'a AnswerRecord>,
    ) -> HashSet<&'a str> {
        records
            .into_iter()
            .filter(|r| r.practice_mode.counts_toward_progress() && self.solves(r))
            .filter(|r| unit.exercise_ids.iter().any(|id| *id == r.exercise_id))
            .map(|r| r.exercise_id.as_str())
            .collect()
    }

    /// Fold one durable record into `row`.
    ///
    /// `prior` holds the records for the same (student, unit) written before
    /// `record`; `points` is the point value of the record's exercise.
    pub fn apply(
        &self,
        row: &mut UnitProgress,
        unit: &Unit,
        record: &AnswerRecord,
        prior: &[AnswerRecord],
        points: u32,
    ) -> ProgressDelta {
        if !record.practice_mode.counts_toward_progress() {
            return ProgressDelta::default();
        }

        row.total_answer_count += 1;
        if self.solves(record) {
            row.correct_count += 1;
        } else if !record.is_correct {
            row.incorrect_count += 1;
        }

        let before = self.solved_exercises(unit, prior);
        let after = self.solved_exercises(unit, prior.iter().chain(std::iter::once(record)));
        let newly_solved = after.len() > before.len();

        let was_completed = row.completed;
        row.completed_exercises = after.len() as u32;
        self.refresh_derived(row);

        let points_awarded = if newly_solved { points } else { 0 };
        row.points_earned += points_awarded;
        row.updated_at = Utc::now();

        ProgressDelta {
            counted: true,
            newly_solved,
            points_awarded,
            newly_completed: row.completed && !was_completed,
        }
    }

    /// Recompute rate, mastery, stars and completion from the counters.
    pub fn refresh_derived(&self, row: &mut UnitProgress) {
        row.completion_rate = ratio(row.completed_exercises, row.total_exercises).min(1.0);
        row.mastery_level = self.policy.mastery(
            row.completion_rate,
            row.correct_count,
            row.incorrect_count,
        );
        row.stars = self.policy.stars(row.completion_rate);
        row.completed = self.policy.is_completed(row.completion_rate) && row.total_exercises > 0;
        // Placement unlocks set this flag too; it is never cleared here.
        row.unlock_next |= row.completed;
    }

    /// Build a row from scratch by folding the whole record history in
    /// `created_at` order.
    pub fn rebuild(
        &self,
        student_id: &str,
        unit: &Unit,
        records: &[AnswerRecord],
        points: impl Fn(&str) -> u32,
    ) -> UnitProgress {
        let mut ordered: Vec<AnswerRecord> = records
            .iter()
            .filter(|r| r.student_id == student_id && r.unit_id == unit.id)
            .cloned()
            .collect();
        ordered.sort_by_key(|r| r.created_at);

        let mut row = UnitProgress::new(student_id, unit.id.clone(), unit.total_exercises());
        for i in 0..ordered.len() {
            let (prior, rest) = ordered.split_at(i);
            let record = &rest[0];
            self.apply(&mut row, unit, record, prior, points(&record.exercise_id));
        }
        row
    }

    /// Whether `row` has folded in exactly the progress-counting records of
    /// `records`.
    pub fn in_step(&self, row: &UnitProgress, records: &[AnswerRecord]) -> bool {
        let counted = records
            .iter()
            .filter(|r| r.practice_mode.counts_toward_progress())
            .count();
        row.total_answer_count as usize == counted
    }

    /// Rebuild a row that fell behind its answer log.
    ///
    /// Keeps the stored exercise total and any placement unlock.
    pub fn repair(
        &self,
        stale: &UnitProgress,
        unit: &Unit,
        records: &[AnswerRecord],
        points: impl Fn(&str) -> u32,
    ) -> UnitProgress {
        let mut row = self.rebuild(&stale.student_id, unit, records, points);
        row.total_exercises = stale.total_exercises;
        row.unlock_next |= stale.unlock_next;
        self.refresh_derived(&mut row);
        row
    }

    /// What the record at `index` contributed when it was first folded in.
    /// Used to answer a replayed submission without folding it twice.
    pub fn replayed(
        &self,
        unit: &Unit,
        records: &[AnswerRecord],
        index: usize,
        points: u32,
    ) -> ProgressDelta {
        let Some(record) = records.get(index) else {
            return ProgressDelta::default();
        };
        if !record.practice_mode.counts_toward_progress() {
            return ProgressDelta::default();
        }
        let before = self.solved_exercises(unit, &records[..index]);
        let after = self.solved_exercises(unit, &records[..=index]);
        let newly_solved = after.len() > before.len();
        ProgressDelta {
            counted: true,
            newly_solved,
            points_awarded: if newly_solved { points } else { 0 },
            newly_completed: false,
        }
    }
}
