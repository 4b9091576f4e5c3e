//! Placement test planning and scoring.
//!
//! A placement test samples one exercise per unit of a closed range
//! `[start, target]`. When it passes, every unit of the range except the
//! target gets its `unlock_next` flag set, which opens the following unit.
//! The target itself is studied normally afterwards.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AnswerRecord, Exercise, ExerciseKind, PracticeMode, Track, Unit};
use crate::policy::PlacementRule;

/// Result of one placement item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    #[default]
    Pending,
    Correct,
    Incorrect,
    /// Not a `choice` exercise; skipped without being shown.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementItem {
    pub unit_id: String,
    pub exercise_id: String,
    pub kind: ExerciseKind,
    #[serde(default)]
    pub outcome: ItemOutcome,
}

impl PlacementItem {
    pub fn is_supported(&self) -> bool {
        self.kind == ExerciseKind::Choice
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStatus {
    #[default]
    InProgress,
    Passed,
    Failed,
}

/// A persisted placement test. `id` is the session id the test runs under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementPlan {
    pub id: String,
    pub student_id: String,
    pub subject_code: String,
    #[serde(default)]
    pub grade: Option<u8>,
    pub start_unit_id: String,
    pub target_unit_id: String,
    pub items: Vec<PlacementItem>,
    /// Index of the next item to answer; `items.len()` once done.
    pub cursor: usize,
    #[serde(default)]
    pub status: PlacementStatus,
    /// Units whose successor was opened when the plan passed.
    #[serde(default)]
    pub unlocked: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PlacementPlan {
    /// Build a plan over `range`, which must be the closed range
    /// `[start, target]` of the student's track.
    ///
    /// `exercises` holds each unit's exercises keyed by unit id; `solved`
    /// holds the exercise ids the student already answered correctly.
    pub fn new(
        id: impl Into<String>,
        student_id: impl Into<String>,
        track: &Track,
        range: &[Unit],
        exercises: &HashMap<String, Vec<Exercise>>,
        solved: &HashSet<String>,
    ) -> Self {
        let items = range
            .iter()
            .filter_map(|unit| {
                let list = exercises.get(&unit.id).map(Vec::as_slice).unwrap_or(&[]);
                sample_item(unit, list, solved)
            })
            .collect();

        let mut plan = Self {
            id: id.into(),
            student_id: student_id.into(),
            subject_code: track.subject_code.clone(),
            grade: track.grade,
            start_unit_id: range.first().map(|u| u.id.clone()).unwrap_or_default(),
            target_unit_id: range.last().map(|u| u.id.clone()).unwrap_or_default(),
            items,
            cursor: 0,
            status: PlacementStatus::InProgress,
            unlocked: Vec::new(),
            created_at: Utc::now(),
        };
        plan.skip_unsupported();
        plan
    }

    /// The item waiting for an answer.
    pub fn current(&self) -> Option<&PlacementItem> {
        if self.status != PlacementStatus::InProgress {
            return None;
        }
        self.items.get(self.cursor)
    }

    /// Record the outcome of the current item and move to the next
    /// supported one. Returns `false` if no item was waiting.
    pub fn record(&mut self, correct: bool) -> bool {
        let Some(item) = self.items.get_mut(self.cursor) else {
            return false;
        };
        item.outcome = if correct {
            ItemOutcome::Correct
        } else {
            ItemOutcome::Incorrect
        };
        self.cursor += 1;
        self.skip_unsupported();
        true
    }

    fn skip_unsupported(&mut self) {
        while let Some(item) = self.items.get_mut(self.cursor) {
            if item.is_supported() {
                break;
            }
            tracing::debug!(
                exercise_id = %item.exercise_id,
                kind = %item.kind,
                "placement item unsupported, skipping"
            );
            item.outcome = ItemOutcome::Unsupported;
            self.cursor += 1;
        }
    }

    pub fn is_answered(&self) -> bool {
        self.cursor >= self.items.len()
    }

    /// Number of items that can be scored.
    pub fn scored_items(&self) -> u32 {
        self.items.iter().filter(|i| i.is_supported()).count() as u32
    }
}

/// Pick the placement exercise for one unit: the first exercise the student
/// has not solved yet, or the first exercise when all are solved. Units
/// without exercises contribute nothing.
pub fn sample_item(
    unit: &Unit,
    exercises: &[Exercise],
    solved: &HashSet<String>,
) -> Option<PlacementItem> {
    let pick = exercises
        .iter()
        .find(|e| !solved.contains(&e.id))
        .or_else(|| exercises.first())?;
    Some(PlacementItem {
        unit_id: unit.id.clone(),
        exercise_id: pick.id.clone(),
        kind: pick.kind,
        outcome: ItemOutcome::Pending,
    })
}

/// Correct answers over scored items, recomputed from durable records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementScore {
    pub correct: u32,
    pub scored: u32,
}

/// Score a plan from the placement records written under its session. Only
/// the first record per item counts.
pub fn score(plan: &PlacementPlan, records: &[AnswerRecord]) -> PlacementScore {
    let wanted: HashSet<&str> = plan
        .items
        .iter()
        .filter(|i| i.is_supported())
        .map(|i| i.exercise_id.as_str())
        .collect();

    let mut seen = HashSet::new();
    let mut correct = 0;
    for r in records {
        if r.practice_mode != PracticeMode::PlacementTest
            || r.session_id != plan.id
            || r.student_id != plan.student_id
            || !wanted.contains(r.exercise_id.as_str())
            || !seen.insert(r.exercise_id.as_str())
        {
            continue;
        }
        if r.is_correct {
            correct += 1;
        }
    }
    PlacementScore {
        correct,
        scored: plan.scored_items(),
    }
}

/// Units of the plan's range whose successor a passing test opens: the
/// range minus the target.
pub fn unlock_candidates(track: &Track, plan: &PlacementPlan) -> Vec<String> {
    track
        .range(&plan.start_unit_id, &plan.target_unit_id)
        .map(|units| {
            units
                .iter()
                .filter(|u| u.id != plan.target_unit_id)
                .map(|u| u.id.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Units the server may unlock for this plan, or nothing when the rule is
/// not met.
pub fn eligible_units(
    track: &Track,
    plan: &PlacementPlan,
    records: &[AnswerRecord],
    rule: &PlacementRule,
) -> Vec<String> {
    let s = score(plan, records);
    if rule.passes(s.correct, s.scored) {
        unlock_candidates(track, plan)
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, Grading, UnitType};
    use uuid::Uuid;

    fn exercise(id: &str, unit: &str, kind: ExerciseKind) -> Exercise {
        Exercise {
            id: id.into(),
            unit_id: unit.into(),
            kind,
            prompt: String::new(),
            options: vec!["a".into(), "b".into()],
            correct_answer: Some(serde_json::json!(1)),
            difficulty: Difficulty::Easy,
            explanation: String::new(),
            help: None,
            knowledge_points: vec![],
            points: 10,
        }
    }

    /// Units A..D with two choice exercises each.
    fn fixture() -> (Track, HashMap<String, Vec<Exercise>>) {
        let mut exercises = HashMap::new();
        let units = ["A", "B", "C", "D"]
            .iter()
            .map(|id| {
                let list = vec![
                    exercise(&format!("{id}1"), id, ExerciseKind::Choice),
                    exercise(&format!("{id}2"), id, ExerciseKind::Choice),
                ];
                exercises.insert(id.to_string(), list);
                Unit {
                    id: id.to_string(),
                    name: id.to_string(),
                    unit_type: UnitType::Lesson,
                    exercise_ids: vec![format!("{id}1"), format!("{id}2")],
                }
            })
            .collect();
        let track = Track {
            subject_code: "math".into(),
            grade: Some(2),
            name: "Math".into(),
            units,
        };
        (track, exercises)
    }

    fn plan_for(track: &Track, ex: &HashMap<String, Vec<Exercise>>, start: &str, end: &str) -> PlacementPlan {
        let range = track.range(start, end).unwrap();
        PlacementPlan::new("sess-1", "s1", track, range, ex, &HashSet::new())
    }

    fn placement_record(plan: &PlacementPlan, exercise: &str, correct: bool) -> AnswerRecord {
        AnswerRecord {
            id: Uuid::new_v4(),
            student_id: plan.student_id.clone(),
            exercise_id: exercise.into(),
            unit_id: String::new(),
            is_correct: correct,
            user_answer: None,
            response_time_ms: 0,
            session_id: plan.id.clone(),
            practice_mode: PracticeMode::PlacementTest,
            grading: Grading::Auto,
            attempt_count: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn samples_first_unsolved_exercise_per_unit() {
        let (track, ex) = fixture();
        let range = track.range("A", "C").unwrap();
        let solved: HashSet<String> = ["A1".to_string(), "B1".into(), "B2".into()].into();
        let plan = PlacementPlan::new("p", "s1", &track, range, &ex, &solved);
        let picked: Vec<_> = plan.items.iter().map(|i| i.exercise_id.as_str()).collect();
        // B is fully solved and falls back to its first exercise.
        assert_eq!(picked, ["A2", "B1", "C1"]);
        assert_eq!(plan.target_unit_id, "C");
    }

    #[test]
    fn unit_without_exercises_contributes_no_item() {
        let (track, mut ex) = fixture();
        ex.insert("B".into(), vec![]);
        let plan = plan_for(&track, &ex, "A", "C");
        assert_eq!(plan.items.len(), 2);
    }

    #[test]
    fn unsupported_items_are_skipped() {
        let (track, mut ex) = fixture();
        ex.insert(
            "A".into(),
            vec![exercise("A1", "A", ExerciseKind::Matching)],
        );
        let mut plan = plan_for(&track, &ex, "A", "B");
        assert_eq!(plan.items[0].outcome, ItemOutcome::Unsupported);
        assert_eq!(plan.current().unwrap().exercise_id, "B1");
        assert_eq!(plan.scored_items(), 1);
        assert!(plan.record(true));
        assert!(plan.is_answered());
        assert!(plan.current().is_none());
        assert!(!plan.record(true));
    }

    #[test]
    fn one_correct_answer_unlocks_range_minus_target() {
        let (track, ex) = fixture();
        let plan = plan_for(&track, &ex, "A", "C");
        let records = vec![
            placement_record(&plan, "A1", true),
            placement_record(&plan, "B1", false),
            placement_record(&plan, "C1", false),
        ];
        let unlocked = eligible_units(&track, &plan, &records, &PlacementRule::AnyCorrect);
        assert_eq!(unlocked, ["A", "B"]);
        assert!(!unlocked.contains(&"C".to_string()));
        assert!(!unlocked.contains(&"D".to_string()));
    }

    #[test]
    fn zero_correct_unlocks_nothing() {
        let (track, ex) = fixture();
        let plan = plan_for(&track, &ex, "A", "C");
        let records = vec![
            placement_record(&plan, "A1", false),
            placement_record(&plan, "B1", false),
        ];
        assert!(eligible_units(&track, &plan, &records, &PlacementRule::AnyCorrect).is_empty());
    }

    #[test]
    fn min_rate_rule_needs_enough_correct_answers() {
        let (track, ex) = fixture();
        let plan = plan_for(&track, &ex, "A", "C");
        let records = vec![placement_record(&plan, "A1", true)];
        let rule = PlacementRule::MinRate { rate: 0.6 };
        assert!(eligible_units(&track, &plan, &records, &rule).is_empty());

        let records = vec![
            placement_record(&plan, "A1", true),
            placement_record(&plan, "B1", true),
        ];
        assert_eq!(eligible_units(&track, &plan, &records, &rule).len(), 2);
    }

    #[test]
    fn score_ignores_foreign_and_duplicate_records() {
        let (track, ex) = fixture();
        let plan = plan_for(&track, &ex, "A", "B");

        let mut other_session = placement_record(&plan, "A1", true);
        other_session.session_id = "elsewhere".into();
        let mut practice = placement_record(&plan, "A1", true);
        practice.practice_mode = PracticeMode::Normal;
        let records = vec![
            other_session,
            practice,
            placement_record(&plan, "B1", false),
            placement_record(&plan, "B1", true),
            placement_record(&plan, "D1", true),
        ];
        let s = score(&plan, &records);
        assert_eq!(s, PlacementScore { correct: 0, scored: 2 });
    }

    #[test]
    fn single_unit_range_unlocks_nothing() {
        let (track, ex) = fixture();
        let plan = plan_for(&track, &ex, "B", "B");
        assert!(unlock_candidates(&track, &plan).is_empty());
    }
}
