use chrono::Utc;
use uuid::Uuid;

use unitpath_core::model::{Answer, AnswerRecord, ExerciseKind, Grading, PracticeMode};
use unitpath_core::placement::{ItemOutcome, PlacementItem, PlacementPlan, PlacementStatus};

pub fn record(student: &str, unit: &str, exercise: &str, correct: bool) -> AnswerRecord {
    AnswerRecord {
        id: Uuid::new_v4(),
        student_id: student.into(),
        exercise_id: exercise.into(),
        unit_id: unit.into(),
        is_correct: correct,
        user_answer: Some(Answer::Choice { selected: Some(0) }),
        response_time_ms: 1200,
        session_id: "sess".into(),
        practice_mode: PracticeMode::Normal,
        grading: Grading::Auto,
        attempt_count: 1,
        created_at: Utc::now(),
    }
}

pub fn plan(student: &str, plan_id: &str) -> PlacementPlan {
    PlacementPlan {
        id: plan_id.into(),
        student_id: student.into(),
        subject_code: "math".into(),
        grade: Some(3),
        start_unit_id: "a".into(),
        target_unit_id: "b".into(),
        items: vec![PlacementItem {
            unit_id: "a".into(),
            exercise_id: "a1".into(),
            kind: ExerciseKind::Choice,
            outcome: ItemOutcome::Pending,
        }],
        cursor: 0,
        status: PlacementStatus::InProgress,
        unlocked: Vec::new(),
        created_at: Utc::now(),
    }
}
