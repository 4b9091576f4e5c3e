//! Core data model types for unitpath.
//!
//! Exercises, units and tracks are owned by the content collaborator and are
//! read-only here. Answer records and unit progress rows are owned by the
//! progress store; everything else is derived from them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Question format of an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    Choice,
    FillBlank,
    Matching,
    Application,
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExerciseKind::Choice => write!(f, "choice"),
            ExerciseKind::FillBlank => write!(f, "fill_blank"),
            ExerciseKind::Matching => write!(f, "matching"),
            ExerciseKind::Application => write!(f, "application"),
        }
    }
}

impl FromStr for ExerciseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "choice" => Ok(ExerciseKind::Choice),
            "fill_blank" | "fill-blank" | "blank" => Ok(ExerciseKind::FillBlank),
            "matching" => Ok(ExerciseKind::Matching),
            "application" => Ok(ExerciseKind::Application),
            other => Err(format!("unknown exercise type: {other}")),
        }
    }
}

/// Authored difficulty of an exercise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// A single exercise as authored by the content collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    /// Unique identifier.
    pub id: String,
    /// Owning unit.
    pub unit_id: String,
    /// Question format.
    #[serde(rename = "type")]
    pub kind: ExerciseKind,
    /// Question text.
    #[serde(default)]
    pub prompt: String,
    /// Option labels for `choice` exercises.
    #[serde(default)]
    pub options: Vec<String>,
    /// Answer key. Its shape depends on `kind`; it is kept as raw JSON so a
    /// malformed key is detected at evaluation time instead of at load time.
    #[serde(default)]
    pub correct_answer: Option<serde_json::Value>,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Shown once the attempt resolves.
    #[serde(default)]
    pub explanation: String,
    /// Shown with the retry prompt after a first wrong answer.
    #[serde(default)]
    pub help: Option<String>,
    /// Knowledge point references.
    #[serde(default)]
    pub knowledge_points: Vec<String>,
    /// Point value emitted the first time the exercise is solved.
    #[serde(default = "default_points")]
    pub points: u32,
}

fn default_points() -> u32 {
    10
}

/// A learner's answer, one variant per exercise kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    /// Selected option index; `None` when nothing was selected.
    Choice {
        #[serde(default)]
        selected: Option<i64>,
    },
    /// One string per blank, in order.
    FillBlank { blanks: Vec<String> },
    /// Left index to right index.
    Matching {
        #[serde(deserialize_with = "index_pairs")]
        pairs: BTreeMap<u32, u32>,
    },
    /// Free response or photo upload.
    Application {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        attachments: Vec<String>,
    },
}

/// JSON object keys are always strings, and the buffered content of an
/// internally tagged enum will not coerce them to integers.
fn index_pairs<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<u32, u32>, D::Error> {
    BTreeMap::<String, u32>::deserialize(d)?
        .into_iter()
        .map(|(left, right)| {
            left.trim()
                .parse::<u32>()
                .map(|l| (l, right))
                .map_err(|_| de::Error::custom(format!("matching key \"{left}\" is not an index")))
        })
        .collect()
}

impl Answer {
    /// The exercise kind this answer shape belongs to.
    pub fn kind(&self) -> ExerciseKind {
        match self {
            Answer::Choice { .. } => ExerciseKind::Choice,
            Answer::FillBlank { .. } => ExerciseKind::FillBlank,
            Answer::Matching { .. } => ExerciseKind::Matching,
            Answer::Application { .. } => ExerciseKind::Application,
        }
    }
}

/// An answer as it arrived from a client. A body that fits no [`Answer`]
/// shape is kept raw and grades as incorrect instead of failing the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmittedAnswer {
    Parsed(Answer),
    Unreadable(serde_json::Value),
}

impl SubmittedAnswer {
    pub fn parsed(&self) -> Option<&Answer> {
        match self {
            SubmittedAnswer::Parsed(answer) => Some(answer),
            SubmittedAnswer::Unreadable(_) => None,
        }
    }
}

impl From<Answer> for SubmittedAnswer {
    fn from(answer: Answer) -> Self {
        SubmittedAnswer::Parsed(answer)
    }
}

/// Kind of unit within a track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    #[default]
    Lesson,
    /// Checkpoint-style practice unit. Never blocks its successor.
    Exercise,
}

/// A learning unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub unit_type: UnitType,
    /// Exercise ids in authored order.
    #[serde(default)]
    pub exercise_ids: Vec<String>,
}

impl Unit {
    pub fn total_exercises(&self) -> u32 {
        self.exercise_ids.len() as u32
    }
}

/// The ordered unit sequence for one subject and grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub subject_code: String,
    #[serde(default)]
    pub grade: Option<u8>,
    #[serde(default)]
    pub name: String,
    pub units: Vec<Unit>,
}

impl Track {
    /// Position of a unit in the track.
    pub fn position(&self, unit_id: &str) -> Option<usize> {
        self.units.iter().position(|u| u.id == unit_id)
    }

    pub fn unit(&self, unit_id: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.id == unit_id)
    }

    /// The closed sub-range `[start, end]`, or `None` if either unit is
    /// missing or `start` comes after `end`.
    pub fn range(&self, start: &str, end: &str) -> Option<&[Unit]> {
        let from = self.position(start)?;
        let to = self.position(end)?;
        (from <= to).then(|| &self.units[from..=to])
    }
}

/// Why a practice session exists. Only some modes feed unit progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeMode {
    #[default]
    Normal,
    Review,
    PlacementTest,
}

impl PracticeMode {
    /// Whether records in this mode count toward `UnitProgress`.
    pub fn counts_toward_progress(self) -> bool {
        !matches!(self, PracticeMode::PlacementTest)
    }
}

impl fmt::Display for PracticeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PracticeMode::Normal => write!(f, "normal"),
            PracticeMode::Review => write!(f, "review"),
            PracticeMode::PlacementTest => write!(f, "placement_test"),
        }
    }
}

/// Who is answering and under which session. Threaded explicitly through
/// every call that produces an answer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub student_id: String,
    pub session_id: String,
    #[serde(default)]
    pub practice_mode: PracticeMode,
}

impl SessionContext {
    pub fn new(student_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            session_id: session_id.into(),
            practice_mode: PracticeMode::Normal,
        }
    }

    pub fn with_mode(mut self, mode: PracticeMode) -> Self {
        self.practice_mode = mode;
        self
    }
}

/// How an answer record was graded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grading {
    #[default]
    Auto,
    /// Application answer accepted provisionally, awaiting a human grader.
    PendingReview,
}

/// A durable, append-only answer outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub id: Uuid,
    pub student_id: String,
    pub exercise_id: String,
    pub unit_id: String,
    pub is_correct: bool,
    /// `None` for skipped exercises.
    pub user_answer: Option<Answer>,
    pub response_time_ms: u64,
    pub session_id: String,
    pub practice_mode: PracticeMode,
    #[serde(default)]
    pub grading: Grading,
    /// Attempts used before the record became durable.
    #[serde(default)]
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Per-(student, unit) progress row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitProgress {
    pub student_id: String,
    pub unit_id: String,
    /// Fixed when the row is created.
    pub total_exercises: u32,
    /// Distinct exercises with at least one durable correct record.
    pub completed_exercises: u32,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub total_answer_count: u32,
    pub completion_rate: f64,
    pub mastery_level: f64,
    pub stars: u8,
    pub completed: bool,
    /// The successor unit is open, either because this unit was completed
    /// or because a placement test unlocked it.
    pub unlock_next: bool,
    #[serde(default)]
    pub points_earned: u32,
    pub updated_at: DateTime<Utc>,
}

impl UnitProgress {
    /// A fresh row for a unit the student has not touched yet.
    pub fn new(student_id: impl Into<String>, unit_id: impl Into<String>, total: u32) -> Self {
        Self {
            student_id: student_id.into(),
            unit_id: unit_id.into(),
            total_exercises: total,
            completed_exercises: 0,
            correct_count: 0,
            incorrect_count: 0,
            total_answer_count: 0,
            completion_rate: 0.0,
            mastery_level: 0.0,
            stars: 0,
            completed: false,
            unlock_next: false,
            points_earned: 0,
            updated_at: Utc::now(),
        }
    }

    /// Whether this row opens the next unit in the track.
    pub fn opens_successor(&self) -> bool {
        self.completed || self.unlock_next
    }
}
