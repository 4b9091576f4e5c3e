//! Type-aware answer evaluation.
//!
//! [`evaluate`] is total: a missing or malformed answer key, or an answer of
//! the wrong shape, grades as incorrect and logs a warning. [`check`] exposes
//! the underlying error for tooling that wants to report it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AnswerError;
use crate::model::{Answer, Exercise, ExerciseKind, SubmittedAnswer};

/// Conventional "nothing selected" index for choice answers.
pub const UNSET_CHOICE: i64 = -1;

/// Used instead of [`UNSET_CHOICE`] when an answer key is itself `-1`.
pub const UNSET_CHOICE_FALLBACK: i64 = -2;

/// Outcome of grading one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    /// No deterministic key (application exercises); pending human review.
    Ungraded,
}

impl Verdict {
    pub fn from_bool(correct: bool) -> Self {
        if correct {
            Verdict::Correct
        } else {
            Verdict::Incorrect
        }
    }

    /// Ungraded answers are provisionally accepted.
    pub fn is_correct(self) -> bool {
        !matches!(self, Verdict::Incorrect)
    }

    pub fn is_ungraded(self) -> bool {
        matches!(self, Verdict::Ungraded)
    }
}

/// Grade an answer, failing closed on any error.
pub fn evaluate(exercise: &Exercise, answer: &Answer) -> Verdict {
    match check(exercise, answer) {
        Ok(verdict) => verdict,
        Err(e) if e.is_data_integrity() => {
            tracing::warn!(
                exercise_id = %exercise.id,
                kind = %exercise.kind,
                "data integrity: {e}; grading as incorrect"
            );
            Verdict::Incorrect
        }
        Err(e) => {
            tracing::debug!(exercise_id = %exercise.id, "rejected answer shape: {e}");
            Verdict::Incorrect
        }
    }
}

/// Grade an answer as submitted. A shape no exercise kind accepts is
/// incorrect.
pub fn evaluate_submitted(exercise: &Exercise, answer: &SubmittedAnswer) -> Verdict {
    match answer {
        SubmittedAnswer::Parsed(answer) => evaluate(exercise, answer),
        SubmittedAnswer::Unreadable(_) => {
            tracing::debug!(exercise_id = %exercise.id, "unreadable answer shape; grading as incorrect");
            Verdict::Incorrect
        }
    }
}

/// Grade an answer, reporting why it could not be graded.
pub fn check(exercise: &Exercise, answer: &Answer) -> Result<Verdict, AnswerError> {
    if answer.kind() != exercise.kind {
        return Err(AnswerError::KindMismatch {
            expected: exercise.kind,
            actual: answer.kind(),
        });
    }

    match answer {
        Answer::Choice { selected } => {
            let key = choice_key(exercise)?;
            let picked = selected.unwrap_or_else(|| no_selection_sentinel(key));
            Ok(Verdict::from_bool(picked == key))
        }
        Answer::FillBlank { blanks } => {
            let key = fill_blank_key(exercise)?;
            if blanks.len() != key.len() {
                return Ok(Verdict::Incorrect);
            }
            let all_match = blanks
                .iter()
                .zip(&key)
                .all(|(given, accepted)| accepted.contains(&normalize(given)));
            Ok(Verdict::from_bool(all_match))
        }
        Answer::Matching { pairs } => {
            let key = matching_key(exercise)?;
            Ok(Verdict::from_bool(*pairs == key))
        }
        Answer::Application { .. } => Ok(Verdict::Ungraded),
    }
}

/// Check that an exercise's answer key has the shape its kind requires.
pub fn validate_key(exercise: &Exercise) -> Result<(), AnswerError> {
    match exercise.kind {
        ExerciseKind::Choice => choice_key(exercise).map(|_| ()),
        ExerciseKind::FillBlank => fill_blank_key(exercise).map(|_| ()),
        ExerciseKind::Matching => matching_key(exercise).map(|_| ()),
        ExerciseKind::Application => Ok(()),
    }
}

/// Sentinel for an empty choice submission, guaranteed to differ from `key`.
pub fn no_selection_sentinel(key: i64) -> i64 {
    if key == UNSET_CHOICE {
        UNSET_CHOICE_FALLBACK
    } else {
        UNSET_CHOICE
    }
}

/// Trim, collapse inner whitespace and case-fold.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn key_of(exercise: &Exercise) -> Result<&Value, AnswerError> {
    match &exercise.correct_answer {
        None | Some(Value::Null) => Err(AnswerError::MissingKey {
            exercise_id: exercise.id.clone(),
        }),
        Some(v) => Ok(v),
    }
}

fn malformed(exercise: &Exercise, detail: impl Into<String>) -> AnswerError {
    AnswerError::MalformedKey {
        exercise_id: exercise.id.clone(),
        kind: exercise.kind,
        detail: detail.into(),
    }
}

/// The correct option index. Integer strings are accepted.
pub fn choice_key(exercise: &Exercise) -> Result<i64, AnswerError> {
    match key_of(exercise)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| malformed(exercise, format!("{n} is not an integer index"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| malformed(exercise, format!("\"{s}\" is not an integer index"))),
        other => Err(malformed(exercise, format!("expected an index, got {other}"))),
    }
}

/// Accepted answers per blank, already normalized.
pub fn fill_blank_key(exercise: &Exercise) -> Result<Vec<Vec<String>>, AnswerError> {
    let Value::Array(slots) = key_of(exercise)? else {
        return Err(malformed(exercise, "expected an array of blanks"));
    };
    if slots.is_empty() {
        return Err(malformed(exercise, "no blanks"));
    }

    slots
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let accepted: Vec<String> = match slot {
                Value::String(s) => vec![normalize(s)],
                Value::Array(synonyms) => synonyms
                    .iter()
                    .map(|v| {
                        v.as_str()
                            .map(normalize)
                            .ok_or_else(|| malformed(exercise, format!("blank {i} has a non-string synonym")))
                    })
                    .collect::<Result<_, _>>()?,
                other => {
                    return Err(malformed(
                        exercise,
                        format!("blank {i} must be a string or list, got {other}"),
                    ))
                }
            };
            if accepted.iter().all(|a| a.is_empty()) {
                return Err(malformed(exercise, format!("blank {i} accepts nothing")));
            }
            Ok(accepted)
        })
        .collect()
}

/// The full left-to-right mapping.
pub fn matching_key(exercise: &Exercise) -> Result<BTreeMap<u32, u32>, AnswerError> {
    let as_index = |v: &Value| -> Option<u32> {
        v.as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    };

    let mapping: BTreeMap<u32, u32> = match key_of(exercise)? {
        Value::Object(map) => map
            .iter()
            .map(|(left, right)| {
                let l = left
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| malformed(exercise, format!("left key \"{left}\" is not an index")))?;
                let r = as_index(right)
                    .ok_or_else(|| malformed(exercise, format!("right value for {left} is not an index")))?;
                Ok((l, r))
            })
            .collect::<Result<_, AnswerError>>()?,
        Value::Array(rights) => rights
            .iter()
            .enumerate()
            .map(|(l, right)| {
                let r = as_index(right)
                    .ok_or_else(|| malformed(exercise, format!("right value for {l} is not an index")))?;
                Ok((l as u32, r))
            })
            .collect::<Result<_, AnswerError>>()?,
        other => {
            return Err(malformed(
                exercise,
                format!("expected an object or array, got {other}"),
            ))
        }
    };

    if mapping.is_empty() {
        return Err(malformed(exercise, "no pairs"));
    }
    Ok(mapping)
}
