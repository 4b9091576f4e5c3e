//! The `unitpath check` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use unitpath_core::evaluator::{check, Verdict};
use unitpath_core::model::Answer;

pub fn execute(catalog_path: PathBuf, exercise_id: String, answer: String) -> Result<()> {
    let catalog = unitpath_core::parser::load_catalog(&catalog_path)?;
    let exercise = catalog
        .get_exercise(&exercise_id)
        .with_context(|| format!("exercise not found: {exercise_id}"))?;
    let answer: Answer = serde_json::from_str(&answer).context("invalid --answer JSON")?;

    let verdict = check(exercise, &answer)?;
    let label = match verdict {
        Verdict::Correct => "correct",
        Verdict::Incorrect => "incorrect",
        Verdict::Ungraded => "ungraded (pending review)",
    };
    println!("{exercise_id}: {label}");

    if verdict == Verdict::Incorrect {
        if let Some(help) = &exercise.help {
            println!("  Help: {help}");
        }
    }
    if !exercise.explanation.is_empty() {
        println!("  Explanation: {}", exercise.explanation);
    }

    Ok(())
}
