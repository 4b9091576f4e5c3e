//! TOML catalog parser.
//!
//! Loads tracks, units and exercises from TOML files and directories, and
//! validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::catalog::Catalog;
use crate::evaluator::{choice_key, validate_key};
use crate::model::{Difficulty, Exercise, ExerciseKind, Track, Unit, UnitType};

/// Intermediate TOML structure for catalog files.
#[derive(Debug, Deserialize)]
struct TomlCatalogFile {
    #[serde(default)]
    tracks: Vec<TomlTrack>,
}

#[derive(Debug, Deserialize)]
struct TomlTrack {
    subject_code: String,
    #[serde(default)]
    grade: Option<u8>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    units: Vec<TomlUnit>,
}

#[derive(Debug, Deserialize)]
struct TomlUnit {
    id: String,
    name: String,
    #[serde(default)]
    unit_type: Option<String>,
    #[serde(default)]
    exercises: Vec<TomlExercise>,
}

#[derive(Debug, Deserialize)]
struct TomlExercise {
    id: String,
    kind: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    correct_answer: Option<toml::Value>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    help: Option<String>,
    #[serde(default)]
    knowledge_points: Vec<String>,
    #[serde(default = "default_points")]
    points: u32,
}

fn default_points() -> u32 {
    10
}

fn parse_unit_type(s: &str) -> Result<UnitType> {
    match s.to_lowercase().as_str() {
        "lesson" => Ok(UnitType::Lesson),
        "exercise" => Ok(UnitType::Exercise),
        other => anyhow::bail!("unknown unit type: {other}"),
    }
}

fn parse_difficulty(s: &str) -> Result<Difficulty> {
    match s.to_lowercase().as_str() {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        other => anyhow::bail!("unknown difficulty: {other}"),
    }
}

/// Parse a single TOML file into a `Catalog`.
pub fn parse_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file: {}", path.display()))?;

    parse_catalog_str(&content, path)
}

/// Parse a TOML string into a `Catalog` (useful for testing).
pub fn parse_catalog_str(content: &str, source_path: &Path) -> Result<Catalog> {
    let parsed: TomlCatalogFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let mut tracks = Vec::with_capacity(parsed.tracks.len());
    let mut exercises = Vec::new();

    for t in parsed.tracks {
        let mut units = Vec::with_capacity(t.units.len());
        for u in t.units {
            let unit_type = u
                .unit_type
                .as_deref()
                .map(parse_unit_type)
                .transpose()
                .with_context(|| format!("unit {}", u.id))?
                .unwrap_or_default();

            let mut exercise_ids = Vec::with_capacity(u.exercises.len());
            for e in u.exercises {
                let kind: ExerciseKind = e
                    .kind
                    .parse()
                    .map_err(|msg: String| anyhow::anyhow!("{}", msg))
                    .with_context(|| format!("exercise {}", e.id))?;
                let difficulty = e
                    .difficulty
                    .as_deref()
                    .map(parse_difficulty)
                    .transpose()
                    .with_context(|| format!("exercise {}", e.id))?
                    .unwrap_or_default();
                let correct_answer = e
                    .correct_answer
                    .map(serde_json::to_value)
                    .transpose()
                    .with_context(|| format!("exercise {}: unsupported correct_answer", e.id))?;

                exercise_ids.push(e.id.clone());
                exercises.push(Exercise {
                    id: e.id,
                    unit_id: u.id.clone(),
                    kind,
                    prompt: e.prompt,
                    options: e.options,
                    correct_answer,
                    difficulty,
                    explanation: e.explanation,
                    help: e.help,
                    knowledge_points: e.knowledge_points,
                    points: e.points,
                });
            }

            units.push(Unit {
                id: u.id,
                name: u.name,
                unit_type,
                exercise_ids,
            });
        }

        tracks.push(Track {
            subject_code: t.subject_code,
            grade: t.grade,
            name: t.name,
            units,
        });
    }

    Ok(Catalog::new(tracks, exercises))
}

/// Load a catalog from a file, or merge every `.toml` file under a
/// directory.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    if path.is_dir() {
        load_catalog_directory(path)
    } else {
        parse_catalog(path)
    }
}

/// Recursively load all `.toml` catalog files from a directory.
pub fn load_catalog_directory(dir: &Path) -> Result<Catalog> {
    let mut catalog = Catalog::default();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            catalog.merge(load_catalog_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_catalog(&path) {
                Ok(c) => catalog.merge(c),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(catalog)
}

/// A warning from catalog validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The unit or exercise ID (if applicable).
    pub item_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a catalog for common authoring issues.
pub fn validate_catalog(catalog: &Catalog) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let warn = |id: &str, message: String| ValidationWarning {
        item_id: Some(id.to_string()),
        message,
    };

    // Duplicate tracks
    let mut seen_tracks = HashSet::new();
    for t in catalog.tracks() {
        if !seen_tracks.insert((&t.subject_code, t.grade)) {
            warnings.push(ValidationWarning {
                item_id: None,
                message: format!(
                    "duplicate track: {} grade {}",
                    t.subject_code,
                    t.grade.map_or("-".to_string(), |g| g.to_string())
                ),
            });
        }
    }

    // Duplicate and empty units
    let mut seen_units = HashSet::new();
    for unit in catalog.tracks().iter().flat_map(|t| &t.units) {
        if !seen_units.insert(&unit.id) {
            warnings.push(warn(&unit.id, format!("duplicate unit ID: {}", unit.id)));
        }
        if unit.exercise_ids.is_empty() {
            warnings.push(warn(
                &unit.id,
                "unit has no exercises and can never be completed".into(),
            ));
        }
    }

    // Duplicate exercise IDs
    let mut seen_exercises = HashSet::new();
    for e in catalog.exercises() {
        if !seen_exercises.insert(&e.id) {
            warnings.push(warn(&e.id, format!("duplicate exercise ID: {}", e.id)));
        }
    }

    // Answer keys
    for e in catalog.exercises() {
        if e.kind == ExerciseKind::Application {
            if e.correct_answer.is_some() {
                warnings.push(warn(
                    &e.id,
                    "application exercises are not auto-graded; correct_answer is ignored".into(),
                ));
            }
            continue;
        }
        if let Err(err) = validate_key(e) {
            warnings.push(warn(&e.id, err.to_string()));
            continue;
        }
        if e.kind == ExerciseKind::Choice && !e.options.is_empty() {
            if let Ok(key) = choice_key(e) {
                if key < 0 || key as usize >= e.options.len() {
                    warnings.push(warn(
                        &e.id,
                        format!(
                            "correct_answer {key} is out of range for {} options",
                            e.options.len()
                        ),
                    ));
                }
            }
        }
    }

    // Empty prompts
    for e in catalog.exercises() {
        if e.prompt.trim().is_empty() {
            warnings.push(warn(&e.id, "prompt is empty".into()));
        }
    }

    warnings
}
