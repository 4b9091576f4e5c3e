//! In-memory content catalog.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::ContentError;
use crate::model::{Exercise, Track, Unit};
use crate::traits::ContentSource;

/// Tracks and exercises loaded up front, e.g. from a TOML file.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
    exercises: Vec<Exercise>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog. When exercise ids repeat, the first one wins;
    /// [`validate_catalog`](crate::parser::validate_catalog) reports the rest.
    pub fn new(tracks: Vec<Track>, exercises: Vec<Exercise>) -> Self {
        let mut by_id = HashMap::with_capacity(exercises.len());
        for (i, e) in exercises.iter().enumerate() {
            by_id.entry(e.id.clone()).or_insert(i);
        }
        Self {
            tracks,
            exercises,
            by_id,
        }
    }

    /// Append another catalog's tracks and exercises.
    pub fn merge(&mut self, other: Catalog) {
        let mut tracks = std::mem::take(&mut self.tracks);
        let mut exercises = std::mem::take(&mut self.exercises);
        tracks.extend(other.tracks);
        exercises.extend(other.exercises);
        *self = Catalog::new(tracks, exercises);
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn exercises(&self) -> &[Exercise] {
        &self.exercises
    }

    pub fn get_exercise(&self, id: &str) -> Option<&Exercise> {
        self.by_id.get(id).map(|&i| &self.exercises[i])
    }

    /// The track holding a unit and the unit's position in it.
    pub fn locate_unit(&self, unit_id: &str) -> Option<(&Track, usize)> {
        self.tracks
            .iter()
            .find_map(|t| t.position(unit_id).map(|i| (t, i)))
    }

    pub fn get_unit(&self, unit_id: &str) -> Option<&Unit> {
        self.locate_unit(unit_id).map(|(t, i)| &t.units[i])
    }

    pub fn find_track(&self, subject_code: &str, grade: Option<u8>) -> Option<&Track> {
        self.tracks.iter().find(|t| {
            t.subject_code == subject_code && (grade.is_none() || t.grade == grade)
        })
    }

    /// Exercises of a unit in the unit's authored order.
    pub fn unit_exercises(&self, unit_id: &str) -> Vec<&Exercise> {
        self.get_unit(unit_id)
            .map(|u| {
                u.exercise_ids
                    .iter()
                    .filter_map(|id| self.get_exercise(id))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContentSource for Catalog {
    fn name(&self) -> &str {
        "catalog"
    }

    async fn exercise(&self, id: &str) -> Result<Option<Exercise>, ContentError> {
        Ok(self.get_exercise(id).cloned())
    }

    async fn exercises_for_unit(&self, unit_id: &str) -> Result<Vec<Exercise>, ContentError> {
        Ok(self.unit_exercises(unit_id).into_iter().cloned().collect())
    }

    async fn track_containing(&self, unit_id: &str) -> Result<Option<Track>, ContentError> {
        Ok(self.locate_unit(unit_id).map(|(t, _)| t.clone()))
    }

    async fn track(
        &self,
        subject_code: &str,
        grade: Option<u8>,
    ) -> Result<Option<Track>, ContentError> {
        Ok(self.find_track(subject_code, grade).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, ExerciseKind, UnitType};

    fn exercise(id: &str, unit: &str) -> Exercise {
        Exercise {
            id: id.into(),
            unit_id: unit.into(),
            kind: ExerciseKind::Choice,
            prompt: format!("prompt {id}"),
            options: vec!["a".into(), "b".into()],
            correct_answer: Some(serde_json::json!(0)),
            difficulty: Difficulty::Medium,
            explanation: String::new(),
            help: None,
            knowledge_points: vec![],
            points: 10,
        }
    }

    fn catalog() -> Catalog {
        let track = |subject: &str, grade: u8, units: Vec<Unit>| Track {
            subject_code: subject.into(),
            grade: Some(grade),
            name: format!("{subject} {grade}"),
            units,
        };
        let unit = |id: &str, ex: &[&str]| Unit {
            id: id.into(),
            name: id.into(),
            unit_type: UnitType::Lesson,
            exercise_ids: ex.iter().map(|s| s.to_string()).collect(),
        };
        Catalog::new(
            vec![
                track("math", 1, vec![unit("m1", &["e2", "e1"]), unit("m2", &[])]),
                track("math", 2, vec![unit("m3", &["e3"])]),
            ],
            vec![exercise("e1", "m1"), exercise("e2", "m1"), exercise("e3", "m3")],
        )
    }

    #[test]
    fn unit_exercises_follow_authored_order() {
        let c = catalog();
        let ids: Vec<_> = c.unit_exercises("m1").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["e2", "e1"]);
        assert!(c.unit_exercises("nope").is_empty());
    }

    #[test]
    fn track_lookup_by_grade() {
        let c = catalog();
        assert_eq!(c.find_track("math", Some(2)).unwrap().units[0].id, "m3");
        assert_eq!(c.find_track("math", None).unwrap().grade, Some(1));
        assert!(c.find_track("math", Some(9)).is_none());
        assert_eq!(c.locate_unit("m2").unwrap().1, 1);
    }

    #[test]
    fn first_duplicate_wins() {
        let mut dup = exercise("e1", "m1");
        dup.prompt = "second".into();
        let c = Catalog::new(vec![], vec![exercise("e1", "m1"), dup]);
        assert_eq!(c.get_exercise("e1").unwrap().prompt, "prompt e1");
    }

    #[tokio::test]
    async fn content_source_impl() {
        let c = catalog();
        assert_eq!(c.name(), "catalog");
        assert!(c.exercise("e3").await.unwrap().is_some());
        assert!(c.exercise("missing").await.unwrap().is_none());
        let t = c.track_containing("m3").await.unwrap().unwrap();
        assert_eq!(t.grade, Some(2));
        assert_eq!(c.exercises_for_unit("m1").await.unwrap().len(), 2);
    }

    #[test]
    fn merge_rebuilds_index() {
        let mut a = catalog();
        a.merge(Catalog::new(vec![], vec![exercise("extra", "m2")]));
        assert!(a.get_exercise("extra").is_some());
        assert_eq!(a.tracks().len(), 2);
    }
}
