//! Unit access rules within a track.
//!
//! `unit[i]` is accessible iff `i == 0`, or the predecessor's progress row is
//! completed or carries a placement unlock, or the predecessor is an
//! `exercise`-type unit. A missing row counts as closed. Nothing here is
//! cached; callers evaluate against freshly loaded rows.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{Track, UnitProgress, UnitType};

/// Why a unit is (or is not) accessible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    FirstUnit,
    PredecessorCompleted,
    PlacementUnlocked,
    PredecessorIsExercise,
    Locked,
}

/// Access state of one unit in a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitAccess {
    pub unit_id: String,
    pub name: String,
    pub accessible: bool,
    pub reason: AccessReason,
    /// Stars from the unit's own row, 0 if there is none.
    pub stars: u8,
    pub completed: bool,
}

/// Why `track.units[index]` is or is not accessible, or `None` if the index
/// is out of range.
pub fn access_reason<'a>(
    track: &Track,
    index: usize,
    progress: impl Fn(&str) -> Option<&'a UnitProgress>,
) -> Option<AccessReason> {
    track.units.get(index)?;
    if index == 0 {
        return Some(AccessReason::FirstUnit);
    }
    let pred = &track.units[index - 1];
    if pred.unit_type == UnitType::Exercise {
        return Some(AccessReason::PredecessorIsExercise);
    }
    let reason = match progress(&pred.id) {
        Some(row) if row.completed => AccessReason::PredecessorCompleted,
        Some(row) if row.unlock_next => AccessReason::PlacementUnlocked,
        _ => AccessReason::Locked,
    };
    Some(reason)
}

/// Whether `track.units[index]` is accessible. Out-of-range indices are not.
pub fn is_accessible<'a>(
    track: &Track,
    index: usize,
    progress: impl Fn(&str) -> Option<&'a UnitProgress>,
) -> bool {
    access_reason(track, index, progress).is_some_and(|r| r != AccessReason::Locked)
}

/// Access state of every unit in the track, in track order.
pub fn track_access(track: &Track, rows: &HashMap<String, UnitProgress>) -> Vec<UnitAccess> {
    track
        .units
        .iter()
        .enumerate()
        .map(|(i, unit)| {
            let reason = access_reason(track, i, |id| rows.get(id)).unwrap_or(AccessReason::Locked);
            let own = rows.get(&unit.id);
            UnitAccess {
                unit_id: unit.id.clone(),
                name: unit.name.clone(),
                accessible: reason != AccessReason::Locked,
                reason,
                stars: own.map_or(0, |r| r.stars),
                completed: own.is_some_and(|r| r.completed),
            }
        })
        .collect()
}
