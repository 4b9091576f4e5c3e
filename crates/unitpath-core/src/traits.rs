//! Collaborator traits.
//!
//! [`ContentSource`] and [`ProgressStore`] are implemented by the
//! `unitpath-backends` crate (and by [`Catalog`](crate::catalog::Catalog)
//! for content). [`AnswerGateway`] is the seam a client-side
//! [`PracticeSession`](crate::session::PracticeSession) talks through.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::engine::{SkipRequest, SubmitOutcome, SubmitRequest};
use crate::error::{ContentError, EngineError, StoreError};
use crate::model::{AnswerRecord, Exercise, SessionContext, Track, UnitProgress};
use crate::placement::PlacementPlan;

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Read-only access to exercises and the unit catalog.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Human-readable source name (e.g. "catalog").
    fn name(&self) -> &str;

    async fn exercise(&self, id: &str) -> Result<Option<Exercise>, ContentError>;

    /// Exercises of a unit in authored order. Unknown units yield an empty
    /// list.
    async fn exercises_for_unit(&self, unit_id: &str) -> Result<Vec<Exercise>, ContentError>;

    /// The track a unit belongs to.
    async fn track_containing(&self, unit_id: &str) -> Result<Option<Track>, ContentError>;

    /// A track by subject code. With no grade the first matching track is
    /// returned.
    async fn track(
        &self,
        subject_code: &str,
        grade: Option<u8>,
    ) -> Result<Option<Track>, ContentError>;
}

// ---------------------------------------------------------------------------
// Progress store
// ---------------------------------------------------------------------------

/// Durable storage for answer records, progress rows and placement plans.
///
/// The answer log is append-only. Row writes are last-writer-wins; the
/// engine serializes writers per (student, unit).
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Human-readable backend name (e.g. "memory").
    fn name(&self) -> &str;

    async fn append_answer(&self, record: &AnswerRecord) -> Result<(), StoreError>;

    /// Every record for (student, unit), oldest first.
    async fn answers(&self, student_id: &str, unit_id: &str)
        -> Result<Vec<AnswerRecord>, StoreError>;

    /// Every record the student wrote under one session id, oldest first.
    async fn answers_in_session(
        &self,
        student_id: &str,
        session_id: &str,
    ) -> Result<Vec<AnswerRecord>, StoreError>;

    async fn load_progress(
        &self,
        student_id: &str,
        unit_id: &str,
    ) -> Result<Option<UnitProgress>, StoreError>;

    async fn save_progress(&self, row: &UnitProgress) -> Result<(), StoreError>;

    /// Rows for the given units that exist, keyed by unit id.
    async fn progress_for_units(
        &self,
        student_id: &str,
        unit_ids: &[String],
    ) -> Result<HashMap<String, UnitProgress>, StoreError>;

    /// Write a set of rows all-or-nothing. On error no row has changed.
    async fn unlock_units(&self, rows: &[UnitProgress]) -> Result<(), StoreError>;

    async fn save_placement(&self, plan: &PlacementPlan) -> Result<(), StoreError>;

    async fn load_placement(
        &self,
        student_id: &str,
        plan_id: &str,
    ) -> Result<Option<PlacementPlan>, StoreError>;

    /// Remove every record, row and plan of a student. Returns how many
    /// items were removed.
    async fn delete_student(&self, student_id: &str) -> Result<usize, StoreError>;
}

// ---------------------------------------------------------------------------
// Answer gateway
// ---------------------------------------------------------------------------

/// Where a practice session sends its submissions.
#[async_trait]
pub trait AnswerGateway: Send + Sync {
    async fn submit(
        &self,
        ctx: &SessionContext,
        request: &SubmitRequest,
    ) -> Result<SubmitOutcome, EngineError>;

    async fn skip(
        &self,
        ctx: &SessionContext,
        request: &SkipRequest,
    ) -> Result<SubmitOutcome, EngineError>;
}
