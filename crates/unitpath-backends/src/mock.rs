//! Fault-injecting store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use unitpath_core::error::StoreError;
use unitpath_core::model::{AnswerRecord, UnitProgress};
use unitpath_core::placement::PlacementPlan;
use unitpath_core::traits::ProgressStore;

use crate::memory::MemoryStore;

/// Wraps a [`MemoryStore`] and fails or stalls selected calls.
///
/// Lets the engine's rollback, timeout and retry paths be exercised
/// without a real backend.
pub struct FaultyStore {
    inner: MemoryStore,
    /// Remaining `append_answer` calls that fail with `Unavailable`.
    failing_appends: AtomicU32,
    /// Remaining `save_progress` calls that fail with `Unavailable`.
    failing_saves: AtomicU32,
    /// Whether `unlock_units` rolls back instead of writing.
    fail_unlock: AtomicBool,
    /// Added to every call.
    delay: Mutex<Option<Duration>>,
    append_calls: AtomicU32,
    unlock_calls: AtomicU32,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_appends: AtomicU32::new(0),
            failing_saves: AtomicU32::new(0),
            fail_unlock: AtomicBool::new(false),
            delay: Mutex::new(None),
            append_calls: AtomicU32::new(0),
            unlock_calls: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` appends.
    pub fn fail_next_appends(&self, n: u32) {
        self.failing_appends.store(n, Ordering::Relaxed);
    }

    /// Fail the next `n` row saves.
    pub fn fail_next_saves(&self, n: u32) {
        self.failing_saves.store(n, Ordering::Relaxed);
    }

    pub fn set_fail_unlock(&self, fail: bool) {
        self.fail_unlock.store(fail, Ordering::Relaxed);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    pub fn append_calls(&self) -> u32 {
        self.append_calls.load(Ordering::Relaxed)
    }

    pub fn unlock_calls(&self) -> u32 {
        self.unlock_calls.load(Ordering::Relaxed)
    }

    /// The wrapped store, for inspecting what was actually written.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    async fn stall(&self) {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

impl Default for FaultyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressStore for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn append_answer(&self, record: &AnswerRecord) -> Result<(), StoreError> {
        self.append_calls.fetch_add(1, Ordering::Relaxed);
        self.stall().await;
        let failing = self
            .failing_appends
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("injected append failure".into()));
        }
        self.inner.append_answer(record).await
    }

    async fn answers(
        &self,
        student_id: &str,
        unit_id: &str,
    ) -> Result<Vec<AnswerRecord>, StoreError> {
        self.stall().await;
        self.inner.answers(student_id, unit_id).await
    }

    async fn answers_in_session(
        &self,
        student_id: &str,
        session_id: &str,
    ) -> Result<Vec<AnswerRecord>, StoreError> {
        self.stall().await;
        self.inner.answers_in_session(student_id, session_id).await
    }

    async fn load_progress(
        &self,
        student_id: &str,
        unit_id: &str,
    ) -> Result<Option<UnitProgress>, StoreError> {
        self.stall().await;
        self.inner.load_progress(student_id, unit_id).await
    }

    async fn save_progress(&self, row: &UnitProgress) -> Result<(), StoreError> {
        self.stall().await;
        let failing = self
            .failing_saves
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("injected save failure".into()));
        }
        self.inner.save_progress(row).await
    }

    async fn progress_for_units(
        &self,
        student_id: &str,
        unit_ids: &[String],
    ) -> Result<HashMap<String, UnitProgress>, StoreError> {
        self.stall().await;
        self.inner.progress_for_units(student_id, unit_ids).await
    }

    async fn unlock_units(&self, rows: &[UnitProgress]) -> Result<(), StoreError> {
        self.unlock_calls.fetch_add(1, Ordering::Relaxed);
        self.stall().await;
        if self.fail_unlock.load(Ordering::Relaxed) {
            return Err(StoreError::RolledBack(format!(
                "injected failure after 1 of {} rows",
                rows.len()
            )));
        }
        self.inner.unlock_units(rows).await
    }

    async fn save_placement(&self, plan: &PlacementPlan) -> Result<(), StoreError> {
        self.stall().await;
        self.inner.save_placement(plan).await
    }

    async fn load_placement(
        &self,
        student_id: &str,
        plan_id: &str,
    ) -> Result<Option<PlacementPlan>, StoreError> {
        self.stall().await;
        self.inner.load_placement(student_id, plan_id).await
    }

    async fn delete_student(&self, student_id: &str) -> Result<usize, StoreError> {
        self.stall().await;
        self.inner.delete_student(student_id).await
    }
}
