//! In-memory progress store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use unitpath_core::error::StoreError;
use unitpath_core::model::{AnswerRecord, UnitProgress};
use unitpath_core::placement::PlacementPlan;
use unitpath_core::traits::ProgressStore;

type Key = (String, String);

fn key(a: &str, b: &str) -> Key {
    (a.to_string(), b.to_string())
}

#[derive(Debug, Default)]
struct Inner {
    answers: Vec<AnswerRecord>,
    progress: HashMap<Key, UnitProgress>,
    placements: HashMap<Key, PlacementPlan>,
}

/// A progress store that lives for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of answer records held.
    pub async fn answer_count(&self) -> usize {
        self.inner.read().await.answers.len()
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append_answer(&self, record: &AnswerRecord) -> Result<(), StoreError> {
        self.inner.write().await.answers.push(record.clone());
        Ok(())
    }

    async fn answers(
        &self,
        student_id: &str,
        unit_id: &str,
    ) -> Result<Vec<AnswerRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .answers
            .iter()
            .filter(|r| r.student_id == student_id && r.unit_id == unit_id)
            .cloned()
            .collect())
    }

    async fn answers_in_session(
        &self,
        student_id: &str,
        session_id: &str,
    ) -> Result<Vec<AnswerRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .answers
            .iter()
            .filter(|r| r.student_id == student_id && r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn load_progress(
        &self,
        student_id: &str,
        unit_id: &str,
    ) -> Result<Option<UnitProgress>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.progress.get(&key(student_id, unit_id)).cloned())
    }

    async fn save_progress(&self, row: &UnitProgress) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .progress
            .insert(key(&row.student_id, &row.unit_id), row.clone());
        Ok(())
    }

    async fn progress_for_units(
        &self,
        student_id: &str,
        unit_ids: &[String],
    ) -> Result<HashMap<String, UnitProgress>, StoreError> {
        let inner = self.inner.read().await;
        Ok(unit_ids
            .iter()
            .filter_map(|id| {
                inner
                    .progress
                    .get(&key(student_id, id))
                    .map(|row| (id.clone(), row.clone()))
            })
            .collect())
    }

    async fn unlock_units(&self, rows: &[UnitProgress]) -> Result<(), StoreError> {
        // One write guard covers the whole set.
        let mut inner = self.inner.write().await;
        for row in rows {
            inner
                .progress
                .insert(key(&row.student_id, &row.unit_id), row.clone());
        }
        Ok(())
    }

    async fn save_placement(&self, plan: &PlacementPlan) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .placements
            .insert(key(&plan.student_id, &plan.id), plan.clone());
        Ok(())
    }

    async fn load_placement(
        &self,
        student_id: &str,
        plan_id: &str,
    ) -> Result<Option<PlacementPlan>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.placements.get(&key(student_id, plan_id)).cloned())
    }

    async fn delete_student(&self, student_id: &str) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.answers.len() + inner.progress.len() + inner.placements.len();
        inner.answers.retain(|r| r.student_id != student_id);
        inner.progress.retain(|(s, _), _| s != student_id);
        inner.placements.retain(|(s, _), _| s != student_id);
        let after = inner.answers.len() + inner.progress.len() + inner.placements.len();
        Ok(before - after)
    }
}
