//! JSON file progress store.
//!
//! Layout under the data directory:
//!
//! ```text
//! answers/<student>.jsonl          append-only answer log, one record per line
//! progress/<student>/<unit>.json   one progress row per file
//! placements/<student>/<plan>.json placement plans
//! ```
//!
//! Single rows are replaced with a write-then-rename. A batch unlock keeps
//! the previous contents of every row it touched and restores them if any
//! write fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::instrument;

use unitpath_core::error::StoreError;
use unitpath_core::model::{AnswerRecord, UnitProgress};
use unitpath_core::placement::PlacementPlan;
use unitpath_core::traits::ProgressStore;

/// File-based JSON progress store.
pub struct JsonFileStore {
    root: PathBuf,
    /// Serializes writers within this process.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store rooted at `root`, creating its directories.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("answers")).await?;
        fs::create_dir_all(root.join("progress")).await?;
        fs::create_dir_all(root.join("placements")).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn answers_path(&self, student_id: &str) -> PathBuf {
        self.root
            .join("answers")
            .join(format!("{}.jsonl", file_stem(student_id)))
    }

    fn progress_dir(&self, student_id: &str) -> PathBuf {
        self.root.join("progress").join(file_stem(student_id))
    }

    fn progress_path(&self, student_id: &str, unit_id: &str) -> PathBuf {
        self.progress_dir(student_id)
            .join(format!("{}.json", file_stem(unit_id)))
    }

    fn placements_dir(&self, student_id: &str) -> PathBuf {
        self.root.join("placements").join(file_stem(student_id))
    }

    fn placement_path(&self, student_id: &str, plan_id: &str) -> PathBuf {
        self.placements_dir(student_id)
            .join(format!("{}.json", file_stem(plan_id)))
    }

    async fn read_log(&self, student_id: &str) -> Result<Vec<AnswerRecord>, StoreError> {
        let path = self.answers_path(student_id);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| {
                    StoreError::Corrupt(format!("{} line {}: {e}", path.display(), i + 1))
                })
            })
            .collect()
    }

    async fn restore(&self, applied: Vec<(PathBuf, Option<String>)>) {
        for (path, previous) in applied.into_iter().rev() {
            let result = match previous {
                Some(content) => write_atomic(&path, content.as_bytes()).await,
                None => fs::remove_file(&path).await,
            };
            if let Err(e) = result {
                tracing::error!("failed to restore {}: {e}", path.display());
            }
        }
    }
}

/// Map an id to a safe file stem.
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read_to_string(path).await {
        Ok(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn remove_dir_counting(dir: &Path) -> Result<usize, StoreError> {
    let mut count = 0;
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) == Some("json") {
            count += 1;
        }
    }
    fs::remove_dir_all(dir).await?;
    Ok(count)
}

#[async_trait]
impl ProgressStore for JsonFileStore {
    fn name(&self) -> &str {
        "json"
    }

    #[instrument(skip(self, record), fields(student = %record.student_id))]
    async fn append_answer(&self, record: &AnswerRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.answers_path(&record.student_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn answers(
        &self,
        student_id: &str,
        unit_id: &str,
    ) -> Result<Vec<AnswerRecord>, StoreError> {
        let mut records = self.read_log(student_id).await?;
        records.retain(|r| r.unit_id == unit_id);
        Ok(records)
    }

    async fn answers_in_session(
        &self,
        student_id: &str,
        session_id: &str,
    ) -> Result<Vec<AnswerRecord>, StoreError> {
        let mut records = self.read_log(student_id).await?;
        records.retain(|r| r.session_id == session_id);
        Ok(records)
    }

    async fn load_progress(
        &self,
        student_id: &str,
        unit_id: &str,
    ) -> Result<Option<UnitProgress>, StoreError> {
        read_json(&self.progress_path(student_id, unit_id)).await
    }

    async fn save_progress(&self, row: &UnitProgress) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(row)?;
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.progress_path(&row.student_id, &row.unit_id), json.as_bytes()).await?;
        Ok(())
    }

    async fn progress_for_units(
        &self,
        student_id: &str,
        unit_ids: &[String],
    ) -> Result<HashMap<String, UnitProgress>, StoreError> {
        let mut rows = HashMap::new();
        for id in unit_ids {
            if let Some(row) = read_json(&self.progress_path(student_id, id)).await? {
                rows.insert(id.clone(), row);
            }
        }
        Ok(rows)
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn unlock_units(&self, rows: &[UnitProgress]) -> Result<(), StoreError> {
        let encoded = rows
            .iter()
            .map(|r| serde_json::to_string_pretty(r).map(|json| (r, json)))
            .collect::<Result<Vec<_>, _>>()?;

        let _guard = self.write_lock.lock().await;
        let mut applied = Vec::with_capacity(encoded.len());
        for (row, json) in encoded {
            let path = self.progress_path(&row.student_id, &row.unit_id);
            let step = async {
                let previous = read_optional(&path).await?;
                write_atomic(&path, json.as_bytes()).await?;
                Ok::<_, std::io::Error>(previous)
            };
            match step.await {
                Ok(previous) => applied.push((path, previous)),
                Err(e) => {
                    self.restore(applied).await;
                    return Err(StoreError::RolledBack(format!(
                        "writing {} for unit {}: {e}",
                        path.display(),
                        row.unit_id
                    )));
                }
            }
        }
        Ok(())
    }

    async fn save_placement(&self, plan: &PlacementPlan) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(plan)?;
        let _guard = self.write_lock.lock().await;
        write_atomic(&self.placement_path(&plan.student_id, &plan.id), json.as_bytes()).await?;
        Ok(())
    }

    async fn load_placement(
        &self,
        student_id: &str,
        plan_id: &str,
    ) -> Result<Option<PlacementPlan>, StoreError> {
        read_json(&self.placement_path(student_id, plan_id)).await
    }

    async fn delete_student(&self, student_id: &str) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;

        let log = self.answers_path(student_id);
        if let Some(content) = read_optional(&log).await? {
            removed += content.lines().filter(|l| !l.trim().is_empty()).count();
            fs::remove_file(&log).await?;
        }
        removed += remove_dir_counting(&self.progress_dir(student_id)).await?;
        removed += remove_dir_counting(&self.placements_dir(student_id)).await?;
        Ok(removed)
    }
}
