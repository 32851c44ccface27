use std::path::{Path, PathBuf};

use tokio::{fs, io::AsyncWriteExt};

use super::HistoryStore;
use crate::errors::StoreError;
use crate::HistoryEvent;

/// Filesystem-backed history store writing one JSONL file per
/// orchestration id under a root directory.
#[derive(Clone)]
pub struct FsHistoryStore {
    root: PathBuf,
    cap: usize,
}

impl FsHistoryStore {
    const DEFAULT_CAP: usize = 4096;

    /// Create a new store rooted at the given directory path.
    /// If `reset_on_create` is true, delete any existing data under the
    /// root first.
    pub fn new(root: impl AsRef<Path>, reset_on_create: bool) -> Self {
        let path = root.as_ref().to_path_buf();
        if reset_on_create {
            let _ = std::fs::remove_dir_all(&path);
        }
        let _ = std::fs::create_dir_all(&path);
        Self {
            root: path,
            cap: Self::DEFAULT_CAP,
        }
    }

    /// Create a new store with a custom history cap (useful for tests).
    pub fn new_with_cap(root: impl AsRef<Path>, reset_on_create: bool, cap: usize) -> Self {
        let mut s = Self::new(root, reset_on_create);
        s.cap = cap;
        s
    }

    fn log_path(&self, orchestration_id: &str) -> PathBuf {
        self.root.join(format!("{orchestration_id}.jsonl"))
    }

    async fn read_log(&self, orchestration_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        let path = self.log_path(orchestration_id);
        let data = match fs::read_to_string(&path).await {
            Ok(d) => d,
            // Unknown id yields an empty sequence by contract.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    operation: "read",
                    message: e.to_string(),
                })
            }
        };
        let mut out = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let ev = serde_json::from_str::<HistoryEvent>(line)
                .map_err(|e| StoreError::Serde(e.to_string()))?;
            out.push(ev);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl HistoryStore for FsHistoryStore {
    /// Append one event as one JSONL line. The cap guards runaway logs.
    async fn append_event(
        &self,
        orchestration_id: &str,
        event: HistoryEvent,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).await.ok();
        let existing = self.read_log(orchestration_id).await?;
        if existing.len() >= self.cap {
            return Err(StoreError::CapExceeded {
                cap: self.cap,
                have: existing.len(),
            });
        }
        if event.event_id != existing.len() as u64 {
            return Err(StoreError::Corrupt {
                orchestration_id: orchestration_id.to_string(),
                message: format!(
                    "append out of order: event_id {} at position {}",
                    event.event_id,
                    existing.len()
                ),
            });
        }
        let line = serde_json::to_string(&event).map_err(|e| StoreError::Serde(e.to_string()))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(orchestration_id))
            .await
            .map_err(|e| StoreError::Io {
                operation: "open",
                message: e.to_string(),
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::Io {
                operation: "write",
                message: e.to_string(),
            })?;
        file.write_all(b"\n").await.map_err(|e| StoreError::Io {
            operation: "write",
            message: e.to_string(),
        })?;
        file.flush().await.ok();
        Ok(())
    }

    async fn load_events(&self, orchestration_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        self.read_log(orchestration_id).await
    }

    /// List orchestrations by scanning `.jsonl` files under the root.
    async fn list_orchestrations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Ok(mut rd) = fs::read_dir(&self.root).await {
            while let Ok(Some(ent)) = rd.next_entry().await {
                if let Some(name) = ent.file_name().to_str() {
                    if let Some(stem) = name.strip_suffix(".jsonl") {
                        out.push(stem.to_string());
                    }
                }
            }
        }
        out
    }

    /// Remove the root directory and all contents.
    async fn reset(&self) {
        let _ = fs::remove_dir_all(&self.root).await;
    }
}
