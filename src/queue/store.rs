use super::QUEUE_STORE_NAME;
use crate::error::{OffsyncError, Result};
use crate::types::QueuedRequest;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const RECORD_SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = ".tmp";

/// Durable queue of pending requests, one JSON file per record.
///
/// Every operation touches a single file (or, for `get_all`/`clear`, each
/// file independently), so writers in different contexts or processes can
/// open their own handle on the same directory without a shared lock:
/// `add` is write-temp-then-rename, `delete` is a single unlink.
#[derive(Debug, Clone)]
pub struct QueueStore {
    dir: PathBuf,
}

impl QueueStore {
    /// Open (creating if needed) the queue under `{data_dir}/request-queue`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref().join(QUEUE_STORE_NAME);
        fs::create_dir_all(&dir).map_err(|e| {
            OffsyncError::PersistenceFailure(format!("cannot open queue at {:?}: {}", dir, e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Insert or overwrite the record keyed by its id.
    pub fn add(&self, record: &QueuedRequest) -> Result<()> {
        let path = self.record_path(&record.id)?;
        let tmp_path = self.dir.join(format!(
            ".{}.{}{}",
            record.id,
            uuid::Uuid::new_v4().simple(),
            TMP_SUFFIX
        ));

        let bytes = serde_json::to_vec(record)?;
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &path)
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(OffsyncError::PersistenceFailure(format!(
                "cannot write queued request {}: {}",
                record.id, e
            )));
        }

        tracing::debug!("[QUEUE] stored {} {} {}", record.id, record.method, record.url);
        Ok(())
    }

    /// Remove one record. Unknown ids are a no-op.
    pub fn delete(&self, id: &str) -> Result<()> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("[QUEUE] deleted {}", id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OffsyncError::PersistenceFailure(format!(
                "cannot delete queued request {}: {}",
                id, e
            ))),
        }
    }

    /// Every readable record. Order is unspecified; callers sort as they need.
    pub fn get_all(&self) -> Result<Vec<QueuedRequest>> {
        let mut records = Vec::new();
        for path in self.record_files()? {
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                // Deleted by another handle between listing and reading.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(OffsyncError::PersistenceFailure(format!(
                        "cannot read {:?}: {}",
                        path, e
                    )))
                }
            };
            match serde_json::from_slice::<QueuedRequest>(&bytes) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("[QUEUE] skipping unreadable record {:?}: {}", path, e);
                }
            }
        }
        Ok(records)
    }

    /// Number of records `get_all` would return.
    pub fn len(&self) -> Result<usize> {
        Ok(self.get_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every record.
    pub fn clear(&self) -> Result<()> {
        for path in self.record_files()? {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(OffsyncError::PersistenceFailure(format!(
                        "cannot remove {:?}: {}",
                        path, e
                    )))
                }
            }
        }
        tracing::info!("[QUEUE] cleared");
        Ok(())
    }

    fn record_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            OffsyncError::PersistenceFailure(format!("cannot list {:?}: {}", self.dir, e))
        })?;

        Ok(entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|n| !n.starts_with('.') && n.ends_with(RECORD_SUFFIX))
                    .unwrap_or(false)
            })
            .map(|e| e.path())
            .collect())
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(OffsyncError::InvalidRequest(format!(
                "invalid queued request id: {:?}",
                id
            )));
        }
        Ok(self.dir.join(format!("{}{}", id, RECORD_SUFFIX)))
    }
}
