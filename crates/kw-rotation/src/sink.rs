//! Durable storage for evidence records
//!
//! Records are stored under a key derived from the run id and the principal,
//! `run_<run_id>_<principal>`, so two runs never share a location. Sinks
//! refuse to overwrite an existing record.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::evidence::EvidenceRecord;

const RECORD_FILE: &str = "result.json";

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Evidence already exists: {0}")]
    AlreadyExists(String),
}

/// Storage key for one run's evidence
pub fn evidence_key(run_id: &str, principal: &str) -> String {
    let principal: String = principal
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "+=,.@_-".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("run_{}_{}", run_id, principal)
}

/// Evidence sink trait
#[async_trait]
pub trait EvidenceSink: Send + Sync {
    /// Persist `record` under `key`, returning a human-readable location
    async fn write(&self, key: &str, record: &EvidenceRecord) -> Result<String, EvidenceError>;

    /// Sink name
    fn name(&self) -> &str;
}

/// Writes pretty-printed JSON to `<base_dir>/<key>/result.json`
pub struct FileEvidenceSink {
    base_dir: PathBuf,
}

impl FileEvidenceSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path a record with `key` is written to
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(key).join(RECORD_FILE)
    }
}

#[async_trait]
impl EvidenceSink for FileEvidenceSink {
    async fn write(&self, key: &str, record: &EvidenceRecord) -> Result<String, EvidenceError> {
        let path = self.record_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(record)?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(EvidenceError::AlreadyExists(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&body).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        debug!(path = %path.display(), "Evidence written");
        Ok(path.display().to_string())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Keeps records in memory
#[derive(Default)]
pub struct MemoryEvidenceSink {
    records: Mutex<Vec<(String, EvidenceRecord)>>,
}

impl MemoryEvidenceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored records with their keys, in write order
    pub fn records(&self) -> Vec<(String, EvidenceRecord)> {
        self.records.lock().clone()
    }

    /// Most recently written record
    pub fn last(&self) -> Option<EvidenceRecord> {
        self.records.lock().last().map(|(_, record)| record.clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl EvidenceSink for MemoryEvidenceSink {
    async fn write(&self, key: &str, record: &EvidenceRecord) -> Result<String, EvidenceError> {
        let mut records = self.records.lock();
        if records.iter().any(|(existing, _)| existing == key) {
            return Err(EvidenceError::AlreadyExists(key.to_string()));
        }
        records.push((key.to_string(), record.clone()));
        Ok(format!("memory://{}", key))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
