//! File-backed audit log writing newline-delimited JSON records.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use arbiter_primitives::CorrelationId;
use arbiter_tools::ExecutionRecord;
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::entry::{AuditEntry, AuditRecord, Flag};
use crate::error::{AuditError, AuditResult};
use crate::log::{AuditFilter, AuditLog, apply_filter, join_records};

struct FileState {
    file: tokio::fs::File,
    seen: HashSet<CorrelationId>,
    records: usize,
}

/// Audit log persisted as one JSON record per line, append-only.
pub struct FileAuditLog {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileAuditLog {
    /// Opens (or creates) an audit file at the provided path.
    ///
    /// Existing records are scanned once so follow-up attachments can be
    /// validated against correlation ids appended in earlier runs.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors and rejects undecodable existing content.
    pub async fn open(path: impl Into<PathBuf>) -> AuditResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .await?;

        let existing = read_records(&path).await?;
        let mut seen = HashSet::new();
        for record in &existing {
            if let AuditRecord::Entry(entry) = record {
                seen.insert(entry.correlation_id());
            }
        }

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                file,
                seen,
                records: existing.len(),
            }),
        })
    }

    /// Returns the underlying path of the audit file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recomputes the content hash of every stored line, in append order.
    ///
    /// Re-running this over time and comparing demonstrates that no record
    /// was mutated after append.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors encountered while reading the file.
    pub async fn record_hashes(&self) -> AuditResult<Vec<String>> {
        let data = fs::read(&self.path).await?;
        Ok(data
            .split(|byte| *byte == b'\n')
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| blake3::hash(chunk).to_hex().to_string())
            .collect())
    }

    async fn push(&self, record: AuditRecord) -> AuditResult<()> {
        let line = serde_json::to_vec(&record)?;
        let mut guard = self.state.lock().await;
        guard.file.write_all(&line).await?;
        guard.file.write_u8(b'\n').await?;
        guard.file.flush().await?;
        guard.records += 1;
        if let AuditRecord::Entry(entry) = &record {
            guard.seen.insert(entry.correlation_id());
        }
        Ok(())
    }

    async fn require_seen(&self, correlation_id: CorrelationId) -> AuditResult<()> {
        let guard = self.state.lock().await;
        if guard.seen.contains(&correlation_id) {
            Ok(())
        } else {
            Err(AuditError::UnknownCorrelation { correlation_id })
        }
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn append(&self, entry: AuditEntry) -> AuditResult<CorrelationId> {
        let correlation_id = entry.correlation_id();
        self.push(AuditRecord::Entry(entry)).await?;
        debug!(%correlation_id, path = %self.path.display(), "audit entry appended");
        Ok(correlation_id)
    }

    async fn attach_execution(
        &self,
        correlation_id: CorrelationId,
        execution: ExecutionRecord,
    ) -> AuditResult<()> {
        self.require_seen(correlation_id).await?;
        self.push(AuditRecord::Execution {
            correlation_id,
            execution_result: execution,
        })
        .await
    }

    async fn attach_flag(&self, correlation_id: CorrelationId, flag: Flag) -> AuditResult<()> {
        self.require_seen(correlation_id).await?;
        self.push(AuditRecord::Flag {
            correlation_id,
            flag,
        })
        .await
    }

    async fn query(&self, filter: &AuditFilter) -> AuditResult<Vec<AuditEntry>> {
        let records = read_records(&self.path).await?;
        Ok(apply_filter(join_records(records), filter))
    }

    async fn count(&self) -> AuditResult<usize> {
        Ok(self.state.lock().await.records)
    }
}

async fn read_records(path: &Path) -> AuditResult<Vec<AuditRecord>> {
    let data = fs::read(path).await?;
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for chunk in data
        .split(|byte| *byte == b'\n')
        .filter(|chunk| !chunk.is_empty())
    {
        let record: AuditRecord = serde_json::from_slice(chunk)?;
        records.push(record);
    }
    Ok(records)
}
