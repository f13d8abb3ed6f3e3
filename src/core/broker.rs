use crate::core::error::{MemoryError, MemoryResult};
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Append-only JSONL record of connector operations.
///
/// One line per operation, written after the operation finishes so `status`
/// reflects the real outcome. The log is observability only: nothing reads
/// it back to reconstruct state.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub ts: String,
    pub event_id: String,
    pub op: String,
    pub db_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl AuditLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record<R>(
        &self,
        op: &str,
        db_id: &str,
        agent_id: Option<&str>,
        result: &MemoryResult<R>,
    ) -> MemoryResult<()> {
        let (status, error_kind) = match result {
            Ok(_) => ("success", None),
            Err(e) => ("error", Some(e.kind().to_string())),
        };
        let ev = AuditEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            op: op.to_string(),
            db_id: db_id.to_string(),
            agent_id: agent_id.map(|s| s.to_string()),
            status: status.to_string(),
            error_kind,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(MemoryError::IoError)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(MemoryError::IoError)?;
        writeln!(f, "{}", serde_json::to_string(&ev)?).map_err(MemoryError::IoError)?;
        Ok(())
    }

    /// Read every event back, skipping lines that do not parse.
    pub fn read_events(&self) -> MemoryResult<Vec<AuditEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path).map_err(MemoryError::IoError)?;
        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(MemoryError::IoError)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEvent>(&line) {
                Ok(ev) => events.push(ev),
                Err(e) => tracing::warn!(error = %e, "skipping malformed audit line"),
            }
        }
        Ok(events)
    }
}
