use crate::core::error::{MemoryError, MemoryResult};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Open (or create) the database file and apply connection pragmas.
///
/// SQLite opens lazily, so the journal-mode query doubles as the first real
/// read: a file that is not a database fails here rather than on first use.
pub fn db_connect(db_path: &Path, busy_timeout_secs: u32) -> MemoryResult<Connection> {
    let display = db_path.to_string_lossy();
    let conn = Connection::open(db_path).map_err(|e| MemoryError::connection(&display, e))?;
    conn.busy_timeout(Duration::from_secs(u64::from(busy_timeout_secs)))
        .map_err(|e| MemoryError::connection(&display, e))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(|e| MemoryError::connection(&display, e))?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .map_err(|e| MemoryError::connection(&display, e))?;
    Ok(conn)
}

/// Make sure the directory holding `db_path` exists and accepts new files.
pub fn storage_preflight(db_path: &Path) -> MemoryResult<()> {
    let parent = match db_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| {
        MemoryError::ConnectionError(format!(
            "STORAGE_PREFLIGHT_FAILED: cannot create {}: {}",
            parent.display(),
            e
        ))
    })?;

    if db_path.exists() {
        let meta = fs::metadata(db_path).map_err(MemoryError::IoError)?;
        if meta.is_dir() {
            return Err(MemoryError::ConnectionError(format!(
                "STORAGE_PREFLIGHT_FAILED: {} is a directory",
                db_path.display()
            )));
        }
        if meta.permissions().readonly() {
            return Err(MemoryError::ConnectionError(format!(
                "STORAGE_PREFLIGHT_FAILED: {} is read-only",
                db_path.display()
            )));
        }
        return Ok(());
    }

    let probe = parent.join(format!(".amplihack-preflight-{}", std::process::id()));
    fs::write(&probe, b"ok").map_err(|e| {
        MemoryError::ConnectionError(format!(
            "STORAGE_PREFLIGHT_FAILED: {} is not writable: {}",
            parent.display(),
            e
        ))
    })?;
    let _ = fs::remove_file(&probe);
    Ok(())
}
