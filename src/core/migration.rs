//! Schema version detection and migration.
//!
//! - **Migrations run at connect**: a version behind `MEMORY_SCHEMA_VERSION` triggers them
//! - **Idempotent migrations**: every statement is `IF NOT EXISTS` / `OR IGNORE`
//! - **Version tracking**: `meta.schema_version` stores the last applied version
//! - **Forward only**: a file written by a newer crate is refused, not downgraded

use crate::core::error::{MemoryError, MemoryResult};
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension, params};

pub struct Migration {
    /// Schema version this migration produces
    pub version: u32,
    pub description: &'static str,
    pub up: fn(&Connection) -> rusqlite::Result<()>,
}

/// All migrations in ascending version order.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Create experiences and experience_tags with agent/timestamp/importance indexes",
            up: migrate_v1_experiences,
        },
        Migration {
            version: 2,
            description: "Add agents and relationships; backfill agents from existing experiences",
            up: migrate_v2_agents_and_relationships,
        },
    ]
}

pub fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.execute_batch(schemas::MEMORY_DB_SCHEMA_META)?;
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![schemas::META_KEY_SCHEMA_VERSION],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.and_then(|v| v.parse().ok()).unwrap_or(0))
}

/// Bring the database up to `MEMORY_SCHEMA_VERSION`. Returns how many
/// migrations were applied.
pub fn check_and_migrate(conn: &Connection) -> MemoryResult<usize> {
    let migrate_err = |e: rusqlite::Error| MemoryError::ConnectionError(format!("migration failed: {e}"));

    let stored = current_version(conn).map_err(migrate_err)?;
    if stored > schemas::MEMORY_SCHEMA_VERSION {
        return Err(MemoryError::ConnectionError(format!(
            "database schema version {} is newer than supported version {}",
            stored,
            schemas::MEMORY_SCHEMA_VERSION
        )));
    }
    if stored == schemas::MEMORY_SCHEMA_VERSION {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction().map_err(migrate_err)?;
    let mut applied = 0;
    for migration in all_migrations() {
        if migration.version <= stored {
            continue;
        }
        tracing::debug!(
            version = migration.version,
            description = migration.description,
            "applying memory schema migration"
        );
        (migration.up)(&tx).map_err(migrate_err)?;
        write_version(&tx, migration.version).map_err(migrate_err)?;
        applied += 1;
    }
    tx.commit().map_err(migrate_err)?;
    Ok(applied)
}

fn write_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO meta(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![schemas::META_KEY_SCHEMA_VERSION, version.to_string()],
    )?;
    Ok(())
}

fn migrate_v1_experiences(conn: &Connection) -> rusqlite::Result<()> {
    for stmt in schemas::v1_statements() {
        conn.execute_batch(stmt)?;
    }
    Ok(())
}

fn migrate_v2_agents_and_relationships(conn: &Connection) -> rusqlite::Result<()> {
    for stmt in schemas::v2_statements() {
        conn.execute_batch(stmt)?;
    }
    conn.execute(
        "INSERT OR IGNORE INTO agents(agent_id, first_seen, last_active, experience_count)
         SELECT agent_id, MIN(timestamp), MAX(timestamp), COUNT(*)
         FROM experiences GROUP BY agent_id",
        [],
    )?;
    Ok(())
}
