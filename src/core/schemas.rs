//! Schema definitions for the experience memory database.
//!
//! The database is a single SQLite file. Experiences are the node table,
//! `relationships` carries the optional typed edges between them, and
//! `meta` records which migrations have been applied.

pub const MEMORY_DB_NAME: &str = "memory.db";
pub const MEMORY_EVENTS_NAME: &str = "memory.events.jsonl";

/// Highest schema version this crate knows how to read and write.
pub const MEMORY_SCHEMA_VERSION: u32 = 2;

pub const META_KEY_SCHEMA_VERSION: &str = "schema_version";

pub const MEMORY_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

// --- v1: experience nodes ---

pub const MEMORY_DB_SCHEMA_EXPERIENCES: &str = "
    CREATE TABLE IF NOT EXISTS experiences (
        id TEXT PRIMARY KEY,
        agent_id TEXT NOT NULL,
        context TEXT NOT NULL,
        action TEXT NOT NULL,
        outcome TEXT NOT NULL,
        timestamp INTEGER NOT NULL, -- microseconds since the unix epoch, UTC
        importance INTEGER NOT NULL CHECK (importance BETWEEN 1 AND 10),
        tags TEXT NOT NULL DEFAULT '[]', -- JSON array, caller order preserved
        metadata TEXT -- JSON value or NULL
    )
";

pub const MEMORY_DB_SCHEMA_EXPERIENCE_TAGS: &str = "
    CREATE TABLE IF NOT EXISTS experience_tags (
        experience_id TEXT NOT NULL,
        tag TEXT NOT NULL,
        PRIMARY KEY (experience_id, tag),
        FOREIGN KEY(experience_id) REFERENCES experiences(id)
    )
";

pub const MEMORY_DB_INDEX_EXPERIENCES_AGENT: &str =
    "CREATE INDEX IF NOT EXISTS idx_experiences_agent ON experiences(agent_id)";
pub const MEMORY_DB_INDEX_EXPERIENCES_AGENT_TS: &str =
    "CREATE INDEX IF NOT EXISTS idx_experiences_agent_ts ON experiences(agent_id, timestamp)";
pub const MEMORY_DB_INDEX_EXPERIENCES_AGENT_IMPORTANCE: &str = "CREATE INDEX IF NOT EXISTS idx_experiences_agent_importance ON experiences(agent_id, importance)";
pub const MEMORY_DB_INDEX_TAGS_TAG: &str =
    "CREATE INDEX IF NOT EXISTS idx_experience_tags_tag ON experience_tags(tag)";

// --- v2: agent nodes and relationship edges ---

pub const MEMORY_DB_SCHEMA_AGENTS: &str = "
    CREATE TABLE IF NOT EXISTS agents (
        agent_id TEXT PRIMARY KEY,
        first_seen INTEGER NOT NULL,
        last_active INTEGER NOT NULL,
        experience_count INTEGER NOT NULL DEFAULT 0
    )
";

pub const MEMORY_DB_SCHEMA_RELATIONSHIPS: &str = "
    CREATE TABLE IF NOT EXISTS relationships (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        kind TEXT NOT NULL, -- FOLLOWED_BY, SIMILAR_TO
        created_at INTEGER NOT NULL,
        UNIQUE(source_id, target_id, kind),
        FOREIGN KEY(source_id) REFERENCES experiences(id),
        FOREIGN KEY(target_id) REFERENCES experiences(id)
    )
";

pub const MEMORY_DB_INDEX_RELATIONSHIPS_SOURCE: &str =
    "CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id, kind)";
pub const MEMORY_DB_INDEX_RELATIONSHIPS_TARGET: &str =
    "CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id, kind)";

/// Column list every experience SELECT uses, in the order `Experience::from_row` reads.
pub const EXPERIENCE_COLUMNS: &str =
    "id, agent_id, context, action, outcome, timestamp, importance, tags, metadata";

pub fn v1_statements() -> &'static [&'static str] {
    &[
        MEMORY_DB_SCHEMA_EXPERIENCES,
        MEMORY_DB_SCHEMA_EXPERIENCE_TAGS,
        MEMORY_DB_INDEX_EXPERIENCES_AGENT,
        MEMORY_DB_INDEX_EXPERIENCES_AGENT_TS,
        MEMORY_DB_INDEX_EXPERIENCES_AGENT_IMPORTANCE,
        MEMORY_DB_INDEX_TAGS_TAG,
    ]
}

pub fn v2_statements() -> &'static [&'static str] {
    &[
        MEMORY_DB_SCHEMA_AGENTS,
        MEMORY_DB_SCHEMA_RELATIONSHIPS,
        MEMORY_DB_INDEX_RELATIONSHIPS_SOURCE,
        MEMORY_DB_INDEX_RELATIONSHIPS_TARGET,
    ]
}
