use crate::core::error::{MemoryError, MemoryResult};
use crate::core::time;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 10;
pub const DEFAULT_IMPORTANCE: u8 = 5;
pub const DEFAULT_RETRIEVE_LIMIT: usize = 10;

/// One stored context/action/outcome record. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub id: String,
    pub agent_id: String,
    pub context: String,
    pub action: String,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
    pub importance: u8,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

impl Experience {
    /// Map a row selected with `schemas::EXPERIENCE_COLUMNS`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let micros: i64 = row.get(5)?;
        let timestamp =
            time::from_micros(micros).ok_or(rusqlite::Error::IntegralValueOutOfRange(5, micros))?;

        let tags_raw: String = row.get(7)?;
        let tags: Vec<String> = serde_json::from_str(&tags_raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

        let metadata_raw: Option<String> = row.get(8)?;
        let metadata = metadata_raw
            .map(|raw| serde_json::from_str::<JsonValue>(&raw))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

        Ok(Experience {
            id: row.get(0)?,
            agent_id: row.get(1)?,
            context: row.get(2)?,
            action: row.get(3)?,
            outcome: row.get(4)?,
            timestamp,
            importance: row.get(6)?,
            tags,
            metadata,
        })
    }
}

/// Input for `ExperienceStore::store`.
///
/// ```rust,no_run
/// use amplihack_memory::NewExperience;
///
/// let exp = NewExperience::new("agent1", "user asked for file list", "ran ls", "returned 12 files")
///     .importance(6)
///     .tags(["fs"]);
/// assert!(exp.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewExperience {
    pub agent_id: String,
    pub context: String,
    pub action: String,
    pub outcome: String,
    pub importance: u8,
    pub tags: Vec<String>,
    pub metadata: Option<JsonValue>,
}

impl NewExperience {
    pub fn new(
        agent_id: impl Into<String>,
        context: impl Into<String>,
        action: impl Into<String>,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            context: context.into(),
            action: action.into(),
            outcome: outcome.into(),
            importance: DEFAULT_IMPORTANCE,
            tags: Vec::new(),
            metadata: None,
        }
    }

    pub fn importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn validate(&self) -> MemoryResult<()> {
        require_non_empty("agent_id", &self.agent_id)?;
        require_non_empty("context", &self.context)?;
        require_non_empty("action", &self.action)?;
        require_non_empty("outcome", &self.outcome)?;
        validate_importance("importance", self.importance)?;
        for (i, tag) in self.tags.iter().enumerate() {
            if tag.trim().is_empty() {
                return Err(MemoryError::ValidationError(format!(
                    "tags[{i}] must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Filters for `ExperienceStore::retrieve`. New fields are always added with
/// a default so existing callers keep compiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveOptions {
    /// Maximum number of results; must be at least 1.
    pub limit: usize,
    /// Inclusive lower bound on importance.
    pub min_importance: u8,
    /// Every tag listed here must be present on a result.
    pub tags: Vec<String>,
    /// Inclusive lower bound on timestamp.
    pub since: Option<DateTime<Utc>>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RETRIEVE_LIMIT,
            min_importance: MIN_IMPORTANCE,
            tags: Vec::new(),
            since: None,
        }
    }
}

impl RetrieveOptions {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn min_importance(mut self, min_importance: u8) -> Self {
        self.min_importance = min_importance;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn validate(&self) -> MemoryResult<()> {
        validate_limit(self.limit)?;
        validate_importance("min_importance", self.min_importance)?;
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(MemoryError::ValidationError(
                "tag filters must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Aggregate view over one agent's experiences, computed on demand.
///
/// An agent with no experiences has `total_count == 0`,
/// `avg_importance == 0.0` and no timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceStats {
    pub agent_id: String,
    pub total_count: u64,
    pub avg_importance: f64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Number of experiences carrying each tag.
    pub tag_counts: BTreeMap<String, u64>,
}

impl ExperienceStats {
    pub fn empty(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            total_count: 0,
            avg_importance: 0.0,
            oldest: None,
            newest: None,
            tag_counts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub experience_count: u64,
}

/// Typed edge between two experiences of the same agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Written automatically from an agent's previous newest experience to the next one.
    FollowedBy,
    SimilarTo,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::FollowedBy => "FOLLOWED_BY",
            RelationKind::SimilarTo => "SIMILAR_TO",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `find_similar` hit with its relevance in `(0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredExperience {
    pub experience: Experience,
    pub relevance: f64,
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> MemoryResult<()> {
    if value.trim().is_empty() {
        return Err(MemoryError::ValidationError(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

pub(crate) fn validate_importance(field: &str, value: u8) -> MemoryResult<()> {
    if !(MIN_IMPORTANCE..=MAX_IMPORTANCE).contains(&value) {
        return Err(MemoryError::ValidationError(format!(
            "{field} must be in [{MIN_IMPORTANCE}, {MAX_IMPORTANCE}], got {value}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_limit(limit: usize) -> MemoryResult<()> {
    if limit == 0 {
        return Err(MemoryError::ValidationError(
            "limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}
