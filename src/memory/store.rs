//! The read/write surface over experience records.
//!
//! Every operation takes the owning `agent_id` and never returns another
//! agent's rows. Input problems fail with `ValidationError` before anything
//! touches the database; engine failures come back as `StorageError`
//! (writes) or `QueryError` (reads). Nothing is retried here.

use crate::core::error::{MemoryError, MemoryResult};
use crate::core::schemas::EXPERIENCE_COLUMNS;
use crate::core::time;
use crate::memory::connector::MemoryConnector;
use crate::memory::experience::{
    AgentRecord, Experience, ExperienceStats, NewExperience, RelationKind, RetrieveOptions,
    ScoredExperience, require_non_empty, validate_limit,
};
use crate::memory::query::sql_limit;
use crate::memory::similarity::SimilarityQuery;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::collections::{BTreeMap, HashMap};
use ulid::Ulid;

pub struct ExperienceStore<'c> {
    connector: &'c MemoryConnector,
}

impl<'c> ExperienceStore<'c> {
    pub fn new(connector: &'c MemoryConnector) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &'c MemoryConnector {
        self.connector
    }

    /// Validate and append one experience. Returns the new id.
    ///
    /// In the same transaction the agent's previous newest experience gets a
    /// `FOLLOWED_BY` edge to the new one and the agent record is upserted.
    pub fn store(&self, new: NewExperience) -> MemoryResult<String> {
        new.validate()?;

        let id = Ulid::new().to_string();
        let ts = time::to_micros(self.connector.now());
        let tags_json = serde_json::to_string(&new.tags)?;
        let metadata_json = new
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.connector
            .with_write("store", Some(&new.agent_id), |conn| {
                let tx = conn.unchecked_transaction()?;

                let previous: Option<String> = tx
                    .query_row(
                        "SELECT id FROM experiences WHERE agent_id = ?1
                         ORDER BY timestamp DESC, id DESC LIMIT 1",
                        params![new.agent_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                tx.execute(
                    "INSERT INTO experiences(id, agent_id, context, action, outcome, timestamp, importance, tags, metadata)
                     VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        id,
                        new.agent_id,
                        new.context,
                        new.action,
                        new.outcome,
                        ts,
                        i64::from(new.importance),
                        tags_json,
                        metadata_json
                    ],
                )?;

                for tag in &new.tags {
                    tx.execute(
                        "INSERT OR IGNORE INTO experience_tags(experience_id, tag) VALUES(?1, ?2)",
                        params![id, tag],
                    )?;
                }

                if let Some(prev) = previous {
                    insert_relationship(&tx, &prev, &id, RelationKind::FollowedBy, ts)?;
                }

                tx.execute(
                    "INSERT INTO agents(agent_id, first_seen, last_active, experience_count)
                     VALUES(?1, ?2, ?2, 1)
                     ON CONFLICT(agent_id) DO UPDATE SET
                        last_active = MAX(last_active, excluded.last_active),
                        experience_count = experience_count + 1",
                    params![new.agent_id, ts],
                )?;

                tx.commit()
            })?;

        tracing::debug!(agent_id = %new.agent_id, id = %id, importance = new.importance, "stored experience");
        Ok(id)
    }

    /// Newest-first experiences matching every filter in `options`.
    /// Ties on timestamp are broken by id, descending.
    pub fn retrieve(
        &self,
        agent_id: &str,
        options: RetrieveOptions,
    ) -> MemoryResult<Vec<Experience>> {
        require_non_empty("agent_id", agent_id)?;
        options.validate()?;

        let mut sql = format!(
            "SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE agent_id = ?1 AND importance >= ?2"
        );
        let mut bind: Vec<Value> = vec![
            Value::Text(agent_id.to_string()),
            Value::Integer(i64::from(options.min_importance)),
        ];

        if let Some(since) = options.since {
            // Stored values are whole micros; rounding `since` up keeps the
            // bound inclusive without admitting anything earlier than it.
            bind.push(Value::Integer(time::to_micros_ceil(since)));
            sql.push_str(&format!(" AND timestamp >= ?{}", bind.len()));
        }

        let mut wanted: Vec<&str> = options.tags.iter().map(String::as_str).collect();
        wanted.sort_unstable();
        wanted.dedup();
        if !wanted.is_empty() {
            let first = bind.len() + 1;
            let placeholders = (first..first + wanted.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            bind.extend(wanted.iter().map(|t| Value::Text(t.to_string())));
            bind.push(sql_limit(wanted.len()));
            sql.push_str(&format!(
                " AND id IN (SELECT experience_id FROM experience_tags WHERE tag IN ({placeholders})
                   GROUP BY experience_id HAVING COUNT(DISTINCT tag) = ?{})",
                bind.len()
            ));
        }

        bind.push(sql_limit(options.limit));
        sql.push_str(&format!(
            " ORDER BY timestamp DESC, id DESC LIMIT ?{}",
            bind.len()
        ));

        self.connector.with_read("retrieve", Some(agent_id), |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bind.iter()), Experience::from_row)?;
            rows.collect()
        })
    }

    /// Shorthand for `retrieve` with only a limit.
    pub fn recent(&self, agent_id: &str, limit: usize) -> MemoryResult<Vec<Experience>> {
        self.retrieve(agent_id, RetrieveOptions::default().limit(limit))
    }

    /// Up to `limit` experiences whose context overlaps `context` textually,
    /// most relevant first.
    pub fn find_similar(
        &self,
        agent_id: &str,
        context: &str,
        limit: usize,
    ) -> MemoryResult<Vec<Experience>> {
        Ok(self
            .find_similar_scored(agent_id, context, limit)?
            .into_iter()
            .map(|scored| scored.experience)
            .collect())
    }

    /// `find_similar` with relevance scores. Ties rank newer first, then by id.
    pub fn find_similar_scored(
        &self,
        agent_id: &str,
        context: &str,
        limit: usize,
    ) -> MemoryResult<Vec<ScoredExperience>> {
        require_non_empty("agent_id", agent_id)?;
        require_non_empty("context", context)?;
        validate_limit(limit)?;

        let query = SimilarityQuery::new(context);

        self.connector.with_read("find_similar", Some(agent_id), |conn| {
            // Score on the light columns first, load full rows only for the winners.
            let mut stmt = conn.prepare(
                "SELECT id, context, timestamp FROM experiences WHERE agent_id = ?1",
            )?;
            let candidates = stmt.query_map(params![agent_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;

            let mut ranked: Vec<(String, i64, f64)> = Vec::new();
            for candidate in candidates {
                let (id, text, ts) = candidate?;
                let relevance = query.score(&text);
                if relevance > 0.0 {
                    ranked.push((id, ts, relevance));
                }
            }
            ranked.sort_by(|a, b| {
                b.2.total_cmp(&a.2)
                    .then_with(|| b.1.cmp(&a.1))
                    .then_with(|| b.0.cmp(&a.0))
            });
            ranked.truncate(limit);

            if ranked.is_empty() {
                return Ok(Vec::new());
            }

            let mut by_id = load_by_ids(conn, agent_id, ranked.iter().map(|r| r.0.as_str()))?;
            Ok(ranked
                .into_iter()
                .filter_map(|(id, _, relevance)| {
                    by_id.remove(&id).map(|experience| ScoredExperience {
                        experience,
                        relevance,
                    })
                })
                .collect())
        })
    }

    /// Aggregates over the agent's experiences. An unknown agent yields
    /// `ExperienceStats::empty`.
    pub fn get_stats(&self, agent_id: &str) -> MemoryResult<ExperienceStats> {
        require_non_empty("agent_id", agent_id)?;

        self.connector.with_read("get_stats", Some(agent_id), |conn| {
            let (count, avg, oldest, newest): (i64, Option<f64>, Option<i64>, Option<i64>) = conn
                .query_row(
                    "SELECT COUNT(*), AVG(importance), MIN(timestamp), MAX(timestamp)
                     FROM experiences WHERE agent_id = ?1",
                    params![agent_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )?;

            if count == 0 {
                return Ok(ExperienceStats::empty(agent_id));
            }

            let mut stmt = conn.prepare(
                "SELECT t.tag, COUNT(*) FROM experience_tags t
                 JOIN experiences e ON e.id = t.experience_id
                 WHERE e.agent_id = ?1
                 GROUP BY t.tag",
            )?;
            let mut tag_counts = BTreeMap::new();
            let rows = stmt.query_map(params![agent_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for r in rows {
                let (tag, n) = r?;
                tag_counts.insert(tag, u64::try_from(n).unwrap_or(0));
            }

            Ok(ExperienceStats {
                agent_id: agent_id.to_string(),
                total_count: u64::try_from(count).unwrap_or(0),
                avg_importance: avg.unwrap_or(0.0),
                oldest: oldest.map(micros_to_ts).transpose()?,
                newest: newest.map(micros_to_ts).transpose()?,
                tag_counts,
            })
        })
    }

    /// One experience by id, only if it belongs to `agent_id`.
    pub fn get(&self, agent_id: &str, id: &str) -> MemoryResult<Option<Experience>> {
        require_non_empty("agent_id", agent_id)?;
        self.connector.with_read("get", Some(agent_id), |conn| {
            conn.query_row(
                &format!("SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE agent_id = ?1 AND id = ?2"),
                params![agent_id, id],
                Experience::from_row,
            )
            .optional()
        })
    }

    pub fn agent_info(&self, agent_id: &str) -> MemoryResult<Option<AgentRecord>> {
        require_non_empty("agent_id", agent_id)?;
        self.connector.with_read("agent_info", Some(agent_id), |conn| {
            conn.query_row(
                "SELECT agent_id, first_seen, last_active, experience_count
                 FROM agents WHERE agent_id = ?1",
                params![agent_id],
                |row| {
                    Ok(AgentRecord {
                        agent_id: row.get(0)?,
                        first_seen: micros_to_ts(row.get(1)?)?,
                        last_active: micros_to_ts(row.get(2)?)?,
                        experience_count: u64::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
                    })
                },
            )
            .optional()
        })
    }

    /// Mark two of the agent's experiences as similar, in both directions.
    /// Returns `false` when the link already existed.
    pub fn link_similar(&self, agent_id: &str, a: &str, b: &str) -> MemoryResult<bool> {
        require_non_empty("agent_id", agent_id)?;
        if a == b {
            return Err(MemoryError::ValidationError(
                "cannot link an experience to itself".to_string(),
            ));
        }

        let owned: i64 = self.connector.with_read("link_similar", Some(agent_id), |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM experiences WHERE agent_id = ?1 AND id IN (?2, ?3)",
                params![agent_id, a, b],
                |row| row.get(0),
            )
        })?;
        if owned != 2 {
            return Err(MemoryError::ValidationError(format!(
                "both '{a}' and '{b}' must be experiences of agent '{agent_id}'"
            )));
        }

        let ts = time::to_micros(self.connector.now());
        self.connector
            .with_write("link_similar", Some(agent_id), |conn| {
                let tx = conn.unchecked_transaction()?;
                let forward = insert_relationship(&tx, a, b, RelationKind::SimilarTo, ts)?;
                let backward = insert_relationship(&tx, b, a, RelationKind::SimilarTo, ts)?;
                tx.commit()?;
                Ok(forward || backward)
            })
    }

    /// Experiences reachable from `id` over one `kind` edge, newest first.
    pub fn related(
        &self,
        agent_id: &str,
        id: &str,
        kind: RelationKind,
    ) -> MemoryResult<Vec<Experience>> {
        require_non_empty("agent_id", agent_id)?;
        self.connector.with_read("related", Some(agent_id), |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EXPERIENCE_COLUMNS} FROM experiences
                 WHERE agent_id = ?1
                   AND id IN (SELECT target_id FROM relationships WHERE source_id = ?2 AND kind = ?3)
                 ORDER BY timestamp DESC, id DESC"
            ))?;
            let rows = stmt.query_map(params![agent_id, id, kind.as_str()], Experience::from_row)?;
            rows.collect()
        })
    }
}

fn insert_relationship(
    conn: &Connection,
    source: &str,
    target: &str,
    kind: RelationKind,
    ts: i64,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO relationships(id, source_id, target_id, kind, created_at)
         VALUES(?1, ?2, ?3, ?4, ?5)",
        params![Ulid::new().to_string(), source, target, kind.as_str(), ts],
    )?;
    Ok(changed > 0)
}

/// Ids bound per `IN (...)` lookup. Well under SQLite's host-parameter limit,
/// which is 32766 on current builds and 999 on old ones.
const LOAD_CHUNK: usize = 500;

fn load_by_ids<'a>(
    conn: &Connection,
    agent_id: &str,
    ids: impl Iterator<Item = &'a str>,
) -> rusqlite::Result<HashMap<String, Experience>> {
    let ids: Vec<&str> = ids.collect();
    let mut out = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(LOAD_CHUNK) {
        let mut bind = Vec::with_capacity(chunk.len() + 1);
        bind.push(Value::Text(agent_id.to_string()));
        bind.extend(chunk.iter().map(|id| Value::Text(id.to_string())));
        let placeholders = (2..=bind.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXPERIENCE_COLUMNS} FROM experiences WHERE agent_id = ?1 AND id IN ({placeholders})"
        ))?;
        let rows = stmt.query_map(params_from_iter(bind.iter()), Experience::from_row)?;
        for r in rows {
            let exp = r?;
            out.insert(exp.id.clone(), exp);
        }
    }
    Ok(out)
}

fn micros_to_ts(micros: i64) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    time::from_micros(micros).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, micros))
}
