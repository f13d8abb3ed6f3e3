//! Parameterized SQL for common access patterns, for callers who need more
//! than the `ExperienceStore` API offers.
//!
//! Every query selects `schemas::EXPERIENCE_COLUMNS` and is scoped by
//! `agent_id`, so results can be fed to `MemoryConnector::query_experiences`
//! or executed on a raw `rusqlite::Connection` and mapped with
//! `Experience::from_row`.

use crate::core::schemas::EXPERIENCE_COLUMNS;
use rusqlite::types::Value;

/// SQL text plus positional bindings (`?1`, `?2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Stateless; every method is a pure function of its arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    /// Newest experiences carrying `tag`.
    pub fn recent_by_tag(agent_id: &str, tag: &str, limit: usize) -> BuiltQuery {
        BuiltQuery {
            sql: format!(
                "SELECT {EXPERIENCE_COLUMNS} FROM experiences
                 WHERE agent_id = ?1
                   AND id IN (SELECT experience_id FROM experience_tags WHERE tag = ?2)
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?3"
            ),
            params: vec![text(agent_id), text(tag), sql_limit(limit)],
        }
    }

    /// Experiences at or above `min_importance`, most important first, then newest.
    pub fn high_importance(agent_id: &str, min_importance: u8, limit: usize) -> BuiltQuery {
        BuiltQuery {
            sql: format!(
                "SELECT {EXPERIENCE_COLUMNS} FROM experiences
                 WHERE agent_id = ?1 AND importance >= ?2
                 ORDER BY importance DESC, timestamp DESC, id DESC
                 LIMIT ?3"
            ),
            params: vec![
                text(agent_id),
                Value::Integer(i64::from(min_importance)),
                sql_limit(limit),
            ],
        }
    }

    /// Case-insensitive substring match on `context`. `%` and `_` in
    /// `keyword` match literally.
    pub fn context_keyword(agent_id: &str, keyword: &str, limit: usize) -> BuiltQuery {
        BuiltQuery {
            sql: format!(
                "SELECT {EXPERIENCE_COLUMNS} FROM experiences
                 WHERE agent_id = ?1 AND context LIKE ?2 ESCAPE '\\'
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?3"
            ),
            params: vec![text(agent_id), Value::Text(like_pattern(keyword)), sql_limit(limit)],
        }
    }
}

/// `%keyword%` with LIKE metacharacters escaped by `\`.
pub(crate) fn like_pattern(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len() + 2);
    out.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

pub(crate) fn sql_limit(limit: usize) -> Value {
    Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX))
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}
