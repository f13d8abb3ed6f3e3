//! amplihack-memory: experience-based memory for coding agents.
//!
//! An agent records what it saw, what it did, and what happened
//! (context / action / outcome), then recalls those experiences by recency,
//! importance, tags, or textual similarity. Records live in one embedded
//! SQLite file and are append-only.
//!
//! # Architecture
//!
//! - **MemoryConnector**: owns the connection to the database file
//!   (connect → verify → close, or `scoped` for guaranteed release)
//! - **ExperienceStore**: validation, writes, and agent-scoped queries over a
//!   borrowed connector; no process-wide state
//! - **QueryBuilder**: pure SQL generation for callers that need custom reads
//!
//! Every query is scoped by `agent_id`. The API is synchronous and blocks on
//! disk I/O; wrap it in your own thread pool if you need parallelism.
//!
//! # Example
//!
//! ```rust,no_run
//! use amplihack_memory::{ExperienceStore, MemoryConnector, NewExperience, RetrieveOptions};
//!
//! # fn main() -> Result<(), amplihack_memory::MemoryError> {
//! let connector = MemoryConnector::open("memory.db")?;
//! let store = ExperienceStore::new(&connector);
//!
//! store.store(
//!     NewExperience::new("agent1", "user asked for file list", "ran ls", "returned 12 files")
//!         .importance(6)
//!         .tags(["fs"]),
//! )?;
//!
//! let recent = store.retrieve("agent1", RetrieveOptions::default().limit(5))?;
//! assert_eq!(recent[0].action, "ran ls");
//! # Ok(())
//! # }
//! ```
//!
//! # Crate Structure
//!
//! - [`crate::core`]: errors, configuration, database open, schema and migrations, audit log
//! - [`crate::memory`]: connector, experience model, store, similarity, query builder

pub mod core;
pub mod memory;

pub use crate::core::config::MemoryConfig;
pub use crate::core::error::{ErrorKind, MemoryError, MemoryResult};
pub use crate::memory::connector::MemoryConnector;
pub use crate::memory::experience::{
    AgentRecord, Experience, ExperienceStats, NewExperience, RelationKind, RetrieveOptions,
    ScoredExperience,
};
pub use crate::memory::query::{BuiltQuery, QueryBuilder};
pub use crate::memory::store::ExperienceStore;
