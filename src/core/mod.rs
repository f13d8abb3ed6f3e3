//! Shared primitives: errors, configuration, database open and schema
//! evolution, timestamps, and the audit log.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod schemas;
pub mod time;
