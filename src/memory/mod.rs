//! Experience memory: the connector, the store, and query helpers.

pub mod connector;
pub mod experience;
pub mod query;
pub mod similarity;
pub mod store;
