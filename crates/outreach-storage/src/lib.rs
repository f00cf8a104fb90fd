//! Outreach Storage - PostgreSQL and in-memory persistence
//!
//! Campaigns, their recipient rows, clients, templates and the send history.
//! Every table is reached through a repository trait with a PostgreSQL
//! implementation and a shared in-memory implementation.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
