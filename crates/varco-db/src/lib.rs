//! Varco DB - storage implementations
//!
//! PostgreSQL repositories for the core storage traits, the connection
//! pool helper, and in-memory doubles used by tests across the
//! workspace.

pub mod memory;
pub mod migrations;
pub mod pool;
pub mod repositories;

pub use memory::{
    memory_stores, MemoryIdentityLinkStore, MemoryKeyValueStore, MemorySessionStore,
    MemoryUserStore,
};
pub use migrations::run_migrations;
pub use pool::{create_pool, DatabaseConfig};
pub use repositories::{PgIdentityLinkStore, PgKeyValueStore, PgSessionStore, PgUserStore};
