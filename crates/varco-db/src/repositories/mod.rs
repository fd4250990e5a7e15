//! PostgreSQL repository implementations

mod kv;
mod session;
mod user;

pub use kv::PgKeyValueStore;
pub use session::PgSessionStore;
pub use user::{PgIdentityLinkStore, PgUserStore};
