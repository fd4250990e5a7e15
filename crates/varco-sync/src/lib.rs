//! Varco Sync - citizen-profile reconciliation
//!
//! Separate from the login flow: triggered by navigation to protected
//! routes, pulls profile fields from the downstream citizen-data API
//! through a client-credentials service token, and merges changes into
//! the local account. Throttled per user through the durable key-value
//! store.

pub mod engine;
pub mod profile_api;

pub use engine::ProfileSyncEngine;
pub use profile_api::{
    ApiManagerTokenClient, CitizenProfile, CitizenProfileApi, HttpCitizenProfileApi,
    ServiceTokenProvider,
};
