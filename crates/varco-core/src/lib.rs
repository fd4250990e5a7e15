//! Varco Core - shared types for the civic authentication gateway
//!
//! This crate defines the domain model (users, identity links, token
//! bundles, session state), the error taxonomy, the identity-provider
//! configuration, and the traits every service seam is injected through.

pub mod config;
pub mod error;
pub mod ids;
pub mod models;
pub mod traits;

pub use config::{
    ClaimMappings, Environment, IdpSettings, ProbeSettings, ReconcilerSettings, RedirectSettings,
    SyncSettings,
};
pub use error::{Result, VarcoError};
pub use ids::{SessionId, UserId};
pub use models::{
    AuthType, ClaimSet, IdentityLink, LocalUser, NewUser, ProfileFields, SessionCheckState,
    SessionData, TokenBundle, PROVIDER_NAME,
};
pub use traits::{
    AuthorizeUrlListener, AuthorizeUrlRequest, ClaimsListener, IdentityLinkStore, IdpGateway,
    KeyValueStore, LoginListener, SessionStore, UserStore,
};
