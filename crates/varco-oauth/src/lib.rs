//! Varco OAuth - outbound clients for the WSO2 Identity Server
//!
//! Covers the authorization-code flow legs the gateway initiates:
//! building authorization URLs, exchanging codes and refresh tokens,
//! fetching userinfo claims, and validating ID tokens against the IdP
//! JWKS. All calls are bounded by explicit timeouts and never retried.

pub mod authorize;
pub mod client;
pub mod gateway;
pub mod jwks;
pub mod token;
pub mod userinfo;

pub use authorize::AuthorizationUrlBuilder;
pub use client::HttpClient;
pub use gateway::Wso2Gateway;
pub use jwks::{IdTokenValidator, JwksCache};
pub use token::TokenExchangeClient;
pub use userinfo::UserInfoClient;
