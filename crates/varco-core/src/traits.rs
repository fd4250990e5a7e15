//! Service traits for the Varco gateway
//!
//! Every collaborator the authentication core depends on is injected
//! through one of these traits; there are no ambient singletons. The
//! listener traits are the explicit extension points invoked at the
//! documented spots of each flow.

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{SessionId, UserId};
use crate::models::{ClaimSet, LocalUser, NewUser, SessionData, TokenBundle};

// =============================================================================
// Storage Traits
// =============================================================================

/// Local user store
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<LocalUser>>;

    /// All users holding the given email; the reconciler treats more than
    /// one match as an ambiguity failure.
    async fn find_by_email(&self, email: &str) -> Result<Vec<LocalUser>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>>;

    async fn username_exists(&self, username: &str) -> Result<bool>;

    /// Create a user and its external identity link as one logical unit.
    /// Either both are committed or neither is.
    async fn create_linked(
        &self,
        user: &NewUser,
        provider: &str,
        authname: &str,
    ) -> Result<LocalUser>;

    async fn update(&self, user: &LocalUser) -> Result<LocalUser>;
}

/// External identity link store
#[async_trait]
pub trait IdentityLinkStore: Send + Sync {
    async fn find_user(&self, provider: &str, authname: &str) -> Result<Option<UserId>>;

    /// Associate an external identity with an existing local user
    async fn link(&self, provider: &str, authname: &str, user_id: UserId) -> Result<()>;
}

/// Durable key-value store, shared across worker processes.
///
/// Backs the per-user sync marks and any other cross-request flags.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Browser-session persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>>;
    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<()>;
    async fn delete(&self, id: &SessionId) -> Result<()>;
}

// =============================================================================
// IdP Gateway
// =============================================================================

/// Parameters for building an authorization URL
#[derive(Debug, Clone, Default)]
pub struct AuthorizeUrlRequest {
    pub state: String,
    pub nonce: Option<String>,
    /// Request non-interactive authentication (`prompt=none`), used by
    /// the silent session probe.
    pub prompt_none: bool,
}

/// Outbound operations against the identity provider
#[async_trait]
pub trait IdpGateway: Send + Sync {
    /// Fully qualified IdP authorization URL for the given request
    fn authorization_url(&self, request: &AuthorizeUrlRequest) -> Result<String>;

    /// IdP logout URL carrying `id_token_hint` and the post-logout return
    fn logout_url(&self, id_token_hint: Option<&str>, post_logout_redirect: &str) -> String;

    /// Exchange an authorization code for tokens. Codes are single-use;
    /// a failure is terminal for the flow, never retried.
    async fn exchange_code(&self, code: &str) -> Result<TokenBundle>;

    /// Exchange a refresh token for a fresh bundle
    async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle>;

    /// Fetch claims for an access token from the userinfo endpoint
    async fn fetch_userinfo(&self, access_token: &str) -> Result<ClaimSet>;
}

// =============================================================================
// Extension Points
// =============================================================================

/// Invoked after the authorization URL query is assembled, before the
/// URL is emitted
pub trait AuthorizeUrlListener: Send + Sync {
    fn post_build(&self, params: &mut Vec<(String, String)>);
}

/// Invoked after userinfo claims are fetched, before reconciliation
pub trait ClaimsListener: Send + Sync {
    fn post_fetch(&self, claims: &mut ClaimSet);
}

/// Invoked after a successful login is finalized
#[async_trait]
pub trait LoginListener: Send + Sync {
    async fn post_login(&self, user: &LocalUser, claims: &ClaimSet);
}
