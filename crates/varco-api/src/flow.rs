//! Login flow orchestration
//!
//! Drives one browser session through authorize-initiation and the
//! callback state machine. Every terminal failure resolves to the site
//! root with a generic marker; IdP error detail stays in the server log.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use varco_core::{AuthType, AuthorizeUrlRequest, IdpGateway, Result, SessionData};
use varco_identity::IdentityReconciler;
use varco_session::{SecureRedirectDispatcher, StateTokenStore};

/// Progress of one callback through its guards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackStage {
    AwaitCode,
    StateVerified,
    TokensExchanged,
    ClaimsFetched,
    IdentityReconciled,
}

/// Where the browser goes after the callback settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResolution {
    /// Login finalized; redirect to the validated destination
    Success { redirect_to: String },
    /// Generic failure; redirect to a safe default, never the original
    /// destination
    Failure { redirect_to: String },
}

impl CallbackResolution {
    pub fn redirect_to(&self) -> &str {
        match self {
            Self::Success { redirect_to } | Self::Failure { redirect_to } => redirect_to,
        }
    }
}

pub struct LoginFlow {
    gateway: Arc<dyn IdpGateway>,
    reconciler: Arc<IdentityReconciler>,
    redirects: Arc<SecureRedirectDispatcher>,
}

impl LoginFlow {
    pub fn new(
        gateway: Arc<dyn IdpGateway>,
        reconciler: Arc<IdentityReconciler>,
        redirects: Arc<SecureRedirectDispatcher>,
    ) -> Self {
        Self {
            gateway,
            reconciler,
            redirects,
        }
    }

    /// Begin an authorization flow: remember the destination, issue a
    /// fresh state token, and produce the IdP redirect URL.
    #[instrument(skip(self, session))]
    pub fn start_authorization(
        &self,
        session: &mut SessionData,
        destination: Option<&str>,
        auth_type: AuthType,
    ) -> Result<String> {
        if let Some(destination) = destination.filter(|d| !d.is_empty()) {
            session.destination = Some(destination.to_string());
        }
        session.auth_type = auth_type;

        let state = StateTokenStore::issue(session);
        let nonce = StateTokenStore::issue_nonce(session);

        self.gateway.authorization_url(&AuthorizeUrlRequest {
            state,
            nonce: Some(nonce),
            prompt_none: false,
        })
    }

    /// Run the callback state machine for one session.
    ///
    /// The state token is consumed before anything else is trusted; a
    /// replayed callback fails even with a valid code.
    #[instrument(skip(self, session, code, returned_state))]
    pub async fn handle_callback(
        &self,
        session: &mut SessionData,
        code: Option<&str>,
        returned_state: Option<&str>,
    ) -> CallbackResolution {
        let mut stage = CallbackStage::AwaitCode;

        let (code, returned_state) = match (
            code.filter(|c| !c.is_empty()),
            returned_state.filter(|s| !s.is_empty()),
        ) {
            (Some(code), Some(state)) => (code, state),
            _ => {
                warn!("Callback missing code or state");
                return self.fail(stage);
            }
        };

        if !StateTokenStore::verify(session, returned_state) {
            warn!("Callback state token rejected");
            return self.fail(stage);
        }
        stage = CallbackStage::StateVerified;
        debug!(stage = ?stage, "Callback advanced");

        let tokens = match self.gateway.exchange_code(code).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(stage = ?stage, error = %e, "Token exchange failed");
                return self.fail(stage);
            }
        };
        stage = CallbackStage::TokensExchanged;
        debug!(stage = ?stage, "Callback advanced");

        let claims = match self.gateway.fetch_userinfo(&tokens.access_token).await {
            Ok(claims) => claims,
            Err(e) => {
                warn!(stage = ?stage, error = %e, "Userinfo fetch failed");
                return self.fail(stage);
            }
        };
        stage = CallbackStage::ClaimsFetched;
        debug!(stage = ?stage, "Callback advanced");

        let login = match self.reconciler.reconcile(&claims).await {
            Ok(login) => login,
            Err(e) => {
                // No account state was changed by a failed reconciliation
                warn!(stage = ?stage, error = %e, "Identity reconciliation failed");
                return self.fail(stage);
            }
        };
        stage = CallbackStage::IdentityReconciled;
        debug!(stage = ?stage, "Callback advanced");

        // The destination is read exactly once, then gone
        let destination = session.take_destination().unwrap_or_default();
        let redirect_to = self.redirects.resolve(&destination, "/");

        session.tokens = Some(tokens);
        session.user = Some(login.user.id);
        session.check.redirect_started_at = None;

        info!(user_id = %login.user.id, method = ?login.method, "Callback completed");
        CallbackResolution::Success { redirect_to }
    }

    /// Refresh a near-expiry token bundle; on failure the session
    /// degrades to anonymous rather than erroring toward the caller.
    #[instrument(skip(self, session))]
    pub async fn refresh_tokens_if_needed(&self, session: &mut SessionData) -> Result<()> {
        let Some(tokens) = &session.tokens else {
            return Ok(());
        };
        if !tokens.expires_within(60) {
            return Ok(());
        }

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            if tokens.is_expired() {
                info!("Token bundle expired without refresh token, dropping identity");
                session.clear_identity();
            }
            return Ok(());
        };

        match self.gateway.refresh(&refresh_token).await {
            Ok(fresh) => {
                session.tokens = Some(fresh);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, dropping identity");
                session.clear_identity();
                Ok(())
            }
        }
    }

    /// IdP logout URL for the session being terminated
    pub fn logout_url(&self, session: &SessionData, post_logout_redirect: &str) -> String {
        let id_token = session
            .tokens
            .as_ref()
            .and_then(|t| t.id_token.as_deref());
        self.gateway.logout_url(id_token, post_logout_redirect)
    }

    fn fail(&self, stage: CallbackStage) -> CallbackResolution {
        info!(stage = ?stage, "Callback failed, redirecting to site root");
        CallbackResolution::Failure {
            redirect_to: self.redirects.resolve("", "/"),
        }
    }
}
