//! Authorization URL assembly

use std::sync::Arc;

use varco_core::{AuthorizeUrlListener, AuthorizeUrlRequest, IdpSettings, Result};

/// Builds the IdP authorization-endpoint URL from settings, a fresh state
/// token and the request parameters, then runs the post-build listeners.
pub struct AuthorizationUrlBuilder {
    settings: Arc<IdpSettings>,
    listeners: Vec<Arc<dyn AuthorizeUrlListener>>,
}

impl AuthorizationUrlBuilder {
    pub fn new(settings: Arc<IdpSettings>) -> Self {
        Self {
            settings,
            listeners: vec![],
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn AuthorizeUrlListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(&self, request: &AuthorizeUrlRequest) -> Result<String> {
        self.settings.ensure_complete()?;

        // NON-STANDARD: this IdP's API contract requires the client secret
        // as an authorization query parameter. Deployment docs flag the
        // leakage risk; do not copy this pattern elsewhere.
        let mut params: Vec<(String, String)> = vec![
            ("agEntityId".into(), self.settings.entity_id.clone()),
            ("client_id".into(), self.settings.client_id.clone()),
            ("client_secret".into(), self.settings.client_secret.clone()),
            ("redirect_uri".into(), self.settings.redirect_uri.clone()),
            ("response_type".into(), "code".into()),
            ("scope".into(), self.settings.scope.clone()),
            ("state".into(), request.state.clone()),
        ];

        if let Some(nonce) = &request.nonce {
            params.push(("nonce".into(), nonce.clone()));
        }
        if request.prompt_none {
            params.push(("prompt".into(), "none".into()));
        }

        for listener in &self.listeners {
            listener.post_build(&mut params);
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("{}?{}", self.settings.authorize_endpoint(), query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use varco_core::Environment;

    fn settings() -> IdpSettings {
        IdpSettings {
            enabled: true,
            environment: Environment::Staging,
            staging_url: "https://id.staging.comune.test".to_string(),
            production_url: "https://id.comune.test".to_string(),
            auth_path: "oauth2/authorize".to_string(),
            token_path: "oauth2/token".to_string(),
            userinfo_path: "oauth2/userinfo".to_string(),
            logout_path: "oidc/logout".to_string(),
            jwks_path: "oauth2/jwks".to_string(),
            client_id: "portal".to_string(),
            client_secret: "s3cret".to_string(),
            scope: "openid".to_string(),
            entity_id: "comune-test".to_string(),
            redirect_uri: "https://portal.comune.test/callback".to_string(),
            skip_tls_verify: false,
        }
    }

    struct ExtraParam;

    impl AuthorizeUrlListener for ExtraParam {
        fn post_build(&self, params: &mut Vec<(String, String)>) {
            params.push(("ui_locale".into(), "it".into()));
        }
    }

    #[test]
    fn test_build_includes_required_params() {
        let builder = AuthorizationUrlBuilder::new(Arc::new(settings()));
        let url = builder
            .build(&AuthorizeUrlRequest {
                state: "abc123".to_string(),
                nonce: None,
                prompt_none: false,
            })
            .unwrap();

        assert!(url.starts_with("https://id.staging.comune.test/oauth2/authorize?"));
        assert!(url.contains("agEntityId=comune-test"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fportal.comune.test%2Fcallback"));
        assert!(!url.contains("prompt=none"));
    }

    #[test]
    fn test_prompt_none_and_nonce_for_silent_probe() {
        let builder = AuthorizationUrlBuilder::new(Arc::new(settings()));
        let url = builder
            .build(&AuthorizeUrlRequest {
                state: "abc123".to_string(),
                nonce: Some("n0nce".to_string()),
                prompt_none: true,
            })
            .unwrap();

        assert!(url.contains("prompt=none"));
        assert!(url.contains("nonce=n0nce"));
    }

    #[test]
    fn test_post_build_listener_runs() {
        let builder =
            AuthorizationUrlBuilder::new(Arc::new(settings())).with_listener(Arc::new(ExtraParam));
        let url = builder
            .build(&AuthorizeUrlRequest {
                state: "s".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert!(url.ends_with("ui_locale=it"));
    }

    #[test]
    fn test_incomplete_settings_rejected() {
        let mut s = settings();
        s.entity_id = String::new();
        let builder = AuthorizationUrlBuilder::new(Arc::new(s));
        assert!(builder
            .build(&AuthorizeUrlRequest {
                state: "s".to_string(),
                ..Default::default()
            })
            .is_err());
    }
}
