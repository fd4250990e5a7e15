//! Token-endpoint client

use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use varco_core::{IdpSettings, Result, TokenBundle, VarcoError};

use crate::client::HttpClient;

const SERVICE: &str = "idp-token";
const DEFAULT_EXPIRY_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct Wso2TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

/// Exchanges authorization codes and refresh tokens at the IdP token
/// endpoint. Failures are terminal for the calling flow; codes are
/// single-use, so nothing here retries.
pub struct TokenExchangeClient {
    settings: Arc<IdpSettings>,
    http: HttpClient,
}

impl TokenExchangeClient {
    pub fn new(settings: Arc<IdpSettings>, http: HttpClient) -> Self {
        Self { settings, http }
    }

    #[instrument(skip(self, code))]
    pub async fn exchange(&self, code: &str) -> Result<TokenBundle> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];

        self.post_token(&params).await
    }

    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];

        self.post_token(&params).await
    }

    async fn post_token(&self, params: &[(&str, &str)]) -> Result<TokenBundle> {
        let endpoint = self.settings.token_endpoint();
        debug!(endpoint = %endpoint, "Requesting tokens");

        let response = self
            .http
            .inner()
            .post(&endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| VarcoError::upstream(SERVICE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VarcoError::upstream(
                SERVICE,
                format!("token endpoint returned HTTP {status}"),
            ));
        }

        let parsed: Wso2TokenResponse = response
            .json()
            .await
            .map_err(|e| VarcoError::malformed(SERVICE, e.to_string()))?;

        let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRY_SECS);
        Ok(TokenBundle {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            id_token: parsed.id_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_parsing() {
        let body = r#"{
            "access_token": "at",
            "token_type": "Bearer",
            "expires_in": 1200,
            "refresh_token": "rt",
            "id_token": "idt",
            "scope": "openid"
        }"#;
        let parsed: Wso2TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.access_token, "at");
        assert_eq!(parsed.expires_in, Some(1200));
        assert_eq!(parsed.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn test_token_response_minimal() {
        let parsed: Wso2TokenResponse =
            serde_json::from_str(r#"{"access_token": "at"}"#).unwrap();
        assert_eq!(parsed.access_token, "at");
        assert!(parsed.expires_in.is_none());
        assert!(parsed.id_token.is_none());
    }
}
