//! Downstream citizen-profile API and its service token

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use varco_core::{Result, SyncSettings, VarcoError};
use varco_oauth::HttpClient;

const TOKEN_SERVICE: &str = "api-manager-token";
const PROFILE_SERVICE: &str = "citizen-profile";

/// Margin subtracted from the token lifetime before a refresh is forced
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Business payload of `GET /profile/{fiscalCode}`
#[derive(Debug, Clone, Deserialize)]
pub struct CitizenProfile {
    pub esito: String,
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub cognome: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub cellulare: Option<String>,
}

impl CitizenProfile {
    /// A transport-level 200 can still carry a business failure
    pub fn is_success(&self) -> bool {
        self.esito == "SUCCESS"
    }
}

/// Service-to-service token source for the profile API
#[async_trait]
pub trait ServiceTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Fetches one citizen profile by fiscal code
#[async_trait]
pub trait CitizenProfileApi: Send + Sync {
    async fn fetch(&self, fiscal_code: &str, bearer: &str) -> Result<CitizenProfile>;
}

#[derive(Debug, Deserialize)]
struct ClientCredentialsResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Client-credentials grant against the API-manager token endpoint.
///
/// These are the gateway's own credentials, distinct from the citizen
/// OAuth2 client. The token is cached until shortly before expiry so
/// repeated sync triggers don't hammer the endpoint.
pub struct ApiManagerTokenClient {
    settings: SyncSettings,
    http: HttpClient,
    cached: RwLock<Option<CachedToken>>,
}

impl ApiManagerTokenClient {
    pub fn new(settings: SyncSettings, http: HttpClient) -> Self {
        Self {
            settings,
            http,
            cached: RwLock::new(None),
        }
    }
}

#[async_trait]
impl ServiceTokenProvider for ApiManagerTokenClient {
    #[instrument(skip(self))]
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.expires_at > Utc::now() {
                    return Ok(entry.token.clone());
                }
            }
        }

        debug!(endpoint = %self.settings.token_url, "Requesting service token");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.settings.api_client_id.as_str()),
            ("client_secret", self.settings.api_client_secret.as_str()),
        ];

        let response = self
            .http
            .inner()
            .post(&self.settings.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| VarcoError::upstream(TOKEN_SERVICE, e.to_string()))?;

        if !response.status().is_success() {
            return Err(VarcoError::upstream(
                TOKEN_SERVICE,
                format!("token endpoint returned HTTP {}", response.status()),
            ));
        }

        let parsed: ClientCredentialsResponse = response
            .json()
            .await
            .map_err(|e| VarcoError::malformed(TOKEN_SERVICE, e.to_string()))?;

        let lifetime = parsed.expires_in.unwrap_or(3600) - TOKEN_EXPIRY_MARGIN_SECS;
        let mut cached = self.cached.write().await;
        *cached = Some(CachedToken {
            token: parsed.access_token.clone(),
            expires_at: Utc::now() + Duration::seconds(lifetime.max(0)),
        });

        Ok(parsed.access_token)
    }
}

/// HTTP implementation of the profile API contract
pub struct HttpCitizenProfileApi {
    base_url: String,
    http: HttpClient,
}

impl HttpCitizenProfileApi {
    pub fn new(base_url: impl Into<String>, http: HttpClient) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }
}

#[async_trait]
impl CitizenProfileApi for HttpCitizenProfileApi {
    #[instrument(skip(self, bearer))]
    async fn fetch(&self, fiscal_code: &str, bearer: &str) -> Result<CitizenProfile> {
        let url = format!(
            "{}/profile/{}",
            self.base_url.trim_end_matches('/'),
            fiscal_code
        );

        let response = self
            .http
            .inner()
            .get(&url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| VarcoError::upstream(PROFILE_SERVICE, e.to_string()))?;

        if !response.status().is_success() {
            return Err(VarcoError::upstream(
                PROFILE_SERVICE,
                format!("profile endpoint returned HTTP {}", response.status()),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| VarcoError::malformed(PROFILE_SERVICE, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_parsing() {
        let body = r#"{
            "esito": "SUCCESS",
            "nome": "Mario",
            "cognome": "Rossi",
            "email": "m.rossi@example.it",
            "cellulare": "+39333000000"
        }"#;
        let profile: CitizenProfile = serde_json::from_str(body).unwrap();
        assert!(profile.is_success());
        assert_eq!(profile.nome.as_deref(), Some("Mario"));
    }

    #[test]
    fn test_business_failure_detected() {
        let profile: CitizenProfile =
            serde_json::from_str(r#"{"esito": "NOT_FOUND"}"#).unwrap();
        assert!(!profile.is_success());
        assert!(profile.nome.is_none());
    }
}
