//! Identity-provider configuration and environment resolution

use serde::{Deserialize, Serialize};

use crate::error::{Result, VarcoError};

/// Which IdP deployment the gateway talks to. Exactly one is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Staging,
    Production,
}

/// Stored settings for the WSO2 relying-party integration.
///
/// `client_secret` must never appear in logs or error messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_staging_url")]
    pub staging_url: String,
    #[serde(default = "default_production_url")]
    pub production_url: String,
    #[serde(default = "default_auth_path")]
    pub auth_path: String,
    #[serde(default = "default_token_path")]
    pub token_path: String,
    #[serde(default = "default_userinfo_path")]
    pub userinfo_path: String,
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    #[serde(default = "default_jwks_path")]
    pub jwks_path: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    pub entity_id: String,
    /// Callback URL registered with the IdP
    pub redirect_uri: String,
    /// Accept invalid TLS certificates. Honored outside production only.
    #[serde(default)]
    pub skip_tls_verify: bool,
}

impl IdpSettings {
    /// Base URL of the active environment
    pub fn base_url(&self) -> &str {
        match self.environment {
            Environment::Staging => &self.staging_url,
            Environment::Production => &self.production_url,
        }
    }

    pub fn authorize_endpoint(&self) -> String {
        join_url(self.base_url(), &self.auth_path)
    }

    pub fn token_endpoint(&self) -> String {
        join_url(self.base_url(), &self.token_path)
    }

    pub fn userinfo_endpoint(&self) -> String {
        join_url(self.base_url(), &self.userinfo_path)
    }

    pub fn logout_endpoint(&self) -> String {
        join_url(self.base_url(), &self.logout_path)
    }

    pub fn jwks_endpoint(&self) -> String {
        join_url(self.base_url(), &self.jwks_path)
    }

    /// TLS verification is only ever skipped outside production
    pub fn accept_invalid_certs(&self) -> bool {
        self.skip_tls_verify && self.environment != Environment::Production
    }

    /// Fail fast when a required setting is missing; the feature is
    /// disabled rather than crashing the host.
    pub fn ensure_complete(&self) -> Result<()> {
        if !self.enabled {
            return Err(VarcoError::config("IdP integration is disabled"));
        }
        for (name, value) in [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("entity_id", &self.entity_id),
            ("redirect_uri", &self.redirect_uri),
        ] {
            if value.is_empty() {
                return Err(VarcoError::config(format!("missing IdP setting: {name}")));
            }
        }
        if self.base_url().is_empty() {
            return Err(VarcoError::config("missing IdP base URL"));
        }
        Ok(())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Provider-defined claim names for the attributes the gateway consumes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimMappings {
    #[serde(default = "default_user_id_claim")]
    pub user_id: String,
    #[serde(default = "default_email_claim")]
    pub email: String,
    #[serde(default = "default_username_claim")]
    pub username: String,
    #[serde(default = "default_given_name_claim")]
    pub given_name: String,
    #[serde(default = "default_family_name_claim")]
    pub family_name: String,
    #[serde(default = "default_fiscal_code_claim")]
    pub fiscal_code: String,
    #[serde(default = "default_mobile_phone_claim")]
    pub mobile_phone: String,
}

impl Default for ClaimMappings {
    fn default() -> Self {
        Self {
            user_id: default_user_id_claim(),
            email: default_email_claim(),
            username: default_username_claim(),
            given_name: default_given_name_claim(),
            family_name: default_family_name_claim(),
            fiscal_code: default_fiscal_code_claim(),
            mobile_phone: default_mobile_phone_claim(),
        }
    }
}

/// Settings steering identity reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerSettings {
    #[serde(default)]
    pub claim_mappings: ClaimMappings,
    /// Create a local account when no match is found
    #[serde(default = "default_true")]
    pub auto_register: bool,
    /// Also try matching existing accounts by username
    #[serde(default)]
    pub link_by_username: bool,
    /// Role granted to newly registered users
    #[serde(default)]
    pub default_role: Option<String>,
    /// Users holding any of these roles never receive the default role
    #[serde(default)]
    pub excluded_roles: Vec<String>,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            claim_mappings: ClaimMappings::default(),
            auto_register: true,
            link_by_username: false,
            default_role: None,
            excluded_roles: vec![],
        }
    }
}

/// Settings for post-login redirect validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedirectSettings {
    /// Newline-separated in the admin surface; parsed into entries here.
    /// Entries are normalized (scheme and path stripped) before matching.
    #[serde(default)]
    pub domain_whitelist: Vec<String>,
}

/// Settings for the silent session probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum seconds between probe rounds for one client
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: i64,
    /// Cooldown after a recorded "not authenticated" result
    #[serde(default = "default_negative_cooldown")]
    pub negative_cooldown_secs: i64,
    #[serde(default = "default_direct_timeout")]
    pub direct_timeout_secs: u64,
    #[serde(default = "default_iframe_timeout")]
    pub iframe_timeout_secs: u64,
    #[serde(default = "default_beacon_timeout")]
    pub beacon_timeout_secs: u64,
    /// Seconds a started login redirect suppresses further probing
    #[serde(default = "default_redirect_grace")]
    pub redirect_grace_secs: i64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: default_check_interval(),
            negative_cooldown_secs: default_negative_cooldown(),
            direct_timeout_secs: default_direct_timeout(),
            iframe_timeout_secs: default_iframe_timeout(),
            beacon_timeout_secs: default_beacon_timeout(),
            redirect_grace_secs: default_redirect_grace(),
        }
    }
}

/// Settings for the citizen-profile sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Minimum seconds between sync attempts for one user
    #[serde(default = "default_sync_interval")]
    pub interval_secs: i64,
    /// API-manager token endpoint for the client-credentials grant
    pub token_url: String,
    /// Service credentials, distinct from the citizen OAuth2 client
    pub api_client_id: String,
    pub api_client_secret: String,
    /// Base URL of the downstream citizen-profile API
    pub profile_api_url: String,
}

fn default_staging_url() -> String {
    "https://id.staging.example.it".to_string()
}

fn default_production_url() -> String {
    "https://id.example.it".to_string()
}

fn default_auth_path() -> String {
    "oauth2/authorize".to_string()
}

fn default_token_path() -> String {
    "oauth2/token".to_string()
}

fn default_userinfo_path() -> String {
    "oauth2/userinfo".to_string()
}

fn default_logout_path() -> String {
    "oidc/logout".to_string()
}

fn default_jwks_path() -> String {
    "oauth2/jwks".to_string()
}

fn default_scope() -> String {
    "openid".to_string()
}

fn default_user_id_claim() -> String {
    "sub".to_string()
}

fn default_email_claim() -> String {
    "email".to_string()
}

fn default_username_claim() -> String {
    "preferred_username".to_string()
}

fn default_given_name_claim() -> String {
    "given_name".to_string()
}

fn default_family_name_claim() -> String {
    "family_name".to_string()
}

fn default_fiscal_code_claim() -> String {
    "fiscal_code".to_string()
}

fn default_mobile_phone_claim() -> String {
    "phone_number".to_string()
}

fn default_true() -> bool {
    true
}

fn default_check_interval() -> i64 {
    30
}

fn default_negative_cooldown() -> i64 {
    120
}

fn default_direct_timeout() -> u64 {
    10
}

fn default_iframe_timeout() -> u64 {
    15
}

fn default_beacon_timeout() -> u64 {
    5
}

fn default_redirect_grace() -> i64 {
    5
}

fn default_sync_interval() -> i64 {
    1800
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> IdpSettings {
        IdpSettings {
            enabled: true,
            environment: Environment::Staging,
            staging_url: "https://id.staging.comune.test/".to_string(),
            production_url: "https://id.comune.test".to_string(),
            auth_path: default_auth_path(),
            token_path: default_token_path(),
            userinfo_path: default_userinfo_path(),
            logout_path: default_logout_path(),
            jwks_path: default_jwks_path(),
            client_id: "portal".to_string(),
            client_secret: "s3cret".to_string(),
            scope: default_scope(),
            entity_id: "comune-test".to_string(),
            redirect_uri: "https://portal.comune.test/callback".to_string(),
            skip_tls_verify: true,
        }
    }

    #[test]
    fn test_environment_selects_base_url() {
        let mut s = settings();
        assert_eq!(
            s.authorize_endpoint(),
            "https://id.staging.comune.test/oauth2/authorize"
        );

        s.environment = Environment::Production;
        assert_eq!(s.authorize_endpoint(), "https://id.comune.test/oauth2/authorize");
    }

    #[test]
    fn test_tls_bypass_never_applies_in_production() {
        let mut s = settings();
        assert!(s.accept_invalid_certs());

        s.environment = Environment::Production;
        assert!(!s.accept_invalid_certs());
    }

    #[test]
    fn test_ensure_complete_flags_missing_settings() {
        let mut s = settings();
        assert!(s.ensure_complete().is_ok());

        s.client_id = String::new();
        let err = s.ensure_complete().unwrap_err();
        assert!(err.to_string().contains("client_id"));

        let mut disabled = settings();
        disabled.enabled = false;
        assert!(disabled.ensure_complete().is_err());
    }
}
