//! Domain models for the Varco gateway

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::UserId;

/// Identity provider name used for external identity links
pub const PROVIDER_NAME: &str = "wso2";

/// A local user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub fiscal_code: Option<String>,
    pub mobile_phone: Option<String>,
    pub roles: Vec<String>,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalUser {
    /// Apply mapped profile fields, returning true if anything changed.
    ///
    /// Fields are written only when the incoming value is present and
    /// differs from the stored one, so callers can persist a single time
    /// after applying a whole batch.
    pub fn apply_profile(&mut self, fields: &ProfileFields) -> bool {
        let mut changed = false;

        if let Some(given_name) = &fields.given_name {
            if self.given_name.as_deref() != Some(given_name.as_str()) {
                self.given_name = Some(given_name.clone());
                changed = true;
            }
        }
        if let Some(family_name) = &fields.family_name {
            if self.family_name.as_deref() != Some(family_name.as_str()) {
                self.family_name = Some(family_name.clone());
                changed = true;
            }
        }
        if let Some(fiscal_code) = &fields.fiscal_code {
            if self.fiscal_code.as_deref() != Some(fiscal_code.as_str()) {
                self.fiscal_code = Some(fiscal_code.clone());
                changed = true;
            }
        }
        if let Some(mobile_phone) = &fields.mobile_phone {
            if self.mobile_phone.as_deref() != Some(mobile_phone.as_str()) {
                self.mobile_phone = Some(mobile_phone.clone());
                changed = true;
            }
        }
        if let Some(email) = &fields.email {
            if self.email != *email {
                self.email = email.clone();
                changed = true;
            }
        }

        changed
    }
}

/// Profile attributes mapped from IdP claims or the citizen-profile API
#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub fiscal_code: Option<String>,
    pub mobile_phone: Option<String>,
}

/// Input for creating a new local user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub fiscal_code: Option<String>,
    pub mobile_phone: Option<String>,
    pub roles: Vec<String>,
}

/// Persistent association between an external identity and a local user.
///
/// At most one local user may exist per (provider, authname) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityLink {
    pub provider: String,
    pub authname: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Token bundle obtained from the IdP token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenBundle {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Whether the bundle expires within the given number of seconds
    pub fn expires_within(&self, secs: i64) -> bool {
        self.expires_at <= Utc::now() + Duration::seconds(secs)
    }
}

/// Claims returned by the IdP userinfo endpoint (or a validated ID token).
///
/// Claim names are provider-defined; lookups go through the configured
/// claim mapping. Not persisted beyond reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimSet(HashMap<String, serde_json::Value>);

impl ClaimSet {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn from_map(map: HashMap<String, serde_json::Value>) -> Self {
        Self(map)
    }

    /// String value of a claim, if present and non-empty
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.0.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<serde_json::Value> {
        self.0.remove(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whether the visitor entered through the citizen or operator flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    Citizen,
    Operator,
}

impl AuthType {
    pub fn parse(s: &str) -> Self {
        match s {
            "operator" => Self::Operator,
            _ => Self::Citizen,
        }
    }
}

/// Per-session silent-check bookkeeping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCheckState {
    pub checked: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_negative_at: Option<DateTime<Utc>>,
    pub redirect_started_at: Option<DateTime<Utc>>,
}

impl SessionCheckState {
    /// A login redirect is considered in flight for at most `grace_secs`
    /// after it was started; a lost navigation must not wedge the session.
    pub fn redirect_in_progress(&self, grace_secs: i64) -> bool {
        match self.redirect_started_at {
            Some(at) => Utc::now() - at < Duration::seconds(grace_secs),
            None => false,
        }
    }
}

/// Mutable per-browser-session state, the only shared state between
/// requests of the same visitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// Original navigation target, stored on authorize-initiation and
    /// read exactly once by the callback.
    pub destination: Option<String>,
    pub auth_type: AuthType,
    /// Pending anti-forgery state; single-use, overwritten by each new
    /// authorization flow.
    pub state_token: Option<String>,
    pub nonce: Option<String>,
    pub state_issued_at: Option<DateTime<Utc>>,
    pub tokens: Option<TokenBundle>,
    pub user: Option<UserId>,
    pub check: SessionCheckState,
}

impl SessionData {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Read the stored destination and clear it
    pub fn take_destination(&mut self) -> Option<String> {
        self.destination.take()
    }

    /// Drop everything tied to the authenticated identity
    pub fn clear_identity(&mut self) {
        self.destination = None;
        self.state_token = None;
        self.nonce = None;
        self.state_issued_at = None;
        self.tokens = None;
        self.user = None;
        self.check = SessionCheckState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_profile_tracks_changes() {
        let mut user = LocalUser {
            id: UserId::new(),
            username: "mrossi".to_string(),
            email: "m.rossi@example.it".to_string(),
            given_name: Some("Mario".to_string()),
            family_name: None,
            fiscal_code: None,
            mobile_phone: None,
            roles: vec![],
            active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let unchanged = ProfileFields {
            given_name: Some("Mario".to_string()),
            ..Default::default()
        };
        assert!(!user.apply_profile(&unchanged));

        let changed = ProfileFields {
            family_name: Some("Rossi".to_string()),
            mobile_phone: Some("+39333000000".to_string()),
            ..Default::default()
        };
        assert!(user.apply_profile(&changed));
        assert_eq!(user.family_name.as_deref(), Some("Rossi"));
    }

    #[test]
    fn test_claim_set_ignores_empty_values() {
        let mut claims = ClaimSet::new();
        claims.insert("sub", serde_json::json!("X1"));
        claims.insert("email", serde_json::json!(""));

        assert_eq!(claims.get_str("sub"), Some("X1"));
        assert_eq!(claims.get_str("email"), None);
    }

    #[test]
    fn test_redirect_grace_window() {
        let mut check = SessionCheckState::default();
        assert!(!check.redirect_in_progress(5));

        check.redirect_started_at = Some(Utc::now());
        assert!(check.redirect_in_progress(5));

        check.redirect_started_at = Some(Utc::now() - Duration::seconds(10));
        assert!(!check.redirect_in_progress(5));
    }

    #[test]
    fn test_take_destination_is_read_once() {
        let mut session = SessionData {
            destination: Some("/servizi/anagrafe".to_string()),
            ..Default::default()
        };
        assert_eq!(session.take_destination().as_deref(), Some("/servizi/anagrafe"));
        assert_eq!(session.take_destination(), None);
    }
}
