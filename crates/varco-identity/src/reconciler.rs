//! Identity reconciliation
//!
//! Maps a validated claim set onto a local user account. The lookup
//! ladder runs in order, first match wins: external-identity link,
//! exact email match, exact username match (when configured), then
//! auto-registration. Any unmet precondition fails the whole login and
//! leaves no partial account state behind.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use varco_core::{
    ClaimSet, IdentityLinkStore, LocalUser, LoginListener, NewUser, ReconcilerSettings, Result,
    UserStore, VarcoError, PROVIDER_NAME,
};

use crate::claims::{map_claims, MappedClaims};

/// How the claim set was matched to the local account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMethod {
    ExternalId,
    EmailMatch,
    UsernameMatch,
    Registered,
}

/// A finalized login
#[derive(Debug, Clone)]
pub struct ReconciledLogin {
    pub user: LocalUser,
    pub method: LinkMethod,
}

pub struct IdentityReconciler {
    settings: ReconcilerSettings,
    users: Arc<dyn UserStore>,
    links: Arc<dyn IdentityLinkStore>,
    login_listeners: Vec<Arc<dyn LoginListener>>,
}

impl IdentityReconciler {
    pub fn new(
        settings: ReconcilerSettings,
        users: Arc<dyn UserStore>,
        links: Arc<dyn IdentityLinkStore>,
    ) -> Self {
        Self {
            settings,
            users,
            links,
            login_listeners: vec![],
        }
    }

    pub fn with_login_listener(mut self, listener: Arc<dyn LoginListener>) -> Self {
        self.login_listeners.push(listener);
        self
    }

    /// Reconcile IdP claims with a local account and finalize the login
    #[instrument(skip(self, claims))]
    pub async fn reconcile(&self, claims: &ClaimSet) -> Result<ReconciledLogin> {
        let mapped = map_claims(claims, &self.settings.claim_mappings);

        let external_id = mapped
            .external_id
            .clone()
            .ok_or_else(|| VarcoError::reconciliation("claims carry no user id"))?;

        // 1. Existing external-identity link
        if let Some(user_id) = self.links.find_user(PROVIDER_NAME, &external_id).await? {
            let user = self
                .users
                .find_by_id(user_id)
                .await?
                .ok_or_else(|| VarcoError::not_found("user", user_id.to_string()))?;
            return self
                .finalize(user, claims, LinkMethod::ExternalId)
                .await;
        }

        // 2. Exact email match among existing accounts
        if let Some(email) = &mapped.email {
            let mut matches = self.users.find_by_email(email).await?;
            if matches.len() > 1 {
                warn!(count = matches.len(), "Multiple accounts share the claimed email");
                return Err(VarcoError::reconciliation(
                    "claimed email matches more than one local account",
                ));
            }
            if let Some(mut user) = matches.pop() {
                self.links
                    .link(PROVIDER_NAME, &external_id, user.id)
                    .await?;
                info!(user_id = %user.id, "Linked external identity to existing account by email");
                self.sync_account(&mut user, &mapped);
                return self.finalize(user, claims, LinkMethod::EmailMatch).await;
            }
        }

        // 3. Exact username match, when configured
        if self.settings.link_by_username {
            if let Some(username) = &mapped.username {
                if let Some(mut user) = self.users.find_by_username(username).await? {
                    self.links
                        .link(PROVIDER_NAME, &external_id, user.id)
                        .await?;
                    info!(user_id = %user.id, "Linked external identity to existing account by username");
                    self.sync_account(&mut user, &mapped);
                    return self
                        .finalize(user, claims, LinkMethod::UsernameMatch)
                        .await;
                }
            }
        }

        // 4. Auto-registration
        if !self.settings.auto_register {
            return Err(VarcoError::reconciliation(
                "no matching account and registration is disabled",
            ));
        }

        let username = self.unique_username(&mapped, &external_id).await?;
        let mut roles = vec![];
        if let Some(role) = &self.settings.default_role {
            roles.push(role.clone());
        }

        let new_user = NewUser {
            username,
            email: mapped.email.clone().unwrap_or_default(),
            given_name: mapped.profile.given_name.clone(),
            family_name: mapped.profile.family_name.clone(),
            fiscal_code: mapped.profile.fiscal_code.clone(),
            mobile_phone: mapped.profile.mobile_phone.clone(),
            roles,
        };

        // Creation, field population and linking commit as one unit
        let user = self
            .users
            .create_linked(&new_user, PROVIDER_NAME, &external_id)
            .await?;
        info!(user_id = %user.id, username = %user.username, "Registered new account for external identity");

        self.finalize(user, claims, LinkMethod::Registered).await
    }

    /// Re-apply mapped profile fields and role policy to an existing
    /// account being linked. Mutates in place; `finalize` persists once.
    fn sync_account(&self, user: &mut LocalUser, mapped: &MappedClaims) {
        user.apply_profile(&mapped.profile);

        if let Some(role) = &self.settings.default_role {
            let excluded = user
                .roles
                .iter()
                .any(|r| self.settings.excluded_roles.contains(r));
            if !excluded && !user.roles.contains(role) {
                user.roles.push(role.clone());
            }
        }
    }

    async fn finalize(
        &self,
        mut user: LocalUser,
        claims: &ClaimSet,
        method: LinkMethod,
    ) -> Result<ReconciledLogin> {
        user.last_login_at = Some(Utc::now());
        user.updated_at = Utc::now();
        let user = self.users.update(&user).await?;

        for listener in &self.login_listeners {
            listener.post_login(&user, claims).await;
        }

        info!(user_id = %user.id, method = ?method, "Login finalized");
        Ok(ReconciledLogin { user, method })
    }

    /// Username from the mapped claim, or one derived from the external
    /// id; collisions get an incrementing numeric suffix.
    async fn unique_username(&self, mapped: &MappedClaims, external_id: &str) -> Result<String> {
        let base = match &mapped.username {
            Some(username) => username.clone(),
            None => {
                let truncated: String = external_id.chars().take(8).collect();
                format!("{PROVIDER_NAME}_{truncated}")
            }
        };

        if !self.users.username_exists(&base).await? {
            return Ok(base);
        }

        let mut suffix = 1u32;
        loop {
            let candidate = format!("{base}_{suffix}");
            if !self.users.username_exists(&candidate).await? {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }
}
