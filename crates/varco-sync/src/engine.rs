//! Profile sync engine
//!
//! Pulls citizen-profile attributes from the downstream API and merges
//! them into the local account, at most once per user per configured
//! interval. The sync mark is written after any fetch attempt, success
//! or not, so a persistently failing upstream cannot be hot-looped.
//! The check-then-act on the mark is not atomic across workers; a rare
//! duplicate sync is accepted because the downstream write is idempotent.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use varco_core::{KeyValueStore, ProfileFields, Result, SyncSettings, UserId, UserStore, VarcoError};

use crate::profile_api::{CitizenProfileApi, ServiceTokenProvider};

fn sync_mark_key(user_id: UserId) -> String {
    format!("profile_sync.last.{user_id}")
}

pub struct ProfileSyncEngine {
    settings: SyncSettings,
    users: Arc<dyn UserStore>,
    marks: Arc<dyn KeyValueStore>,
    tokens: Arc<dyn ServiceTokenProvider>,
    api: Arc<dyn CitizenProfileApi>,
}

impl ProfileSyncEngine {
    pub fn new(
        settings: SyncSettings,
        users: Arc<dyn UserStore>,
        marks: Arc<dyn KeyValueStore>,
        tokens: Arc<dyn ServiceTokenProvider>,
        api: Arc<dyn CitizenProfileApi>,
    ) -> Self {
        Self {
            settings,
            users,
            marks,
            tokens,
            api,
        }
    }

    /// Sync one user's profile if the interval has elapsed.
    ///
    /// `Ok(true)` means no update was needed or the update succeeded;
    /// `Ok(false)` means the downstream service could not be reached or
    /// parsed after a service token was obtained. Errors before the
    /// fetch attempt (token, missing fiscal code) leave the mark
    /// untouched so the next trigger retries.
    #[instrument(skip(self))]
    pub async fn perform_sync(&self, user_id: UserId) -> Result<bool> {
        if self.was_synced_recently(user_id).await? {
            return Ok(true);
        }

        // Token failure aborts without marking: retry on next trigger
        let bearer = self.tokens.access_token().await?;

        let mut user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| VarcoError::not_found("user", user_id.to_string()))?;

        let Some(fiscal_code) = user.fiscal_code.clone() else {
            return Err(VarcoError::reconciliation(
                "profile sync impossible: account has no fiscal code",
            ));
        };

        let fetched = self.api.fetch(&fiscal_code, &bearer).await;

        // A fetch was attempted: cap the retry frequency regardless of
        // its outcome.
        self.mark_synced(user_id).await?;

        let profile = match fetched {
            Ok(profile) if profile.is_success() => profile,
            Ok(profile) => {
                warn!(user_id = %user_id, esito = %profile.esito, "Profile API returned business failure");
                return Ok(false);
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Profile fetch failed");
                return Ok(false);
            }
        };

        let fields = ProfileFields {
            email: profile.email,
            given_name: profile.nome,
            family_name: profile.cognome,
            fiscal_code: None,
            mobile_phone: profile.cellulare,
        };

        if user.apply_profile(&fields) {
            user.updated_at = Utc::now();
            self.users.update(&user).await?;
            info!(user_id = %user_id, "Profile attributes updated from citizen API");
        }

        Ok(true)
    }

    async fn was_synced_recently(&self, user_id: UserId) -> Result<bool> {
        let Some(raw) = self.marks.get(&sync_mark_key(user_id)).await? else {
            return Ok(false);
        };

        let Ok(last) = raw.parse::<DateTime<Utc>>() else {
            return Ok(false);
        };

        Ok(Utc::now() - last < Duration::seconds(self.settings.interval_secs))
    }

    async fn mark_synced(&self, user_id: UserId) -> Result<()> {
        self.marks
            .set(&sync_mark_key(user_id), &Utc::now().to_rfc3339())
            .await
    }
}
