//! Application state for API handlers

use sqlx::PgPool;
use std::sync::Arc;

use varco_core::IdpSettings;
use varco_session::{SessionManager, SilentSessionProbe};
use varco_sync::ProfileSyncEngine;

use crate::flow::LoginFlow;

/// Session cookie carried by the browser
pub const SESSION_COOKIE: &str = "varco_session";

/// Concrete application state with all services
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settings: Arc<IdpSettings>,
    /// Public base URL of the portal this gateway fronts
    pub site_base: String,
    pub sessions: SessionManager,
    pub flow: Arc<LoginFlow>,
    pub probe: Arc<SilentSessionProbe>,
    pub sync: Arc<ProfileSyncEngine>,
    pub sync_enabled: bool,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: PgPool,
        settings: Arc<IdpSettings>,
        site_base: impl Into<String>,
        sessions: SessionManager,
        flow: Arc<LoginFlow>,
        probe: Arc<SilentSessionProbe>,
        sync: Arc<ProfileSyncEngine>,
        sync_enabled: bool,
    ) -> Self {
        Self {
            db_pool,
            settings,
            site_base: site_base.into().trim_end_matches('/').to_string(),
            sessions,
            flow,
            probe,
            sync,
            sync_enabled,
        }
    }
}
