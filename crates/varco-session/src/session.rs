//! Browser-session access

use std::sync::Arc;

use varco_core::{Result, SessionData, SessionId, SessionStore};

/// Convenience wrapper over the injected `SessionStore`.
///
/// Requests load the session once, mutate the in-memory copy, and save
/// it back before the response is emitted; the store is the only shared
/// mutable state between requests of the same visitor.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn load_or_default(&self, id: &SessionId) -> Result<SessionData> {
        Ok(self.store.load(id).await?.unwrap_or_default())
    }

    pub async fn save(&self, id: &SessionId, data: &SessionData) -> Result<()> {
        self.store.save(id, data).await
    }

    pub async fn purge(&self, id: &SessionId) -> Result<()> {
        self.store.delete(id).await
    }
}
