//! Userinfo-endpoint client

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use varco_core::{ClaimSet, IdpSettings, Result, VarcoError};

use crate::client::HttpClient;

const SERVICE: &str = "idp-userinfo";

/// Fetches claims for an access token from the IdP userinfo endpoint
pub struct UserInfoClient {
    settings: Arc<IdpSettings>,
    http: HttpClient,
}

impl UserInfoClient {
    pub fn new(settings: Arc<IdpSettings>, http: HttpClient) -> Self {
        Self { settings, http }
    }

    #[instrument(skip(self, access_token))]
    pub async fn fetch(&self, access_token: &str) -> Result<ClaimSet> {
        let endpoint = self.settings.userinfo_endpoint();
        debug!(endpoint = %endpoint, "Fetching userinfo claims");

        let response = self
            .http
            .inner()
            .get(&endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| VarcoError::upstream(SERVICE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VarcoError::upstream(
                SERVICE,
                format!("userinfo endpoint returned HTTP {status}"),
            ));
        }

        let map: HashMap<String, serde_json::Value> = response
            .json()
            .await
            .map_err(|e| VarcoError::malformed(SERVICE, e.to_string()))?;

        Ok(ClaimSet::from_map(map))
    }
}
