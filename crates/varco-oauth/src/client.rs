//! Bounded HTTP client for IdP calls

use std::time::Duration;

use varco_core::{Result, VarcoError};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Thin wrapper around `reqwest::Client` with the timeout policy every
/// outbound IdP call uses. No call may block indefinitely, and none of
/// them retries: authorization codes are single-use, so a retry would
/// fail regardless.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// `accept_invalid_certs` is honored by callers outside production
    /// only; see `IdpSettings::accept_invalid_certs`.
    pub fn new(accept_invalid_certs: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| VarcoError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Client with a shorter request timeout, used by probe strategies
    pub fn with_timeout(accept_invalid_certs: bool, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS.min(timeout_secs)))
            .timeout(Duration::from_secs(timeout_secs))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| VarcoError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}
