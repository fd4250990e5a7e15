//! Silent session probing
//!
//! Decides, without interrupting the visitor, whether a live IdP session
//! exists. Three strategies run as a strictly sequential fallback chain,
//! each bounded by its own timeout; no single approach detects an
//! existing session reliably across every deployment and CORS setup.
//!
//! The chain fails closed: an auto-redirect into the login flow happens
//! only on an explicit positive signal, never on ambiguity.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use varco_core::{
    AuthorizeUrlRequest, IdpGateway, ProbeSettings, Result, SessionData, VarcoError,
};

use crate::state_token::StateTokenStore;

/// What a single strategy observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSignal {
    Authenticated,
    NotAuthenticated,
    /// Could not tell; the next strategy gets its turn
    Ambiguous,
}

/// Final verdict of a probe round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A live IdP session exists; the caller should start the login
    /// redirect (the in-progress flag is already set).
    Authenticated,
    NotAuthenticated,
    /// Preconditions or throttles stopped the round before any probe ran
    Skipped,
}

/// A single session-detection approach
#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upper bound for one attempt; the orchestrator enforces it
    fn timeout_secs(&self, settings: &ProbeSettings) -> u64;

    /// Signal to assume when the attempt exceeds its timeout
    fn on_timeout(&self) -> ProbeSignal;

    async fn run(&self, session: &SessionData) -> ProbeSignal;
}

// =============================================================================
// Strategy 1: direct probe
// =============================================================================

/// Credentialed GET against a session-status endpoint. A definitive
/// 200/401 settles the question; anything else is ambiguous (CORS and
/// network failures land here).
pub struct DirectProbe {
    http: reqwest::Client,
    status_url: String,
}

impl DirectProbe {
    pub fn new(http: reqwest::Client, status_url: String) -> Self {
        Self { http, status_url }
    }
}

pub(crate) fn classify_direct_status(status: StatusCode) -> ProbeSignal {
    if status == StatusCode::OK {
        ProbeSignal::Authenticated
    } else if status == StatusCode::UNAUTHORIZED {
        ProbeSignal::NotAuthenticated
    } else {
        ProbeSignal::Ambiguous
    }
}

#[async_trait]
impl ProbeStrategy for DirectProbe {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn timeout_secs(&self, settings: &ProbeSettings) -> u64 {
        settings.direct_timeout_secs
    }

    fn on_timeout(&self) -> ProbeSignal {
        ProbeSignal::Ambiguous
    }

    async fn run(&self, session: &SessionData) -> ProbeSignal {
        let mut request = self.http.get(&self.status_url);
        if let Some(tokens) = &session.tokens {
            request = request.bearer_auth(&tokens.access_token);
        }

        match request.send().await {
            Ok(response) => classify_direct_status(response.status()),
            Err(e) => {
                debug!(error = %e, "Direct probe failed, falling through");
                ProbeSignal::Ambiguous
            }
        }
    }
}

// =============================================================================
// Strategy 2: iframe probe (prompt=none authorization round-trip)
// =============================================================================

/// Non-interactive authorization attempt. The IdP answers a
/// `prompt=none` request with a redirect carrying either `code=` (live
/// session) or `error=login_required`/`interaction_required` (no
/// session). Any other error is ambiguous.
pub struct IframeProbe {
    http: reqwest::Client,
    gateway: Arc<dyn IdpGateway>,
}

impl IframeProbe {
    /// `http` must be built with redirects disabled; the redirect target
    /// is the result.
    pub fn new(http: reqwest::Client, gateway: Arc<dyn IdpGateway>) -> Self {
        Self { http, gateway }
    }
}

pub(crate) fn classify_probe_redirect(location: &str) -> ProbeSignal {
    let parsed = match Url::parse(location) {
        Ok(url) => url,
        Err(_) => return ProbeSignal::Ambiguous,
    };

    let mut code = None;
    let mut error = None;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if code.is_some_and(|c| !c.is_empty()) {
        return ProbeSignal::Authenticated;
    }
    match error.as_deref() {
        Some("login_required") | Some("interaction_required") => ProbeSignal::NotAuthenticated,
        Some(_) => ProbeSignal::Ambiguous,
        None => ProbeSignal::Ambiguous,
    }
}

#[async_trait]
impl ProbeStrategy for IframeProbe {
    fn name(&self) -> &'static str {
        "iframe"
    }

    fn timeout_secs(&self, settings: &ProbeSettings) -> u64 {
        settings.iframe_timeout_secs
    }

    fn on_timeout(&self) -> ProbeSignal {
        ProbeSignal::Ambiguous
    }

    async fn run(&self, _session: &SessionData) -> ProbeSignal {
        // Fresh state/nonce scoped to this probe; the probe result is
        // never exchanged, so nothing is stored on the real session.
        let mut scratch = SessionData::default();
        let state = StateTokenStore::issue(&mut scratch);
        let nonce = StateTokenStore::issue_nonce(&mut scratch);

        let url = match self.gateway.authorization_url(&AuthorizeUrlRequest {
            state,
            nonce: Some(nonce),
            prompt_none: true,
        }) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Could not build prompt=none URL");
                return ProbeSignal::Ambiguous;
            }
        };

        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "Iframe probe request failed");
                return ProbeSignal::Ambiguous;
            }
        };

        if !response.status().is_redirection() {
            return ProbeSignal::Ambiguous;
        }

        match response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
        {
            Some(location) => classify_probe_redirect(location),
            None => ProbeSignal::Ambiguous,
        }
    }
}

// =============================================================================
// Strategy 3: image beacon
// =============================================================================

/// Last resort: load a userinfo-equivalent URL as an image resource
/// would be loaded. A successful load means authenticated; an error or
/// timeout means not authenticated. Lowest confidence of the three.
pub struct BeaconProbe {
    http: reqwest::Client,
    beacon_url: String,
}

impl BeaconProbe {
    pub fn new(http: reqwest::Client, beacon_url: String) -> Self {
        Self { http, beacon_url }
    }
}

#[async_trait]
impl ProbeStrategy for BeaconProbe {
    fn name(&self) -> &'static str {
        "beacon"
    }

    fn timeout_secs(&self, settings: &ProbeSettings) -> u64 {
        settings.beacon_timeout_secs
    }

    fn on_timeout(&self) -> ProbeSignal {
        ProbeSignal::NotAuthenticated
    }

    async fn run(&self, _session: &SessionData) -> ProbeSignal {
        match self.http.get(&self.beacon_url).send().await {
            Ok(response) if response.status().is_success() => ProbeSignal::Authenticated,
            _ => ProbeSignal::NotAuthenticated,
        }
    }
}

// =============================================================================
// Orchestration
// =============================================================================

/// Runs the strategy chain for one session, honoring the throttles
pub struct SilentSessionProbe {
    settings: ProbeSettings,
    strategies: Vec<Arc<dyn ProbeStrategy>>,
}

impl SilentSessionProbe {
    pub fn new(settings: ProbeSettings, strategies: Vec<Arc<dyn ProbeStrategy>>) -> Self {
        Self {
            settings,
            strategies,
        }
    }

    /// Probe for a live IdP session.
    ///
    /// The caller persists the mutated session afterwards; the throttle
    /// timestamps are advisory only and a cleared throttle simply lets
    /// the server-authoritative flow run again.
    #[instrument(skip(self, session))]
    pub async fn check(&self, session: &mut SessionData) -> Result<ProbeOutcome> {
        if !self.settings.enabled {
            return Ok(ProbeOutcome::Skipped);
        }
        if session.is_authenticated() {
            return Ok(ProbeOutcome::Skipped);
        }
        if self.strategies.is_empty() {
            return Err(VarcoError::config("no probe strategies configured"));
        }

        let now = Utc::now();
        if session
            .check
            .redirect_in_progress(self.settings.redirect_grace_secs)
        {
            return Ok(ProbeOutcome::Skipped);
        }
        if let Some(last) = session.check.last_check_at {
            if now - last < Duration::seconds(self.settings.check_interval_secs) {
                return Ok(ProbeOutcome::Skipped);
            }
        }
        if let Some(negative) = session.check.last_negative_at {
            if now - negative < Duration::seconds(self.settings.negative_cooldown_secs) {
                return Ok(ProbeOutcome::Skipped);
            }
        }

        session.check.checked = true;
        session.check.last_check_at = Some(now);
        session.check.redirect_started_at = None;

        for strategy in &self.strategies {
            let timeout = std::time::Duration::from_secs(strategy.timeout_secs(&self.settings));
            let signal = match tokio::time::timeout(timeout, strategy.run(session)).await {
                Ok(signal) => signal,
                Err(_) => {
                    debug!(strategy = strategy.name(), "Probe strategy timed out");
                    strategy.on_timeout()
                }
            };

            debug!(strategy = strategy.name(), signal = ?signal, "Probe strategy finished");

            match signal {
                ProbeSignal::Authenticated => {
                    info!(strategy = strategy.name(), "Live IdP session detected");
                    session.check.redirect_started_at = Some(Utc::now());
                    return Ok(ProbeOutcome::Authenticated);
                }
                ProbeSignal::NotAuthenticated => {
                    session.check.last_negative_at = Some(Utc::now());
                    return Ok(ProbeOutcome::NotAuthenticated);
                }
                ProbeSignal::Ambiguous => continue,
            }
        }

        // Every strategy came back ambiguous: fail closed
        session.check.last_negative_at = Some(Utc::now());
        Ok(ProbeOutcome::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedStrategy {
        signal: ProbeSignal,
        calls: AtomicU32,
    }

    impl FixedStrategy {
        fn new(signal: ProbeSignal) -> Arc<Self> {
            Arc::new(Self {
                signal,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl ProbeStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn timeout_secs(&self, _settings: &ProbeSettings) -> u64 {
            1
        }

        fn on_timeout(&self) -> ProbeSignal {
            ProbeSignal::Ambiguous
        }

        async fn run(&self, _session: &SessionData) -> ProbeSignal {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.signal
        }
    }

    fn settings() -> ProbeSettings {
        ProbeSettings::default()
    }

    #[tokio::test]
    async fn test_definitive_negative_short_circuits() {
        let first = FixedStrategy::new(ProbeSignal::NotAuthenticated);
        let second = FixedStrategy::new(ProbeSignal::Authenticated);
        let probe =
            SilentSessionProbe::new(settings(), vec![first.clone(), second.clone()]);

        let mut session = SessionData::default();
        let outcome = probe.check(&mut session).await.unwrap();

        assert_eq!(outcome, ProbeOutcome::NotAuthenticated);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
        assert!(session.check.last_negative_at.is_some());
    }

    #[tokio::test]
    async fn test_ambiguous_falls_through_to_next_strategy() {
        let first = FixedStrategy::new(ProbeSignal::Ambiguous);
        let second = FixedStrategy::new(ProbeSignal::NotAuthenticated);
        let third = FixedStrategy::new(ProbeSignal::Authenticated);
        let probe = SilentSessionProbe::new(
            settings(),
            vec![first.clone(), second.clone(), third.clone()],
        );

        let mut session = SessionData::default();
        let outcome = probe.check(&mut session).await.unwrap();

        assert_eq!(outcome, ProbeOutcome::NotAuthenticated);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_positive_signal_marks_redirect_in_progress() {
        let probe = SilentSessionProbe::new(
            settings(),
            vec![FixedStrategy::new(ProbeSignal::Authenticated)],
        );

        let mut session = SessionData::default();
        let outcome = probe.check(&mut session).await.unwrap();

        assert_eq!(outcome, ProbeOutcome::Authenticated);
        assert!(session.check.redirect_started_at.is_some());
    }

    #[tokio::test]
    async fn test_all_ambiguous_fails_closed() {
        let probe = SilentSessionProbe::new(
            settings(),
            vec![
                FixedStrategy::new(ProbeSignal::Ambiguous),
                FixedStrategy::new(ProbeSignal::Ambiguous),
            ],
        );

        let mut session = SessionData::default();
        let outcome = probe.check(&mut session).await.unwrap();
        assert_eq!(outcome, ProbeOutcome::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_check_interval_throttles() {
        let strategy = FixedStrategy::new(ProbeSignal::Ambiguous);
        let probe = SilentSessionProbe::new(settings(), vec![strategy.clone()]);

        let mut session = SessionData::default();
        session.check.last_check_at = Some(Utc::now());

        let outcome = probe.check(&mut session).await.unwrap();
        assert_eq!(outcome, ProbeOutcome::Skipped);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_negative_cooldown_throttles() {
        let strategy = FixedStrategy::new(ProbeSignal::Authenticated);
        let probe = SilentSessionProbe::new(settings(), vec![strategy.clone()]);

        let mut session = SessionData::default();
        session.check.last_check_at = Some(Utc::now() - Duration::seconds(3600));
        session.check.last_negative_at = Some(Utc::now() - Duration::seconds(30));

        let outcome = probe.check(&mut session).await.unwrap();
        assert_eq!(outcome, ProbeOutcome::Skipped);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_redirect_in_progress_suppresses_probe() {
        let strategy = FixedStrategy::new(ProbeSignal::Authenticated);
        let probe = SilentSessionProbe::new(settings(), vec![strategy.clone()]);

        let mut session = SessionData::default();
        session.check.redirect_started_at = Some(Utc::now());

        let outcome = probe.check(&mut session).await.unwrap();
        assert_eq!(outcome, ProbeOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_disabled_probe_skips() {
        let mut s = settings();
        s.enabled = false;
        let probe = SilentSessionProbe::new(s, vec![FixedStrategy::new(ProbeSignal::Authenticated)]);

        let mut session = SessionData::default();
        assert_eq!(probe.check(&mut session).await.unwrap(), ProbeOutcome::Skipped);
    }

    mod classification {
        use super::super::*;

        #[test]
        fn test_direct_status_classification() {
            assert_eq!(
                classify_direct_status(StatusCode::OK),
                ProbeSignal::Authenticated
            );
            assert_eq!(
                classify_direct_status(StatusCode::UNAUTHORIZED),
                ProbeSignal::NotAuthenticated
            );
            assert_eq!(
                classify_direct_status(StatusCode::BAD_GATEWAY),
                ProbeSignal::Ambiguous
            );
            assert_eq!(
                classify_direct_status(StatusCode::FORBIDDEN),
                ProbeSignal::Ambiguous
            );
        }

        #[test]
        fn test_redirect_with_code_means_authenticated() {
            assert_eq!(
                classify_probe_redirect("https://portal.test/callback?code=abc&state=s"),
                ProbeSignal::Authenticated
            );
        }

        #[test]
        fn test_login_required_means_not_authenticated() {
            assert_eq!(
                classify_probe_redirect("https://portal.test/callback?error=login_required"),
                ProbeSignal::NotAuthenticated
            );
            assert_eq!(
                classify_probe_redirect("https://portal.test/callback?error=interaction_required"),
                ProbeSignal::NotAuthenticated
            );
        }

        #[test]
        fn test_other_error_is_ambiguous() {
            assert_eq!(
                classify_probe_redirect("https://portal.test/callback?error=server_error"),
                ProbeSignal::Ambiguous
            );
            assert_eq!(
                classify_probe_redirect("https://portal.test/callback"),
                ProbeSignal::Ambiguous
            );
            assert_eq!(classify_probe_redirect("::not-a-url::"), ProbeSignal::Ambiguous);
        }
    }
}
