//! One-time anti-forgery state tokens

use chrono::Utc;
use rand::RngCore;
use subtle::ConstantTimeEq;

use varco_core::SessionData;

/// Issues and verifies the `state` value bound to a browser session.
///
/// Only one authorization flow may be in flight per session: issuing a
/// new token overwrites any pending one. Verification consumes the
/// stored token before comparing, so a replayed callback always fails.
pub struct StateTokenStore;

impl StateTokenStore {
    /// Generate a 128-bit random token, store it on the session, return it
    pub fn issue(session: &mut SessionData) -> String {
        let token = Self::random_token();
        session.state_token = Some(token.clone());
        session.state_issued_at = Some(Utc::now());
        token
    }

    /// Generate and store a nonce for flows that use one
    pub fn issue_nonce(session: &mut SessionData) -> String {
        let nonce = Self::random_token();
        session.nonce = Some(nonce.clone());
        nonce
    }

    /// Single-use verification: the stored value is removed from the
    /// session before any comparison happens.
    pub fn verify(session: &mut SessionData, returned_state: &str) -> bool {
        let stored = session.state_token.take();
        session.state_issued_at = None;
        session.nonce = None;

        match stored {
            Some(stored) if !stored.is_empty() && !returned_state.is_empty() => stored
                .as_bytes()
                .ct_eq(returned_state.as_bytes())
                .into(),
            _ => false,
        }
    }

    fn random_token() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify_succeeds_once() {
        let mut session = SessionData::default();
        let state = StateTokenStore::issue(&mut session);
        assert_eq!(state.len(), 32);

        assert!(StateTokenStore::verify(&mut session, &state));
        // Replay of the same callback must fail
        assert!(!StateTokenStore::verify(&mut session, &state));
    }

    #[test]
    fn test_mismatch_fails_and_consumes() {
        let mut session = SessionData::default();
        let state = StateTokenStore::issue(&mut session);

        assert!(!StateTokenStore::verify(&mut session, "forged"));
        // The genuine value was consumed by the failed attempt
        assert!(!StateTokenStore::verify(&mut session, &state));
    }

    #[test]
    fn test_missing_or_empty_values_fail() {
        let mut session = SessionData::default();
        assert!(!StateTokenStore::verify(&mut session, "anything"));

        StateTokenStore::issue(&mut session);
        assert!(!StateTokenStore::verify(&mut session, ""));
    }

    #[test]
    fn test_new_flow_overwrites_pending_state() {
        let mut session = SessionData::default();
        let first = StateTokenStore::issue(&mut session);
        let second = StateTokenStore::issue(&mut session);
        assert_ne!(first, second);

        assert!(!StateTokenStore::verify(&mut session, &first));
    }
}
