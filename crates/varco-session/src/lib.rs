//! Varco Session - per-visitor state and silent session detection
//!
//! Home of the anti-forgery state tokens, the session wrapper, the
//! redirect-safety dispatcher and the three-strategy silent session
//! probe with its orchestration.

pub mod probe;
pub mod redirect;
pub mod session;
pub mod state_token;

pub use probe::{
    BeaconProbe, DirectProbe, IframeProbe, ProbeOutcome, ProbeSignal, ProbeStrategy,
    SilentSessionProbe,
};
pub use redirect::SecureRedirectDispatcher;
pub use session::SessionManager;
pub use state_token::StateTokenStore;
