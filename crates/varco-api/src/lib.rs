//! Varco API - HTTP surface of the authentication gateway
//!
//! Exposes the authorize/callback/logout legs of the login flow, the
//! session-status endpoint consumed by the silent probe, and the
//! profile-sync trigger. Everything behind the handlers is composed
//! from the service crates; no framework types leak below this layer.

pub mod flow;
pub mod handlers;
pub mod routes;
pub mod state;


pub use flow::{CallbackResolution, LoginFlow};
pub use routes::create_router_with_state;
pub use state::AppState;
