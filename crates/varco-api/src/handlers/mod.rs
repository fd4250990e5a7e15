//! API request handlers

pub mod auth;
pub mod health;
pub mod session;

pub use health::{health_check, liveness, readiness};

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use varco_core::SessionId;

use crate::state::SESSION_COOKIE;

/// Session id from the cookie, or a fresh one for first-time visitors
pub(crate) fn session_id_from_jar(jar: &CookieJar) -> SessionId {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse().ok())
        .unwrap_or_else(SessionId::new)
}

/// Ensure the response carries the session cookie
pub(crate) fn with_session_cookie(jar: CookieJar, id: SessionId) -> CookieJar {
    let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    jar.add(cookie)
}

/// Drop the session cookie on logout
pub(crate) fn without_session_cookie(jar: CookieJar) -> CookieJar {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    jar.remove(cookie)
}
