//! Authorize, callback and logout handlers

use axum::{
    extract::{Query, State},
    response::Redirect,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::warn;

use varco_core::AuthType;

use super::{session_id_from_jar, with_session_cookie, without_session_cookie};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    /// Original navigation target, stored server-side and never trusted
    /// back from the callback
    pub destinazione: Option<String>,
    #[serde(rename = "type")]
    pub auth_type: Option<String>,
}

/// GET /authorize - start the authorization-code flow
pub async fn authorize(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<AuthorizeParams>,
) -> (CookieJar, Redirect) {
    let session_id = session_id_from_jar(&jar);
    let jar = with_session_cookie(jar, session_id);

    let mut session = match state.sessions.load_or_default(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Session load failed");
            return (jar, Redirect::temporary(&state.site_base));
        }
    };

    let auth_type = params
        .auth_type
        .as_deref()
        .map(AuthType::parse)
        .unwrap_or_default();

    let url = match state
        .flow
        .start_authorization(&mut session, params.destinazione.as_deref(), auth_type)
    {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, "Could not start authorization");
            return (jar, Redirect::temporary(&state.site_base));
        }
    };

    if let Err(e) = state.sessions.save(&session_id, &session).await {
        warn!(error = %e, "Session save failed");
        return (jar, Redirect::temporary(&state.site_base));
    }

    (jar, Redirect::temporary(&url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Sent by the IdP, unused by the flow
    #[allow(dead_code)]
    pub session_state: Option<String>,
}

/// GET /callback - landing point of the IdP redirect
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> (CookieJar, Redirect) {
    let session_id = session_id_from_jar(&jar);
    let jar = with_session_cookie(jar, session_id);

    let mut session = match state.sessions.load_or_default(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Session load failed");
            return (jar, Redirect::temporary(&state.site_base));
        }
    };

    let resolution = state
        .flow
        .handle_callback(&mut session, params.code.as_deref(), params.state.as_deref())
        .await;

    if let Err(e) = state.sessions.save(&session_id, &session).await {
        warn!(error = %e, "Session save failed");
        return (jar, Redirect::temporary(&state.site_base));
    }

    (jar, Redirect::temporary(resolution.redirect_to()))
}

/// GET /logout - clear the local session, then leave the IdP session
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    let session_id = session_id_from_jar(&jar);

    let session = state
        .sessions
        .load_or_default(&session_id)
        .await
        .unwrap_or_default();

    let logout_url = state.flow.logout_url(&session, &state.site_base);

    if let Err(e) = state.sessions.purge(&session_id).await {
        warn!(error = %e, "Session purge failed");
    }

    (without_session_cookie(jar), Redirect::temporary(&logout_url))
}
