//! Session status, silent probe and profile-sync triggers

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::warn;

use varco_session::ProbeOutcome;

use super::{session_id_from_jar, with_session_cookie};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
}

type NoStoreJson<T> = (CookieJar, [(header::HeaderName, &'static str); 2], Json<T>);

fn no_store<T>(jar: CookieJar, body: T) -> NoStoreJson<T> {
    (
        jar,
        [
            (header::CACHE_CONTROL, "no-store, max-age=0"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
}

/// GET /check-session - authoritative session status, cache-disabled
pub async fn check_session(
    State(state): State<AppState>,
    jar: CookieJar,
) -> NoStoreJson<SessionStatus> {
    let session_id = session_id_from_jar(&jar);
    let jar = with_session_cookie(jar, session_id);

    let mut session = match state.sessions.load_or_default(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Session load failed");
            return no_store(jar, SessionStatus {
                authenticated: false,
            });
        }
    };

    if let Err(e) = state.flow.refresh_tokens_if_needed(&mut session).await {
        warn!(error = %e, "Token refresh errored");
    }

    let authenticated = session.is_authenticated();
    if let Err(e) = state.sessions.save(&session_id, &session).await {
        warn!(error = %e, "Session save failed");
    }

    no_store(jar, SessionStatus { authenticated })
}

#[derive(Debug, Deserialize)]
pub struct ProbeParams {
    /// Path the visitor was navigating to when the probe fired
    pub destinazione: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// GET /probe - run the silent session probe for this visitor.
///
/// A positive result answers with the authorize redirect the caller
/// should navigate to; everything else answers "none" and the visitor
/// stays anonymous.
pub async fn probe(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<ProbeParams>,
) -> NoStoreJson<ProbeResponse> {
    let session_id = session_id_from_jar(&jar);
    let jar = with_session_cookie(jar, session_id);

    let mut session = match state.sessions.load_or_default(&session_id).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Session load failed");
            return no_store(jar, ProbeResponse {
                action: "none",
                location: None,
            });
        }
    };

    let outcome = match state.probe.check(&mut session).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "Silent probe errored");
            ProbeOutcome::NotAuthenticated
        }
    };

    if let Err(e) = state.sessions.save(&session_id, &session).await {
        warn!(error = %e, "Session save failed");
    }

    let response = match outcome {
        ProbeOutcome::Authenticated => {
            let destination = params.destinazione.unwrap_or_default();
            let location = format!(
                "{}/authorize?destinazione={}",
                state.site_base,
                urlencoding::encode(&destination),
            );
            ProbeResponse {
                action: "redirect",
                location: Some(location),
            }
        }
        ProbeOutcome::NotAuthenticated | ProbeOutcome::Skipped => ProbeResponse {
            action: "none",
            location: None,
        },
    };

    no_store(jar, response)
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub synced: bool,
}

/// POST /profile/sync - triggered by navigation to a protected route.
///
/// The portal invokes this for authenticated visitors; the engine
/// enforces the per-user interval.
pub async fn profile_sync(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<SyncResponse>, StatusCode> {
    if !state.sync_enabled {
        return Err(StatusCode::NOT_FOUND);
    }

    let session_id = session_id_from_jar(&jar);
    let session = state
        .sessions
        .load_or_default(&session_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let Some(user_id) = session.user else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    match state.sync.perform_sync(user_id).await {
        Ok(synced) => Ok(Json(SyncResponse { synced })),
        Err(e) => {
            warn!(error = %e, user_id = %user_id, "Profile sync aborted");
            Ok(Json(SyncResponse { synced: false }))
        }
    }
}
