//! Integration tests for the Varco gateway
//!
//! These tests require live collaborators to execute:
//! - VARCO_TEST_DATABASE_URL: PostgreSQL connection string
//! - VARCO_TEST_IDP_URL: base URL of a reachable WSO2 staging instance
//!
//! Run with: cargo test --test integration_tests -- --ignored

use std::sync::Arc;

use varco_core::{Environment, IdpSettings, ProbeSettings, SessionData};
use varco_db::{create_pool, DatabaseConfig, PgKeyValueStore, PgSessionStore};
use varco_core::{KeyValueStore, SessionStore};
use varco_oauth::{HttpClient, Wso2Gateway};
use varco_session::{DirectProbe, ProbeStrategy, SilentSessionProbe};

// =============================================================================
// Test Fixtures
// =============================================================================

fn database_url() -> Option<String> {
    std::env::var("VARCO_TEST_DATABASE_URL").ok()
}

fn idp_url() -> Option<String> {
    std::env::var("VARCO_TEST_IDP_URL").ok()
}

fn test_settings(idp_url: String) -> IdpSettings {
    IdpSettings {
        enabled: true,
        environment: Environment::Staging,
        staging_url: idp_url,
        production_url: String::new(),
        auth_path: "oauth2/authorize".to_string(),
        token_path: "oauth2/token".to_string(),
        userinfo_path: "oauth2/userinfo".to_string(),
        logout_path: "oidc/logout".to_string(),
        jwks_path: "oauth2/jwks".to_string(),
        client_id: std::env::var("VARCO_TEST_CLIENT_ID").unwrap_or_else(|_| "varco-test".into()),
        client_secret: std::env::var("VARCO_TEST_CLIENT_SECRET")
            .unwrap_or_else(|_| "varco-test-secret".into()),
        scope: "openid".to_string(),
        entity_id: "varco-test".to_string(),
        redirect_uri: "https://localhost:8080/callback".to_string(),
        skip_tls_verify: true,
    }
}

// =============================================================================
// Database-Backed Stores
// =============================================================================

#[tokio::test]
#[ignore = "Requires a running PostgreSQL instance"]
async fn test_kv_store_roundtrip() {
    let Some(url) = database_url() else {
        eprintln!("Skipping: VARCO_TEST_DATABASE_URL not set");
        return;
    };

    let pool = create_pool(&DatabaseConfig {
        url,
        ..Default::default()
    })
    .await
    .expect("pool");
    varco_db::run_migrations(&pool).await.expect("migrations");

    let kv = PgKeyValueStore::new(pool);
    let key = format!("it_test.{}", varco_core::SessionId::new());

    assert!(kv.get(&key).await.unwrap().is_none());
    kv.set(&key, "value-1").await.unwrap();
    assert_eq!(kv.get(&key).await.unwrap().as_deref(), Some("value-1"));
    kv.set(&key, "value-2").await.unwrap();
    assert_eq!(kv.get(&key).await.unwrap().as_deref(), Some("value-2"));
    kv.delete(&key).await.unwrap();
    assert!(kv.get(&key).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "Requires a running PostgreSQL instance"]
async fn test_session_store_roundtrip() {
    let Some(url) = database_url() else {
        eprintln!("Skipping: VARCO_TEST_DATABASE_URL not set");
        return;
    };

    let pool = create_pool(&DatabaseConfig {
        url,
        ..Default::default()
    })
    .await
    .expect("pool");
    varco_db::run_migrations(&pool).await.expect("migrations");

    let store = PgSessionStore::new(pool);
    let id = varco_core::SessionId::new();

    let mut data = SessionData::default();
    data.destination = Some("/servizi".to_string());
    store.save(&id, &data).await.unwrap();

    let loaded = store.load(&id).await.unwrap().unwrap();
    assert_eq!(loaded.destination.as_deref(), Some("/servizi"));

    store.delete(&id).await.unwrap();
    assert!(store.load(&id).await.unwrap().is_none());
}

// =============================================================================
// Live IdP
// =============================================================================

#[tokio::test]
#[ignore = "Requires a reachable WSO2 staging instance"]
async fn test_direct_probe_against_live_idp() {
    let Some(url) = idp_url() else {
        eprintln!("Skipping: VARCO_TEST_IDP_URL not set");
        return;
    };

    let settings = test_settings(url);
    let http = HttpClient::with_timeout(true, 10).expect("client");
    let strategies: Vec<Arc<dyn ProbeStrategy>> = vec![Arc::new(DirectProbe::new(
        http.inner().clone(),
        settings.userinfo_endpoint(),
    ))];

    let probe = SilentSessionProbe::new(ProbeSettings::default(), strategies);
    let mut session = SessionData::default();

    // Without a browser-held IdP session the probe must settle on "not
    // authenticated" and never error.
    let outcome = probe.check(&mut session).await.expect("probe runs");
    println!("Probe outcome without live session: {:?}", outcome);
}

#[tokio::test]
#[ignore = "Requires a reachable WSO2 staging instance"]
async fn test_userinfo_rejects_garbage_token() {
    let Some(url) = idp_url() else {
        eprintln!("Skipping: VARCO_TEST_IDP_URL not set");
        return;
    };

    let gateway = Wso2Gateway::new(Arc::new(test_settings(url))).expect("gateway");
    let result = varco_core::IdpGateway::fetch_userinfo(&gateway, "not-a-real-token").await;
    assert!(result.is_err(), "garbage token must not yield claims");
}
