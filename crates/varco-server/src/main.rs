//! Varco Gateway - Main Server

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::Settings;
use varco_api::{AppState, LoginFlow};
use varco_db::{
    create_pool, DatabaseConfig, PgIdentityLinkStore, PgKeyValueStore, PgSessionStore, PgUserStore,
};
use varco_identity::IdentityReconciler;
use varco_oauth::{HttpClient, Wso2Gateway};
use varco_session::{
    BeaconProbe, DirectProbe, IframeProbe, ProbeStrategy, SecureRedirectDispatcher,
    SessionManager, SilentSessionProbe,
};
use varco_sync::{ApiManagerTokenClient, HttpCitizenProfileApi, ProfileSyncEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let settings = Settings::load().context("Failed to load configuration")?;

    info!("Starting Varco gateway v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = settings.idp.ensure_complete() {
        // The feature degrades to "visitors stay anonymous"; the server
        // itself keeps running for health checks and static flows.
        warn!("IdP integration not operational: {}", e);
    }

    let state = initialize_services(&settings).await?;
    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,varco=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

async fn initialize_services(settings: &Settings) -> Result<AppState> {
    info!("Connecting to PostgreSQL...");
    let db_config = DatabaseConfig {
        url: settings.database.url.clone(),
        max_connections: settings.database.max_connections,
        ..Default::default()
    };
    let db_pool = create_pool(&db_config).await?;
    info!("PostgreSQL connection established");

    varco_db::run_migrations(&db_pool).await?;

    let idp = Arc::new(settings.idp.clone());

    let users = Arc::new(PgUserStore::new(db_pool.clone()));
    let links = Arc::new(PgIdentityLinkStore::new(db_pool.clone()));
    let kv = Arc::new(PgKeyValueStore::new(db_pool.clone()));
    let sessions = SessionManager::new(Arc::new(PgSessionStore::new(db_pool.clone())));

    let gateway = Arc::new(Wso2Gateway::new(idp.clone())?);

    let reconciler = Arc::new(IdentityReconciler::new(
        settings.reconciler.clone(),
        users.clone(),
        links,
    ));

    let redirects = Arc::new(SecureRedirectDispatcher::new(
        settings.server.site_base.clone(),
        &settings.redirect,
    ));

    let flow = Arc::new(LoginFlow::new(
        gateway.clone(),
        reconciler,
        redirects,
    ));

    let probe = build_probe(settings, gateway.clone())?;

    let sync_http = HttpClient::new(false)?;
    let sync_tokens = Arc::new(ApiManagerTokenClient::new(
        settings.sync.clone(),
        sync_http.clone(),
    ));
    let profile_api = Arc::new(HttpCitizenProfileApi::new(
        settings.sync.profile_api_url.clone(),
        sync_http,
    ));
    let sync = Arc::new(ProfileSyncEngine::new(
        settings.sync.clone(),
        users,
        kv,
        sync_tokens,
        profile_api,
    ));

    info!("All services initialized");
    Ok(AppState::new(
        db_pool,
        idp,
        settings.server.site_base.clone(),
        sessions,
        flow,
        probe,
        sync,
        settings.sync.enabled,
    ))
}

fn build_probe(settings: &Settings, gateway: Arc<Wso2Gateway>) -> Result<Arc<SilentSessionProbe>> {
    let accept_invalid = settings.idp.accept_invalid_certs();

    let direct_http = HttpClient::with_timeout(accept_invalid, settings.probe.direct_timeout_secs)?;
    let iframe_http = HttpClient::with_timeout(accept_invalid, settings.probe.iframe_timeout_secs)?;
    let beacon_http = HttpClient::with_timeout(accept_invalid, settings.probe.beacon_timeout_secs)?;

    let strategies: Vec<Arc<dyn ProbeStrategy>> = vec![
        Arc::new(DirectProbe::new(
            direct_http.inner().clone(),
            settings.idp.userinfo_endpoint(),
        )),
        Arc::new(IframeProbe::new(iframe_http.inner().clone(), gateway)),
        Arc::new(BeaconProbe::new(
            beacon_http.inner().clone(),
            settings.idp.userinfo_endpoint(),
        )),
    ];

    Ok(Arc::new(SilentSessionProbe::new(
        settings.probe.clone(),
        strategies,
    )))
}

fn create_app(state: AppState) -> Router {
    varco_api::create_router_with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}
