use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{anyhow, Context};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stream_service::config::{Config, CorsConfig, ProviderKind, StoreBackend};
use stream_service::db::{
    pool, CredentialDirectory, MemoryDirectory, MemoryStore, PgDirectory, PgStreamStore,
    ProjectDirectory, StreamStore,
};
use stream_service::providers::{
    janus::JanusProvider, livepeer::LivepeerProvider, resilient::ResilientProvider, MediaProvider,
};
use stream_service::security::{TokenService, WebhookVerifier};
use stream_service::services::{LifecycleService, Reconciler};
use stream_service::{configure, AppState};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,actix_web=info,sqlx=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_cors(config: &CorsConfig) -> Cors {
    let mut cors = Cors::default();
    for origin in &config.allowed_origins {
        if origin == "*" {
            cors = cors.allow_any_origin();
        } else {
            cors = cors.allowed_origin(origin);
        }
    }
    cors.allow_any_method().allow_any_header().max_age(3600)
}

type Backends = (
    Arc<dyn StreamStore>,
    Arc<dyn ProjectDirectory>,
    Arc<dyn CredentialDirectory>,
);

async fn build_store(config: &Config) -> anyhow::Result<Backends> {
    match config.database.backend {
        StoreBackend::Postgres => {
            let db = pool::create_pool(&config.database)
                .await
                .context("Failed to create database pool")?;
            if config.database.run_migrations {
                pool::migrate(&db).await.context("Failed to run migrations")?;
                info!("Database migrations applied");
            }
            let directory = Arc::new(PgDirectory::new(db.clone()));
            let store: Arc<dyn StreamStore> = Arc::new(PgStreamStore::new(db));
            let projects: Arc<dyn ProjectDirectory> = directory.clone();
            let credentials: Arc<dyn CredentialDirectory> = directory;
            Ok((store, projects, credentials))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; streams are lost on restart");
            let directory = Arc::new(MemoryDirectory::new());
            let store: Arc<dyn StreamStore> = Arc::new(MemoryStore::new());
            let projects: Arc<dyn ProjectDirectory> = directory.clone();
            let credentials: Arc<dyn CredentialDirectory> = directory;
            Ok((store, projects, credentials))
        }
    }
}

fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn MediaProvider>> {
    let settings = &config.provider;
    let inner: Arc<dyn MediaProvider> = match settings.kind {
        ProviderKind::Livepeer => Arc::new(
            LivepeerProvider::new(
                settings.livepeer_api_url.clone(),
                settings.livepeer_api_key.clone(),
                settings.timeout(),
            )
            .context("Failed to build Livepeer client")?,
        ),
        ProviderKind::Janus => Arc::new(
            JanusProvider::new(
                settings.janus_server_url.clone(),
                settings.janus_api_secret.clone(),
                settings.janus_room_id,
                settings.timeout(),
            )
            .context("Failed to build Janus client")?,
        ),
    };

    let policy = resilience::presets::from_settings(
        settings.timeout(),
        settings.max_retries,
        settings.initial_backoff(),
    );
    info!(provider = inner.name(), "Media provider configured");
    Ok(Arc::new(ResilientProvider::new(inner, policy)))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().map_err(|e| anyhow!(e))?;
    info!(env = %config.app.env, "Starting stream-service");

    let (store, projects, credentials) = build_store(&config).await?;
    let provider = build_provider(&config)?;

    let lifecycle = Arc::new(LifecycleService::new(
        store,
        provider,
        projects.clone(),
        credentials,
        config.provider.livepeer_webhook_id.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_handle = if config.reconciler.enabled {
        let reconciler = Arc::new(Reconciler::new(lifecycle.clone(), config.reconciler.clone()));
        Some(reconciler.spawn(shutdown_rx))
    } else {
        info!("Intent reconciler disabled");
        None
    };

    if config.webhook.shared_secret.is_none() {
        warn!("LIVEPEER_SHARED_SECRET not set; provider webhooks will be rejected");
    }

    let state = web::Data::new(AppState {
        lifecycle,
        projects,
        tokens: TokenService::new(&config.auth.jwt_secret, config.auth.access_token_ttl_secs),
        webhooks: WebhookVerifier::new(
            config.webhook.shared_secret.clone(),
            config.webhook.tolerance_secs,
        ),
    });

    let bind_addr = format!("{}:{}", config.app.host, config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    let cors_config = config.cors.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_config))
            .wrap(Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(|cfg| configure(cfg, state.clone()))
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind on {bind_addr}"))?
    .run()
    .await
    .context("HTTP server error");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = reconciler_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Intent reconciler task ended abnormally");
        }
    }

    info!("stream-service stopped");
    server
}
