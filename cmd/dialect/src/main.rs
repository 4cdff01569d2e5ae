//! # Dialect Binary
//!
//! Assembles the board from settings and serves it until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api_adapters::{router, AppState, Metrics};
use auth_adapters::{AddressIdentityResolver, HttpCaptchaVerifier, HttpReputationChecker};
use axum::http::HeaderName;
use chrono::TimeDelta;
use configs::{DatabaseSettings, Settings};
use domains::{BoardStore, IdentityKey, SystemClock};
use services::{BoardService, ContentFilter, IdentityLedger, LedgerPolicy, ReputationGate};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(settings.log.json, &settings.log.level);

    let store = open_store(&settings.database).await?;
    let remote_timeout = Duration::from_secs(settings.remote.timeout_secs);
    let bind_address = settings.bind_address();

    let forwarded_header = settings
        .identity
        .forwarded_header
        .as_deref()
        .map(HeaderName::try_from)
        .transpose()
        .context("identity.forwarded_header is not a valid header name")?;
    let resolver =
        AddressIdentityResolver::new(settings.identity.loopback_alias.as_deref().map(IdentityKey::new));

    let gate = ReputationGate::new(
        Arc::new(HttpReputationChecker::new(
            settings.reputation.url,
            settings.reputation.contact,
            remote_timeout,
        )?),
        Arc::new(HttpCaptchaVerifier::new(
            settings.captcha.verify_url,
            settings.captcha.secret,
            remote_timeout,
        )?),
        settings.trust.reputation_deny_above,
    );
    let filter = ContentFilter::new(
        &settings.content.blacklist,
        settings.content.anonymous_marker,
        IdentityKey::new(settings.content.anonymous_identity),
    );
    let ledger = IdentityLedger::new(LedgerPolicy {
        post_cooldown: TimeDelta::seconds(i64::from(settings.trust.post_cooldown_secs)),
        captcha_probability: settings.trust.captcha_probability,
    });

    let board = BoardService::new(store, gate, filter, ledger, Arc::new(SystemClock));
    let state = Arc::new(AppState {
        board,
        resolver: Arc::new(resolver),
        forwarded_header,
        metrics: Metrics::new(),
    });

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!(address = %bind_address, "dialect listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving http")?;

    info!("dialect stopped");
    Ok(())
}

fn init_tracing(json: bool, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

#[cfg(feature = "db-postgres")]
async fn open_store(database: &DatabaseSettings) -> anyhow::Result<Arc<dyn BoardStore>> {
    use secrecy::ExposeSecret;
    use storage_adapters::PgBoardStore;

    let Some(url) = database.url.as_ref() else {
        return Ok(in_memory());
    };
    let store = PgBoardStore::connect(
        url.expose_secret(),
        database.max_connections,
        Duration::from_secs(database.timeout_secs),
    )
    .await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "db-postgres"))]
async fn open_store(database: &DatabaseSettings) -> anyhow::Result<Arc<dyn BoardStore>> {
    if database.url.is_some() {
        anyhow::bail!("database.url is set but this build has no db-postgres support");
    }
    Ok(in_memory())
}

fn in_memory() -> Arc<dyn BoardStore> {
    warn!("no database.url configured; posts live in memory and vanish on exit");
    Arc::new(storage_adapters::InMemoryBoardStore::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
