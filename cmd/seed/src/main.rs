//! Opens threads on a fresh board so the first poster has something to be
//! shown. Threads are attributed to the anonymous identity, which no caller
//! resolves to, so they are never excluded from selection.

use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use configs::Settings;
use domains::{BoardStore, IdentityKey, NewPost};
use secrecy::ExposeSecret;
use storage_adapters::PgBoardStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "seed", about = "Open one or more threads on the board")]
struct Args {
    /// Text of each opening post.
    #[arg(default_value = "Say something.")]
    content: Vec<String>,

    /// Overrides `database.url` from the settings.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = Settings::load().context("loading settings")?;
    let url = match (&args.database_url, &settings.database.url) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url.expose_secret().to_string(),
        (None, None) => anyhow::bail!("no database configured; set DIALECT__DATABASE__URL"),
    };

    let store = PgBoardStore::connect(
        &url,
        settings.database.max_connections,
        Duration::from_secs(settings.database.timeout_secs),
    )
    .await?;
    store.migrate().await?;

    let author = IdentityKey::new(settings.content.anonymous_identity.clone());
    let mut tx = store.begin().await?;
    for content in args.content {
        let root = services::thread::append_post(
            tx.as_mut(),
            NewPost { timestamp: Utc::now(), content, author: author.clone() },
            None,
        )
        .await?;
        info!(id = root.id, path = %root.path, "thread opened");
    }
    tx.commit().await?;
    Ok(())
}
