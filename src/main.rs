//! # Horn Risk Monitor — Binary Entrypoint
//! Boots the ingestion pipeline and the two periodic drivers:
//! - every 15 minutes: re-ingest feeds and extract pending clusters
//! - Monday 07:00 server-local: build and dispatch the weekly Risk Delta
//!
//! Only store corruption at startup is fatal; everything else degrades to a
//! thinner feed.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use horn_risk_monitor::config::AppConfig;
use horn_risk_monitor::feed_cache::FeedCache;
use horn_risk_monitor::pipeline::Pipeline;
use horn_risk_monitor::schedule;
use horn_risk_monitor::store::EventStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = AppConfig::from_env();
    tracing::info!(
        extraction = cfg.extraction_enabled(),
        email = cfg.email_enabled(),
        db = %cfg.db_path.display(),
        "starting horn-risk-monitor"
    );

    if let Some(parent) = cfg.db_path.parent() {
        std::fs::create_dir_all(parent).context("create data directory")?;
    }
    let db = Arc::new(EventStore::open(&cfg.db_path)?);
    let cache = Arc::new(FeedCache::default());
    let pipeline = Arc::new(Pipeline::new(&cfg, db, cache)?);

    // First cycle immediately; the interval driver takes over afterwards.
    pipeline.run_cycle().await;

    let ingest_task = schedule::spawn_ingest_scheduler(pipeline.clone());
    let weekly_task = schedule::spawn_weekly_scheduler(pipeline.clone());

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    tracing::info!("shutting down");
    ingest_task.abort();
    weekly_task.abort();
    Ok(())
}
