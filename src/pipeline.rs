// src/pipeline.rs
//! Cycle orchestration: ingest → resolve → enrich → cluster → cache →
//! extract. Component failures shrink the feed; they never fail the cycle.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;

use crate::cluster::{cluster_articles, Cluster};
use crate::config::AppConfig;
use crate::digest::{build_digest, render, windows_for_date, Digest};
use crate::extract::llm::HttpChatClient;
use crate::extract::{ExtractionStats, Extractor};
use crate::feed_cache::FeedCache;
use crate::images;
use crate::ingest;
use crate::notify::email::EmailSender;
use crate::resolve::{self, ResolveOptions};
use crate::sources::{default_sources, Source};
use crate::store::EventStore;

#[derive(Debug, Default, Clone, Copy)]
pub struct CycleSummary {
    pub articles: usize,
    pub clusters: usize,
    pub extraction: ExtractionStats,
}

pub struct Pipeline {
    feed_client: reqwest::Client,
    scrape_client: reqwest::Client,
    resolver_client: reqwest::Client,
    sources: Vec<Source>,
    db: Arc<EventStore>,
    cache: Arc<FeedCache>,
    extractor: Option<Extractor>,
    resolve_opts: ResolveOptions,
    mailer: Option<EmailSender>,
    recipients: Vec<String>,
}

impl Pipeline {
    pub fn new(cfg: &AppConfig, db: Arc<EventStore>, cache: Arc<FeedCache>) -> Result<Self> {
        let extractor = match &cfg.llm_api_key {
            Some(key) => {
                let client = HttpChatClient::new(&cfg.llm_api_url, key, &cfg.llm_model)
                    .map_err(|e| anyhow::anyhow!("build llm client: {e}"))?;
                Some(Extractor::new(Arc::new(client)))
            }
            None => {
                tracing::info!("LLM key absent, extraction disabled");
                None
            }
        };

        let mailer = match &cfg.smtp {
            Some(smtp) => Some(EmailSender::new(smtp).context("configure smtp")?),
            None => {
                tracing::info!("SMTP absent, weekly send disabled");
                None
            }
        };

        Ok(Self {
            feed_client: ingest::feed::feed_client()?,
            scrape_client: images::scrape_client()?,
            resolver_client: resolve::resolver_client()?,
            sources: default_sources(),
            db,
            cache,
            extractor,
            resolve_opts: ResolveOptions::default(),
            mailer,
            recipients: cfg.digest_recipients.clone(),
        })
    }

    pub fn store(&self) -> &EventStore {
        &self.db
    }

    /// One full ingest-to-extract cycle.
    pub async fn run_cycle(&self) -> CycleSummary {
        // 1) Fetch, filter, window.
        let mut articles = ingest::run_once(&self.feed_client, &self.sources).await;

        // 2) Unwrap aggregator URLs: cheap strategies inline, network
        //    strategies only for items that still need an image.
        for article in articles.iter_mut() {
            resolve::resolve_inline(article, &self.resolve_opts);
        }
        resolve::resolve_stragglers(&self.resolver_client, &mut articles, &self.resolve_opts)
            .await;

        // 3) Preview images for whatever the feeds did not provide.
        images::enrich_images(&self.scrape_client, &mut articles).await;

        // 4) Cluster and publish the feed snapshot.
        let clusters = cluster_articles(articles);
        self.cache.put_feed(clusters.clone());

        // 5) Extract structured events for new clusters.
        let extraction = match &self.extractor {
            Some(extractor) => extractor.run_pending(&self.db, &clusters).await,
            None => ExtractionStats::default(),
        };

        let summary = CycleSummary {
            articles: clusters.iter().map(|c| c.articles.len()).sum(),
            clusters: clusters.len(),
            extraction,
        };
        tracing::info!(
            articles = summary.articles,
            clusters = summary.clusters,
            accepted = extraction.accepted,
            quarantined = extraction.quarantined,
            "cycle complete"
        );
        summary
    }

    /// The clustered feed as the API layer sees it: cache first, recompute on miss.
    pub fn current_feed(&self) -> Vec<Cluster> {
        self.cache.feed().unwrap_or_default()
    }

    /// Build this week's digest from the store.
    pub fn build_weekly_digest(&self) -> Result<Digest> {
        let windows = windows_for_date(Local::now().date_naive());
        let this_week = self
            .db
            .events_in_window(windows.this_week.start, windows.this_week.end)?;
        let last_week = self
            .db
            .events_in_window(windows.last_week.start, windows.last_week.end)?;
        Ok(build_digest(&windows, &this_week, &last_week))
    }

    /// Build, log and (when SMTP is configured) dispatch the weekly digest.
    pub async fn run_weekly_digest(&self) -> Result<Digest> {
        let digest = self.build_weekly_digest()?;
        tracing::info!(
            week = digest.week_number,
            events = digest.topline.total_this_week,
            high_severity = digest.high_severity.len(),
            "weekly digest built"
        );
        tracing::debug!("\n{}", render::render_text(&digest));

        if let Some(mailer) = &self.mailer {
            if self.recipients.is_empty() {
                tracing::info!("no digest recipients configured, skipping send");
            } else {
                mailer.send_digest(&self.db, &digest, &self.recipients).await;
            }
        }
        Ok(digest)
    }
}
