// src/ingest/mod.rs
pub mod feed;
pub mod types;

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::images;
use crate::ingest::types::{Article, FeedItem};
use crate::relevance;
use crate::sources::Source;

/// Articles older than this are dropped after aggregation.
pub const WINDOW_DAYS: i64 = 7;
/// Description cap after HTML stripping.
const DESCRIPTION_MAX: usize = 500;

/// One-time metrics registration (so series show up with help text).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Feed items parsed across all sources.");
        describe_counter!("ingest_relevant_total", "Items kept by the relevance gate.");
        describe_counter!(
            "ingest_source_errors_total",
            "Sources that failed to fetch or parse this cycle."
        );
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix timestamp of the last completed ingest."
        );
    });
}

/// Strip tags and entities, collapse whitespace. Feeds embed everything from
/// `&nbsp;` runs to full article markup in their descriptions.
pub fn strip_html(s: &str) -> String {
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());

    let decoded = html_escape::decode_html_entities(s).replace('\u{a0}', " ");
    let stripped = re_tags.replace_all(&decoded, "");
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// publishedAt fallback chain: isoDate | pubDate | now.
fn parse_published_at(item: &FeedItem, now: DateTime<Utc>) -> DateTime<Utc> {
    if let Some(iso) = &item.iso_date {
        if let Ok(dt) = DateTime::parse_from_rfc3339(iso.trim()) {
            return dt.with_timezone(&Utc);
        }
    }
    if let Some(rfc2822) = &item.pub_date {
        if let Ok(dt) = time::OffsetDateTime::parse(
            rfc2822.trim(),
            &time::format_description::well_known::Rfc2822,
        ) {
            if let Some(parsed) = DateTime::from_timestamp(dt.unix_timestamp(), 0) {
                return parsed;
            }
        }
    }
    now
}

/// Build one Article. Items without a usable title or URL are dropped.
pub fn normalize_item(item: &FeedItem, source: &Source, now: DateTime<Utc>) -> Option<Article> {
    let title = item.title.as_deref().map(strip_html).unwrap_or_default();
    let url = item.link.clone().unwrap_or_default();
    if title.is_empty() || url.is_empty() {
        return None;
    }

    // id fallback chain is guid | url | source||title; the last leg only
    // matters for feeds with neither, which the title/url guard already drops.
    let id = item
        .guid
        .clone()
        .filter(|g| !g.trim().is_empty())
        .unwrap_or_else(|| url.clone());

    let description = truncate_chars(&strip_html(item.best_snippet()), DESCRIPTION_MAX);
    let raw_body: String = item.payload_fields().collect::<Vec<_>>().join(" ");

    Some(Article {
        id,
        title,
        description,
        url,
        image: images::image_from_item(item),
        published_at: parse_published_at(item, now),
        source: source.name.clone(),
        source_category: source.category,
        source_reliability: source.reliability,
        raw_body,
    })
}

/// Fetch and parse one source. Failures are the caller's to log; the batch
/// never dies with a single feed.
async fn ingest_source(client: &reqwest::Client, source: &Source) -> anyhow::Result<Vec<FeedItem>> {
    let body = feed::fetch_feed(client, &source.url).await?;
    feed::parse_feed(&body)
}

/// Run one full ingestion pass: every source in parallel, relevance filter,
/// newest-first ordering, 7-day window, id dedup.
pub async fn run_once(client: &reqwest::Client, sources: &[Source]) -> Vec<Article> {
    ensure_metrics_described();
    let now = Utc::now();

    let fetches = sources.iter().map(|source| async move {
        match ingest_source(client, source).await {
            Ok(items) => (source, items),
            Err(e) => {
                tracing::warn!(source = %source.name, error = ?e, "source failed, skipping");
                counter!("ingest_source_errors_total").increment(1);
                (source, Vec::new())
            }
        }
    });

    let mut articles: Vec<Article> = Vec::new();
    for (source, items) in join_all(fetches).await {
        counter!("ingest_items_total").increment(items.len() as u64);
        for item in &items {
            let title = item.title.as_deref().unwrap_or("");
            if !relevance::is_relevant(title, &item.filter_body()) {
                continue;
            }
            if let Some(article) = normalize_item(item, source, now) {
                articles.push(article);
            }
        }
    }

    // Newest first, then the time window, then id dedup (a story syndicated
    // into two feeds keeps its first, most reliable-ordered occurrence).
    articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    let cutoff = now - Duration::days(WINDOW_DAYS);
    articles.retain(|a| a.published_at >= cutoff);

    let mut seen: HashSet<String> = HashSet::new();
    articles.retain(|a| seen.insert(a.id.clone()));

    counter!("ingest_relevant_total").increment(articles.len() as u64);
    gauge!("ingest_last_run_ts").set(now.timestamp() as f64);
    tracing::info!(kept = articles.len(), sources = sources.len(), "ingest pass complete");

    articles
}
