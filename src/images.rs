// src/images.rs
//! Preview-image policy. The cheap path runs during normalization and only
//! looks at what the feed item already carries; the expensive path fetches
//! publisher pages for og:image metadata and is bounded per cycle.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ingest::feed::BROWSER_UA;
use crate::ingest::types::{Article, FeedItem};

/// Per-cycle cap on page scrapes.
pub const MAX_SCRAPE_CANDIDATES: usize = 60;
/// Concurrent page scrapes per batch.
pub const SCRAPE_BATCH: usize = 10;
/// Only the head of the page is needed for og/twitter meta.
const SCRAPE_HEAD_BYTES: usize = 50 * 1024;

static RE_IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img\b[^>]*\bsrc\s*=\s*["']([^"']+)["'][^>]*>"#).unwrap());
static RE_OG_PROP_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta\b[^>]*property\s*=\s*["']og:image["'][^>]*content\s*=\s*["']([^"']+)["']"#)
        .unwrap()
});
static RE_OG_CONTENT_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta\b[^>]*content\s*=\s*["']([^"']+)["'][^>]*property\s*=\s*["']og:image["']"#)
        .unwrap()
});
static RE_TWITTER_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<meta\b[^>]*(?:name|property)\s*=\s*["']twitter:image["'][^>]*content\s*=\s*["']([^"']+)["']"#,
    )
    .unwrap()
});

/// Upgrade protocol-relative URLs; reject anything that is not http(s).
fn normalize_image_url(url: &str) -> Option<String> {
    let url = url.trim();
    if let Some(rest) = url.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Some(url.to_string());
    }
    None
}

fn looks_like_tracking_pixel(tag: &str) -> bool {
    let t = tag.to_lowercase();
    (t.contains("width=\"1\"") || t.contains("width='1'") || t.contains("width=1 "))
        && (t.contains("height=\"1\"") || t.contains("height='1'") || t.contains("height=1"))
}

/// Synchronous extraction from the feed item itself, in priority order.
pub fn image_from_item(item: &FeedItem) -> Option<String> {
    // 1) Typed image enclosure wins.
    if let (Some(url), Some(kind)) = (&item.enclosure_url, &item.enclosure_type) {
        if kind.starts_with("image") {
            if let Some(u) = normalize_image_url(url) {
                return Some(u);
            }
        }
    }

    // 2) Media-RSS children (media:group content was merged in at parse time).
    for url in item
        .media_content_urls
        .iter()
        .chain(item.media_thumbnail_urls.iter())
    {
        if let Some(u) = normalize_image_url(url) {
            return Some(u);
        }
    }

    // 3) Typeless enclosure.
    if let Some(url) = &item.enclosure_url {
        if let Some(u) = normalize_image_url(url) {
            return Some(u);
        }
    }

    // 4) First <img> in the markup-bearing fields, skipping tracking pixels.
    for field in [
        item.content_encoded.as_deref(),
        item.content.as_deref(),
        item.description.as_deref(),
        item.summary.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        for caps in RE_IMG_TAG.captures_iter(field) {
            let tag = caps.get(0).map(|m| m.as_str()).unwrap_or("");
            if looks_like_tracking_pixel(tag) {
                continue;
            }
            if let Some(u) = caps.get(1).and_then(|m| normalize_image_url(m.as_str())) {
                return Some(u);
            }
        }
    }

    None
}

/// Client used for publisher-page scrapes: tighter budget than feed fetches.
pub fn scrape_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(BROWSER_UA)
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(8))
        .gzip(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build scrape client")
}

fn og_image_from_html(html: &str) -> Option<String> {
    RE_OG_PROP_FIRST
        .captures(html)
        .or_else(|| RE_OG_CONTENT_FIRST.captures(html))
        .or_else(|| RE_TWITTER_IMAGE.captures(html))
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
        .and_then(|u| normalize_image_url(&u))
}

/// Fetch the article page and pull og:image / twitter:image out of the head.
/// Best-effort: any transport or parse trouble yields `None`.
async fn scrape_og_image(client: &reqwest::Client, url: &str) -> Option<String> {
    let resp = client.get(url).send().await.ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let mut head = Vec::with_capacity(SCRAPE_HEAD_BYTES);
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.ok()?;
        head.extend_from_slice(&chunk);
        if head.len() >= SCRAPE_HEAD_BYTES {
            break;
        }
    }
    let html = String::from_utf8_lossy(&head);
    og_image_from_html(&html)
}

/// Async fallback pass over articles that are still imageless. Bounded to
/// `MAX_SCRAPE_CANDIDATES` per run, `SCRAPE_BATCH` pages in flight.
pub async fn enrich_images(client: &reqwest::Client, articles: &mut [Article]) -> usize {
    let candidates: Vec<usize> = articles
        .iter()
        .enumerate()
        .filter(|(_, a)| a.image.is_none())
        .map(|(i, _)| i)
        .take(MAX_SCRAPE_CANDIDATES)
        .collect();

    let mut enriched = 0usize;
    for batch in candidates.chunks(SCRAPE_BATCH) {
        let fetches = batch.iter().map(|&i| {
            let url = articles[i].url.clone();
            async move { (i, scrape_og_image(client, &url).await) }
        });
        for (i, found) in join_all(fetches).await {
            if let Some(img) = found {
                articles[i].image = Some(img);
                enriched += 1;
            }
        }
    }
    if enriched > 0 {
        tracing::debug!(enriched, "image enrichment pass complete");
    }
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_enclosure_beats_media() {
        let item = FeedItem {
            enclosure_url: Some("https://cdn.example.org/a.jpg".into()),
            enclosure_type: Some("image/jpeg".into()),
            media_content_urls: vec!["https://cdn.example.org/b.jpg".into()],
            ..Default::default()
        };
        assert_eq!(
            image_from_item(&item).as_deref(),
            Some("https://cdn.example.org/a.jpg")
        );
    }

    #[test]
    fn tracking_pixel_is_skipped() {
        let item = FeedItem {
            description: Some(
                r#"<img src="https://t.example.org/p.gif" width="1" height="1">
                   <img src="//cdn.example.org/real.png">"#
                    .into(),
            ),
            ..Default::default()
        };
        assert_eq!(
            image_from_item(&item).as_deref(),
            Some("https://cdn.example.org/real.png")
        );
    }

    #[test]
    fn non_http_schemes_rejected() {
        let item = FeedItem {
            description: Some(r#"<img src="data:image/gif;base64,AAAA">"#.into()),
            ..Default::default()
        };
        assert_eq!(image_from_item(&item), None);
    }

    #[test]
    fn og_image_both_attribute_orders() {
        let a = r#"<meta property="og:image" content="https://x.example/i.jpg">"#;
        let b = r#"<meta content="//x.example/j.jpg" property="og:image">"#;
        assert_eq!(
            og_image_from_html(a).as_deref(),
            Some("https://x.example/i.jpg")
        );
        assert_eq!(
            og_image_from_html(b).as_deref(),
            Some("https://x.example/j.jpg")
        );
    }

    #[test]
    fn twitter_image_fallback() {
        let html = r#"<meta name="twitter:image" content="https://x.example/t.jpg">"#;
        assert_eq!(
            og_image_from_html(html).as_deref(),
            Some("https://x.example/t.jpg")
        );
    }
}
