// src/resolve.rs
//! Aggregator redirect resolution. Google News items carry opaque
//! `/rss/articles/<encoded>` URLs; readers and the image scraper need the
//! real publisher URL. Four strategies run in a fixed cascade, each
//! independently toggleable because the aggregator's formats shift over time.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64_STD;
use base64::Engine as _;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use url::Url;

use crate::ingest::feed::BROWSER_UA;
use crate::ingest::types::Article;

const AGGREGATOR_ROOT: &str = "https://news.google.com/";
const BATCHEXECUTE_URL: &str = "https://news.google.com/_/DotsSplashUi/data/batchexecute";

/// API decode concurrency and pacing.
const API_BATCH: usize = 5;
const API_PAUSE: Duration = Duration::from_millis(200);
/// Trampoline page fetches per batch.
const TRAMPOLINE_BATCH: usize = 10;

/// Domains that are never a publisher destination.
const GOOGLE_FAMILY: &[&str] = &[
    "news.google.com",
    "google.com",
    "googleusercontent.com",
    "gstatic.com",
    "googleapis.com",
    "consent.google.com",
    "youtube.com",
];

static RE_ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<a\b[^>]*\bhref\s*=\s*["'](https?://[^"']+)["']"#).unwrap());
static RE_CANDIDATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://[a-z0-9]").unwrap());
static RE_ANY_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[A-Za-z0-9][^"'\\\s<>]*"#).unwrap());
static RE_META_REFRESH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta[^>]*http-equiv\s*=\s*["']refresh["'][^>]*url\s*=\s*([^"'>\s]+)"#)
        .unwrap()
});
static RE_JS_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)window\.location(?:\.href)?\s*=\s*["']([^"']+)["']"#).unwrap()
});
static RE_DATA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)data-url\s*=\s*["']([^"']+)["']"#).unwrap());

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub anchor_scan: bool,
    pub payload_decode: bool,
    pub api_decode: bool,
    pub trampoline: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            anchor_scan: true,
            payload_decode: true,
            api_decode: true,
            trampoline: true,
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|h| h.to_lowercase())
}

fn is_google_family(url: &str) -> bool {
    match host_of(url) {
        Some(host) => GOOGLE_FAMILY
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}"))),
        None => false,
    }
}

/// True iff the article URL points at the aggregator and needs unwrapping.
pub fn needs_resolution(url: &str) -> bool {
    host_of(url).as_deref() == Some("news.google.com")
}

/// Strategy 1: first `<a href>` in the item payload whose target is not on an
/// aggregator domain.
pub fn resolve_from_anchor(raw_body: &str) -> Option<String> {
    for caps in RE_ANCHOR.captures_iter(raw_body) {
        let target = caps.get(1)?.as_str();
        if !is_google_family(target) {
            return Some(target.to_string());
        }
    }
    None
}

/// The path segment after `/articles/`, used by strategies 2 and 3.
pub fn article_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    while let Some(seg) = segments.next() {
        if seg == "articles" {
            return segments.next().map(|s| s.to_string());
        }
    }
    None
}

/// Strategy 2: base64url-decode the article id and scan the raw bytes for a
/// printable `http...` run.
pub fn resolve_from_payload(url: &str) -> Option<String> {
    let id = article_id(url)?;
    let mut b64 = id.replace('-', "+").replace('_', "/");
    while b64.len() % 4 != 0 {
        b64.push('=');
    }
    let bytes = B64_STD.decode(b64.as_bytes()).ok()?;
    scan_bytes_for_url(&bytes)
}

fn scan_bytes_for_url(bytes: &[u8]) -> Option<String> {
    let mut i = 0;
    while i + 4 <= bytes.len() {
        if &bytes[i..i + 4] == b"http" {
            let mut end = i;
            while end < bytes.len() && (0x21..=0x7e).contains(&bytes[end]) {
                end += 1;
            }
            if let Ok(candidate) = std::str::from_utf8(&bytes[i..end]) {
                if RE_CANDIDATE.is_match(candidate) && !is_google_family(candidate) {
                    return Some(candidate.to_string());
                }
            }
            i = end.max(i + 1);
        } else {
            i += 1;
        }
    }
    None
}

/// Client for the API and trampoline strategies.
pub fn resolver_client() -> anyhow::Result<reqwest::Client> {
    use anyhow::Context as _;
    reqwest::Client::builder()
        .user_agent(BROWSER_UA)
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(8))
        .gzip(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build resolver client")
}

/// Strategy 3: the aggregator's batch-execute endpoint. The inner payload is
/// the `garturlreq` tuple wrapped in an `Fbv4je` envelope; the response wears
/// the standard anti-XSSI prefix.
async fn resolve_via_api(client: &reqwest::Client, url: &str) -> Option<String> {
    let id = article_id(url)?;

    let mut req_params = vec![json!(["en-US", "US", [id]])];
    req_params.extend(std::iter::repeat(Value::Null).take(30));
    let inner = json!(["garturlreq", [req_params]]);
    let envelope = json!([[["Fbv4je", inner.to_string(), Value::Null, "generic"]]]);

    let resp = client
        .post(BATCHEXECUTE_URL)
        .form(&[("f.req", envelope.to_string())])
        .send()
        .await
        .ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let body = resp.text().await.ok()?;
    first_publisher_url(&body)
}

/// Pull the first URL out of an API response that is not on a known Google
/// property. Handles the `)]}'` prefix and JSON escaping.
fn first_publisher_url(body: &str) -> Option<String> {
    let body = body.trim_start_matches(")]}'").replace("\\/", "/");
    RE_ANY_URL
        .find_iter(&body)
        .map(|m| m.as_str().trim_end_matches('\\').to_string())
        .find(|u| !is_google_family(u))
}

/// Strategy 4: fetch the aggregator page itself and look for the usual
/// client-side redirect shapes.
async fn resolve_via_trampoline(client: &reqwest::Client, url: &str) -> Option<String> {
    let resp = client
        .get(url)
        .header(reqwest::header::REFERER, AGGREGATOR_ROOT)
        .send()
        .await
        .ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let html = resp.text().await.ok()?;

    for re in [&*RE_META_REFRESH, &*RE_JS_LOCATION, &*RE_DATA_URL] {
        if let Some(c) = re.captures(&html) {
            let target = c.get(1)?.as_str().trim_matches(|ch| ch == '"' || ch == '\'');
            if target.starts_with("http") && !is_google_family(target) {
                return Some(target.to_string());
            }
        }
    }
    resolve_from_anchor(&html)
}

/// Synchronous pass: strategies 1 and 2 against what the item already carries.
/// Mutates the article in place; returns true when resolved.
pub fn resolve_inline(article: &mut Article, opts: &ResolveOptions) -> bool {
    if !needs_resolution(&article.url) {
        return true;
    }
    if opts.anchor_scan {
        if let Some(real) = resolve_from_anchor(&article.raw_body) {
            article.url = real;
            return true;
        }
    }
    if opts.payload_decode {
        if let Some(real) = resolve_from_payload(&article.url) {
            article.url = real;
            return true;
        }
    }
    false
}

/// Async pass for items still unresolved and needed for image enrichment:
/// API decode in paced batches of 5, then the HTML trampoline in batches of 10.
/// Failures preserve the aggregator URL.
pub async fn resolve_stragglers(
    client: &reqwest::Client,
    articles: &mut [Article],
    opts: &ResolveOptions,
) -> usize {
    let mut pending: Vec<usize> = articles
        .iter()
        .enumerate()
        .filter(|(_, a)| needs_resolution(&a.url) && a.image.is_none())
        .map(|(i, _)| i)
        .collect();
    if pending.is_empty() {
        return 0;
    }

    let mut resolved = 0usize;

    if opts.api_decode {
        let mut still = Vec::new();
        for batch in pending.chunks(API_BATCH) {
            let calls = batch.iter().map(|&i| {
                let url = articles[i].url.clone();
                async move { (i, resolve_via_api(client, &url).await) }
            });
            for (i, found) in join_all(calls).await {
                match found {
                    Some(real) => {
                        articles[i].url = real;
                        resolved += 1;
                    }
                    None => still.push(i),
                }
            }
            tokio::time::sleep(API_PAUSE).await;
        }
        pending = still;
    }

    if opts.trampoline {
        for batch in pending.chunks(TRAMPOLINE_BATCH) {
            let calls = batch.iter().map(|&i| {
                let url = articles[i].url.clone();
                async move { (i, resolve_via_trampoline(client, &url).await) }
            });
            for (i, found) in join_all(calls).await {
                if let Some(real) = found {
                    articles[i].url = real;
                    resolved += 1;
                }
            }
        }
    }

    if resolved > 0 {
        tracing::debug!(resolved, "aggregator URLs unwrapped");
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_is_host_based() {
        assert!(needs_resolution(
            "https://news.google.com/rss/articles/ABC123?oc=5"
        ));
        assert!(!needs_resolution("https://bbc.com/news/world-africa-123"));
    }

    #[test]
    fn anchor_scan_skips_aggregator_links() {
        let body = r#"<a href="https://news.google.com/rss/x">agg</a>
                      <a href="https://bbc.com/news/world-africa-123">real</a>"#;
        assert_eq!(
            resolve_from_anchor(body).as_deref(),
            Some("https://bbc.com/news/world-africa-123")
        );
    }

    #[test]
    fn payload_decode_extracts_embedded_url() {
        // Wrap a real URL in opaque bytes, the way the aggregator ids do.
        let mut blob = vec![0x08u8, 0x13, 0x22, 0x02];
        blob.extend_from_slice(b"https://sudantribune.com/article/12345");
        blob.push(0xd2);
        let id = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&blob);
        let url = format!("https://news.google.com/rss/articles/{id}");
        assert_eq!(
            resolve_from_payload(&url).as_deref(),
            Some("https://sudantribune.com/article/12345")
        );
    }

    #[test]
    fn payload_decode_rejects_google_destinations() {
        let mut blob = Vec::new();
        blob.extend_from_slice(b"https://news.google.com/something");
        blob.push(0x00);
        let id = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&blob);
        let url = format!("https://news.google.com/rss/articles/{id}");
        assert_eq!(resolve_from_payload(&url), None);
    }

    #[test]
    fn api_response_prefix_is_stripped() {
        let body = ")]}'\n123\n[[\"wrb.fr\",\"Fbv4je\",\"[\\\"garturlres\\\",\\\"https:\\/\\/www.dabangasudan.org\\/en\\/all-news\\/article\\/x\\\"]\"]]";
        assert_eq!(
            first_publisher_url(body).as_deref(),
            Some("https://www.dabangasudan.org/en/all-news/article/x")
        );
    }

    #[test]
    fn article_id_path_extraction() {
        assert_eq!(
            article_id("https://news.google.com/rss/articles/XYZ?oc=5").as_deref(),
            Some("XYZ")
        );
        assert_eq!(article_id("https://news.google.com/home"), None);
    }
}
