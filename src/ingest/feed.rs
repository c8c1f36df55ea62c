// src/ingest/feed.rs
//! Feed transport and wire parsing. Real-world feeds arrive with UTF-8 BOMs,
//! stray bytes before the XML declaration, and namespace children the common
//! parsers drop, so parsing is deliberately tolerant: RSS 2.0, RDF 1.0 and
//! Atom all funnel into the same `FeedItem`.

use std::time::Duration;

use anyhow::{Context, Result};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::types::FeedItem;

pub const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, \
application/xml;q=0.9, text/xml;q=0.8, */*;q=0.7";

/// Shared HTTP client for feed fetches: browser-like UA, 10 s budget,
/// redirects followed.
pub fn feed_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(BROWSER_UA)
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(10))
        .gzip(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build feed client")
}

/// GET one feed. Non-2xx is an error; the caller isolates it per source.
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, FEED_ACCEPT)
        .send()
        .await
        .with_context(|| format!("fetch {url}"))?
        .error_for_status()
        .with_context(|| format!("status for {url}"))?;
    let body = resp.text().await.with_context(|| format!("read {url}"))?;
    Ok(body)
}

/// Drop the BOM and anything before the first recognizable feed token.
pub fn strip_preamble(raw: &str) -> &str {
    let s = raw.trim_start_matches('\u{feff}');
    let start = ["<?xml", "<rss", "<feed"]
        .iter()
        .filter_map(|tok| s.find(tok))
        .min();
    match start {
        Some(i) => &s[i..],
        None => s,
    }
}

/// Parse RSS 2.0, RDF 1.0 or Atom into normalized items.
pub fn parse_feed(raw: &str) -> Result<Vec<FeedItem>> {
    let xml = strip_preamble(raw);

    if let Ok(rss) = from_str::<Rss>(xml) {
        if !rss.channel.items.is_empty() {
            return Ok(rss.channel.items.into_iter().map(FeedItem::from).collect());
        }
    }
    if let Ok(rdf) = from_str::<Rdf>(xml) {
        if !rdf.items.is_empty() {
            return Ok(rdf.items.into_iter().map(FeedItem::from).collect());
        }
    }
    let feed: AtomFeed = from_str(xml).context("parse feed as RSS/RDF/Atom")?;
    Ok(feed.entries.into_iter().map(FeedItem::from).collect())
}

/* ----------------------------
RSS 2.0 (and RDF 1.0, which floats items beside the channel)
---------------------------- */

#[derive(Debug, Deserialize)]
struct Rss {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default, rename = "item")]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct Rdf {
    #[serde(default, rename = "item")]
    items: Vec<RssItem>,
}

#[derive(Debug, Default, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    description: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "date")]
    dc_date: Option<String>,
    #[serde(rename = "encoded")]
    content_encoded: Option<String>,
    enclosure: Option<Enclosure>,
    #[serde(default, rename = "content")]
    media_content: Vec<MediaRef>,
    #[serde(default, rename = "thumbnail")]
    media_thumbnail: Vec<MediaRef>,
    #[serde(rename = "group")]
    media_group: Option<MediaGroup>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "@isPermaLink")]
    _is_permalink: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaRef {
    #[serde(rename = "@url")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaGroup {
    #[serde(default, rename = "content")]
    media_content: Vec<MediaRef>,
}

impl From<RssItem> for FeedItem {
    fn from(it: RssItem) -> Self {
        let mut media_content_urls: Vec<String> =
            it.media_content.into_iter().filter_map(|m| m.url).collect();
        if let Some(group) = it.media_group {
            media_content_urls.extend(group.media_content.into_iter().filter_map(|m| m.url));
        }
        FeedItem {
            title: it.title,
            link: it.link,
            guid: it.guid.and_then(|g| g.value),
            description: it.description,
            summary: None,
            content: None,
            content_encoded: it.content_encoded,
            pub_date: it.pub_date,
            iso_date: it.dc_date,
            enclosure_url: it.enclosure.as_ref().and_then(|e| e.url.clone()),
            enclosure_type: it.enclosure.and_then(|e| e.kind),
            media_content_urls,
            media_thumbnail_urls: it
                .media_thumbnail
                .into_iter()
                .filter_map(|m| m.url)
                .collect(),
        }
    }
}

/* ----------------------------
Atom
---------------------------- */

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(default, rename = "entry")]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    id: Option<String>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
    #[serde(default, rename = "link")]
    links: Vec<AtomLink>,
    #[serde(default, rename = "media:content")]
    media_content: Vec<MediaRef>,
    #[serde(default, rename = "media:thumbnail")]
    media_thumbnail: Vec<MediaRef>,
}

/// Atom text constructs may carry a `type` attribute, so a bare `String`
/// mapping would reject them.
#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "@type")]
    _kind: Option<String>,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl From<AtomEntry> for FeedItem {
    fn from(e: AtomEntry) -> Self {
        // Prefer the alternate link; fall back to the first link present.
        let link = e
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .and_then(|l| l.href.clone())
            .or_else(|| e.links.first().and_then(|l| l.href.clone()));
        FeedItem {
            title: e.title.and_then(|t| t.value),
            link,
            guid: e.id,
            description: None,
            summary: e.summary.and_then(|t| t.value),
            content: e.content.and_then(|t| t.value),
            content_encoded: None,
            pub_date: None,
            iso_date: e.published.or(e.updated),
            enclosure_url: None,
            enclosure_type: None,
            media_content_urls: e.media_content.into_iter().filter_map(|m| m.url).collect(),
            media_thumbnail_urls: e
                .media_thumbnail
                .into_iter()
                .filter_map(|m| m.url)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_strip_handles_bom_and_garbage() {
        let raw = "\u{feff}garbage here\n<?xml version=\"1.0\"?><rss/>";
        assert!(strip_preamble(raw).starts_with("<?xml"));
        let raw = "\n\n<rss version=\"2.0\"></rss>";
        assert!(strip_preamble(raw).starts_with("<rss"));
    }

    #[test]
    fn parses_rss_with_media_children() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>t</title>
    <item>
      <title>Clashes in Upper Nile</title>
      <link>https://example.org/a</link>
      <guid isPermaLink="false">tag:1</guid>
      <description>desc</description>
      <pubDate>Mon, 01 Sep 2025 12:00:00 GMT</pubDate>
      <media:content url="https://img.example.org/a.jpg" />
      <media:group>
        <media:content url="https://img.example.org/b.jpg" />
      </media:group>
    </item>
  </channel>
</rss>"#;
        let items = parse_feed(xml).expect("rss parse");
        assert_eq!(items.len(), 1);
        let it = &items[0];
        assert_eq!(it.guid.as_deref(), Some("tag:1"));
        assert_eq!(it.media_content_urls.len(), 2);
        assert_eq!(it.media_content_urls[1], "https://img.example.org/b.jpg");
    }

    #[test]
    fn parses_atom_with_typed_title() {
        let xml = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title type="html">Floods in Jonglei</title>
    <id>urn:uuid:42</id>
    <link rel="alternate" href="https://example.org/b"/>
    <summary>water rising</summary>
    <published>2025-09-01T10:00:00Z</published>
  </entry>
</feed>"#;
        let items = parse_feed(xml).expect("atom parse");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Floods in Jonglei"));
        assert_eq!(items[0].link.as_deref(), Some("https://example.org/b"));
        assert_eq!(items[0].iso_date.as_deref(), Some("2025-09-01T10:00:00Z"));
    }
}
