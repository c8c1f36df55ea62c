// tests/resolver_decode.rs
// Aggregator URL unwrapping: the embedded-anchor strategy against a feed
// fixture, and the base64 payload scan against synthetic ids.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use horn_risk_monitor::ingest::feed::parse_feed;
use horn_risk_monitor::ingest::normalize_item;
use horn_risk_monitor::resolve::{
    needs_resolution, resolve_from_payload, resolve_inline, ResolveOptions,
};
use horn_risk_monitor::sources::{Reliability, Source, SourceCategory};

fn aggregator_source() -> Source {
    Source {
        name: "Google News Sudan".into(),
        url: "https://news.google.com/rss/search?q=sudan".into(),
        category: SourceCategory::General,
        reliability: Reliability::Aggregator,
    }
}

#[test]
fn anchor_in_item_payload_resolves_without_network() {
    let raw = include_str!("fixtures/aggregator_rss.xml");
    let items = parse_feed(raw).expect("parse fixture");
    assert_eq!(items.len(), 1);

    let mut article = normalize_item(&items[0], &aggregator_source(), Utc::now()).expect("article");
    assert!(needs_resolution(&article.url));

    let resolved = resolve_inline(&mut article, &ResolveOptions::default());
    assert!(resolved);
    assert_eq!(
        article.url,
        "https://www.dabangasudan.org/en/all-news/article/el-fasher-market"
    );
}

#[test]
fn payload_decode_finds_url_between_binary_runs() {
    let mut blob = vec![0x08, 0x13, 0x22, 0x2e];
    blob.extend_from_slice(b"https://www.bbc.com/news/world-africa-998877");
    blob.extend_from_slice(&[0xd2, 0x01, 0x00]);
    let id = URL_SAFE_NO_PAD.encode(&blob);

    let url = format!("https://news.google.com/rss/articles/{id}?oc=5");
    assert_eq!(
        resolve_from_payload(&url).as_deref(),
        Some("https://www.bbc.com/news/world-africa-998877")
    );
}

#[test]
fn unresolvable_item_keeps_aggregator_url() {
    let mut article = normalize_item(
        &parse_feed(include_str!("fixtures/aggregator_rss.xml"))
            .unwrap()
            .remove(0),
        &aggregator_source(),
        Utc::now(),
    )
    .expect("article");

    // With the anchor strategy switched off and an undecodable id, the inline
    // pass fails and the article keeps its original URL.
    let opts = ResolveOptions {
        anchor_scan: false,
        payload_decode: true,
        api_decode: false,
        trampoline: false,
    };
    let original = article.url.clone();
    assert!(!resolve_inline(&mut article, &opts));
    assert_eq!(article.url, original);
}
