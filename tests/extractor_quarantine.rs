// tests/extractor_quarantine.rs
// The extractor against a scripted client: accept path, hard-reject path,
// dedup gate, and rate-limit retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use horn_risk_monitor::cluster::cluster_articles;
use horn_risk_monitor::event::EventType;
use horn_risk_monitor::extract::llm::{LlmError, MockChatClient};
use horn_risk_monitor::extract::Extractor;
use horn_risk_monitor::ingest::types::Article;
use horn_risk_monitor::sources::{Reliability, SourceCategory, SourceTier};
use horn_risk_monitor::store::EventStore;

fn article(title: &str, source: &str, rel: Reliability) -> Article {
    Article {
        id: format!("{source}|{title}"),
        title: title.to_string(),
        description: "Shelling hit a market district, residents fled.".into(),
        url: format!("https://example.org/{}", title.len()),
        image: None,
        published_at: Utc.timestamp_opt(1_780_000_000, 0).unwrap(),
        source: source.to_string(),
        source_category: SourceCategory::Regional,
        source_reliability: rel,
        raw_body: String::new(),
    }
}

fn fast(extractor: Extractor) -> Extractor {
    extractor.with_pacing(Duration::from_millis(0), Duration::from_millis(1))
}

const GOOD_PAYLOAD: &str = r#"{
    "summary": "RSF shelled a market in El Fasher, killing dozens",
    "country": "Sudan",
    "regions": ["El Fasher"],
    "eventType": "security",
    "eventSubtype": "shelling",
    "severity": 5,
    "scope": "local",
    "verificationStatus": "reported",
    "confidence": 0.9,
    "actors": ["rsf", "Sudanese Army"],
    "rationale": "two outlets report artillery impacts"
}"#;

#[tokio::test]
async fn valid_extraction_is_persisted_with_provenance() {
    let db = EventStore::open_in_memory().unwrap();
    let clusters = cluster_articles(vec![
        article("RSF shells El Fasher market", "Radio Dabanga", Reliability::Medium),
        article("El Fasher market shelled by RSF", "Sudan Tribune", Reliability::Medium),
    ]);
    assert_eq!(clusters.len(), 1);

    let client = Arc::new(MockChatClient::new(vec![Ok(format!(
        "```json\n{GOOD_PAYLOAD}\n```"
    ))]));
    let extractor = fast(Extractor::new(client.clone()));

    let stats = extractor.run_pending(&db, &clusters).await;
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.quarantined, 0);

    let event = db
        .get_event_by_cluster_hash(&clusters[0].cluster_hash)
        .unwrap()
        .expect("persisted event");
    assert_eq!(event.event_type, EventType::Security);
    assert_eq!(event.severity, 5);
    assert_eq!(event.article_count, 2);
    assert_eq!(event.source_tier, SourceTier::Tier2);
    assert_eq!(event.model_version, "mock-model");
    assert_eq!(event.prompt_version, "v3");
    // Alias table folds the lowercase wire name onto the canonical actor.
    assert!(event
        .actors_normalized
        .contains(&"Rapid Support Forces".to_string()));
    assert!(event
        .actors_normalized
        .contains(&"Sudanese Armed Forces".to_string()));
}

#[tokio::test]
async fn null_country_quarantines_and_events_stay_empty() {
    let db = EventStore::open_in_memory().unwrap();
    let clusters = cluster_articles(vec![article(
        "Unrest reported near Nyala airport",
        "Eye Radio",
        Reliability::Medium,
    )]);

    let bad = r#"{"country": null, "eventType": "security", "severity": 4}"#;
    let client = Arc::new(MockChatClient::new(vec![Ok(bad.to_string())]));
    let extractor = fast(Extractor::new(client));

    let stats = extractor.run_pending(&db, &clusters).await;
    assert_eq!(stats.accepted, 0);
    assert_eq!(stats.quarantined, 1);
    assert!(db
        .get_event_by_cluster_hash(&clusters[0].cluster_hash)
        .unwrap()
        .is_none());
    // The hash still gates: the quarantine row counts as extracted.
    assert!(db.exists(&clusters[0].cluster_hash).unwrap());
}

#[tokio::test]
async fn known_hash_never_reaches_the_model() {
    let db = EventStore::open_in_memory().unwrap();
    let clusters = cluster_articles(vec![
        article("Floods displace thousands in Bor", "Radio Tamazuj", Reliability::Medium),
    ]);

    let first = Arc::new(MockChatClient::new(vec![Ok(GOOD_PAYLOAD.to_string())]));
    fast(Extractor::new(first.clone())).run_pending(&db, &clusters).await;
    assert_eq!(first.call_count(), 1);

    // Second cycle, same cluster set: the store short-circuits before the LLM.
    let second = Arc::new(MockChatClient::new(vec![Ok(GOOD_PAYLOAD.to_string())]));
    let stats = fast(Extractor::new(second.clone())).run_pending(&db, &clusters).await;
    assert_eq!(second.call_count(), 0);
    assert_eq!(stats.skipped, 1);
}

#[tokio::test]
async fn rate_limit_retries_then_succeeds() {
    let db = EventStore::open_in_memory().unwrap();
    let clusters = cluster_articles(vec![article(
        "Cholera outbreak spreads in Malakal camps",
        "ReliefWeb South Sudan",
        Reliability::High,
    )]);

    let client = Arc::new(MockChatClient::new(vec![
        Err(LlmError::RateLimited("http 429".into())),
        Err(LlmError::Api("upstream 429 again".into())),
        Ok(GOOD_PAYLOAD.to_string()),
    ]));
    let extractor = fast(Extractor::new(client.clone()));

    let stats = extractor.run_pending(&db, &clusters).await;
    assert_eq!(client.call_count(), 3);
    assert_eq!(stats.accepted, 1);
}

#[tokio::test]
async fn unparseable_output_lands_in_quarantine_with_raw_text() {
    let db = EventStore::open_in_memory().unwrap();
    let clusters = cluster_articles(vec![article(
        "Parliament delays budget vote in Juba",
        "Eye Radio",
        Reliability::Medium,
    )]);

    let client = Arc::new(MockChatClient::new(vec![Ok(
        "I cannot produce JSON for this story.".to_string(),
    )]));
    let stats = fast(Extractor::new(client)).run_pending(&db, &clusters).await;
    assert_eq!(stats.quarantined, 1);
    assert!(db.exists(&clusters[0].cluster_hash).unwrap());
}
