// src/extract/prompt.rs
//! The schema prompt. Stamped onto every event as provenance, so bump the
//! version whenever the wording changes; old events stay valid but can be
//! filtered out of aggregations by version.

use crate::cluster::Cluster;

pub const PROMPT_VERSION: &str = "v3";

pub const SYSTEM_PROMPT: &str = r#"You are an analyst extracting structured security and humanitarian events for South Sudan and Sudan.

Given one news story (possibly reported by several outlets), return a SINGLE JSON object with EXACTLY these fields and nothing else — no markdown, no prose:

{
  "summary": "one factual sentence describing the event",
  "country": "South Sudan" | "Sudan",
  "regions": ["admin region or locality names"],
  "eventType": "security" | "political" | "economic" | "humanitarian" | "infrastructure" | "legal",
  "eventSubtype": "short lowercase slug, e.g. airstrike, cabinet_reshuffle, cholera_outbreak",
  "severity": 1-5,
  "scope": "local" | "state" | "national" | "cross_border",
  "verificationStatus": "confirmed" | "reported" | "unverified",
  "confidence": 0.0-1.0,
  "actors": ["named organizations, forces or officials involved"],
  "rationale": "one short clause naming the decisive fact"
}

Severity ladder:
1 = routine (statements, meetings, appointments)
2 = notable (protests, localized disruption, minor incidents)
3 = serious (armed clashes with casualties, displacement, major arrests)
4 = severe (mass-casualty attacks, large displacement, state-level crises)
5 = critical (massacres, city-scale offensives, famine declarations)

South Sudan admin regions: Central Equatoria, Eastern Equatoria, Western Equatoria, Jonglei, Unity, Upper Nile, Lakes, Warrap, Western Bahr el Ghazal, Northern Bahr el Ghazal, Abyei.
Sudan admin regions: Khartoum, North Darfur, South Darfur, West Darfur, Central Darfur, East Darfur, North Kordofan, South Kordofan, West Kordofan, Gezira, Red Sea, Kassala, Blue Nile, White Nile, River Nile, Northern, Sennar, Gedaref.
Use locality names (e.g. El Fasher, Malakal) in regions when the story is that specific.

Set verificationStatus to "confirmed" only when multiple independent outlets or an official statement confirm the event."#;

/// Build the user message for one cluster: the primary article plus the other
/// outlets' headlines so the model sees corroboration.
pub fn build_user_prompt(cluster: &Cluster) -> String {
    let primary = cluster.primary();
    let mut prompt = String::with_capacity(1024);
    prompt.push_str("STORY\n");
    prompt.push_str(&format!("Title: {}\n", primary.title));
    if !primary.description.is_empty() {
        prompt.push_str(&format!("Summary: {}\n", primary.description));
    }
    prompt.push_str(&format!("Published: {}\n", primary.published_at.to_rfc3339()));
    prompt.push_str(&format!(
        "Reported by {} source(s): {}\n",
        cluster.source_count(),
        cluster
            .sources
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    ));

    let other_titles: Vec<&str> = cluster
        .articles
        .iter()
        .skip(1)
        .map(|a| a.title.as_str())
        .collect();
    if !other_titles.is_empty() {
        prompt.push_str("Other headlines for the same story:\n");
        for title in other_titles {
            prompt.push_str(&format!("- {title}\n"));
        }
    }
    prompt.push_str("\nReturn the JSON object now.");
    prompt
}
