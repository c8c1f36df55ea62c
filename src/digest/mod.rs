// src/digest/mod.rs
//! The weekly "Risk Delta": the most recent 7 days against the prior 7,
//! rounded to day boundaries. Pure aggregation over two event slices — the
//! caller owns store access and scheduling, this module owns the arithmetic.

pub mod render;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::actors;
use crate::event::{Event, EventType};
use crate::regions;
use crate::store::region_rollup;

/// Last-week totals below this suppress all percent-change values.
pub const BASELINE_MIN: i64 = 5;
/// High-severity section floor.
pub const HIGH_SEVERITY_MIN: i64 = 4;
/// Output caps.
const MAX_BUNDLES: usize = 8;
const MAX_HOT_REGIONS: usize = 10;
const MAX_ACTOR_SPIKES: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigestWindows {
    pub this_week: Window,
    pub last_week: Window,
    /// ISO date range label, e.g. `2026-07-27 – 2026-08-02`.
    pub label: String,
    /// ISO week number of the window's final day.
    pub week_number: u32,
}

/// Compute both windows from a local calendar date. "This week" covers the
/// seven days ending with `today`, day-rounded in server-local time.
pub fn windows_for_date(today: NaiveDate) -> DigestWindows {
    let end_day = today.checked_add_days(Days::new(1)).expect("date in range");
    let start_day = end_day.checked_sub_days(Days::new(7)).expect("date in range");
    let prev_start_day = end_day.checked_sub_days(Days::new(14)).expect("date in range");

    let to_utc = |d: NaiveDate| -> DateTime<Utc> {
        let local = d.and_hms_opt(0, 0, 0).expect("midnight exists");
        match Local.from_local_datetime(&local) {
            chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
            // DST edge: fall back to interpreting midnight as UTC.
            _ => Utc.from_utc_datetime(&local),
        }
    };

    DigestWindows {
        this_week: Window {
            start: to_utc(start_day),
            end: to_utc(end_day),
        },
        last_week: Window {
            start: to_utc(prev_start_day),
            end: to_utc(start_day),
        },
        label: format!("{} – {}", start_day.format("%Y-%m-%d"), today.format("%Y-%m-%d")),
        week_number: today.iso_week().week(),
    }
}

/// Week-over-week percent change, rounded. `(0,0) → 0`; growth from an empty
/// baseline reads as +100.
pub fn pct_change(cur: i64, prev: i64) -> i64 {
    if prev == 0 && cur == 0 {
        return 0;
    }
    if prev == 0 {
        return 100;
    }
    (((cur - prev) as f64 / prev as f64) * 100.0).round() as i64
}

#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub label: String,
    pub week_number: u32,
    pub baseline_weak: bool,
    pub topline: Topline,
    pub high_severity: Vec<Bundle>,
    pub hot_regions: Vec<HotRegion>,
    pub actor_spikes: Vec<ActorSpike>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Topline {
    pub total_this_week: i64,
    pub total_last_week: i64,
    pub change_pct: Option<i64>,
    pub by_type: Vec<TypeRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeRow {
    pub event_type: String,
    pub this_week: i64,
    pub last_week: i64,
    pub change_pct: Option<i64>,
}

/// Same-story high-severity events merged into one entry.
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub summary: String,
    pub country: String,
    pub event_subtype: String,
    pub severity: i64,
    pub verification_status: String,
    /// Display-collapsed region names.
    pub regions: Vec<String>,
    pub source_count: i64,
    pub sources: Vec<String>,
    pub article_urls: Vec<String>,
    pub actors: Vec<String>,
    pub rationale: String,
    #[serde(skip)]
    raw_regions: Vec<String>,
    #[serde(skip)]
    latest: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HotRegion {
    pub region: String,
    pub count: i64,
    pub weighted: i64,
    pub avg_severity: f64,
    pub change_pct: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorSpike {
    pub actor: String,
    pub this_week: i64,
    pub last_week: i64,
    pub delta: i64,
    pub change_pct: Option<i64>,
}

/// Build the digest from the two adjacent weekly event sets.
pub fn build_digest(
    windows: &DigestWindows,
    this_week: &[Event],
    last_week: &[Event],
) -> Digest {
    let baseline_weak = (last_week.len() as i64) < BASELINE_MIN;
    let pct = |cur: i64, prev: i64| -> Option<i64> {
        if baseline_weak {
            None
        } else {
            Some(pct_change(cur, prev))
        }
    };

    Digest {
        label: windows.label.clone(),
        week_number: windows.week_number,
        baseline_weak,
        topline: topline(this_week, last_week, &pct),
        high_severity: bundle_high_severity(this_week),
        hot_regions: hot_regions(this_week, last_week, &pct),
        actor_spikes: actor_spikes(this_week, last_week, &pct),
    }
}

fn topline(
    this_week: &[Event],
    last_week: &[Event],
    pct: &dyn Fn(i64, i64) -> Option<i64>,
) -> Topline {
    let count = |events: &[Event]| -> BTreeMap<&'static str, i64> {
        let mut m = BTreeMap::new();
        for e in events {
            *m.entry(e.event_type.as_str()).or_insert(0) += 1;
        }
        m
    };

    let cur = count(this_week);
    let prev = count(last_week);

    let mut by_type: Vec<TypeRow> = Vec::new();
    for t in EventType::ALL {
        let key = t.as_str();
        let c = cur.get(key).copied().unwrap_or(0);
        let p = prev.get(key).copied().unwrap_or(0);
        if c == 0 && p == 0 {
            continue;
        }
        // Types present only last week still get a row: (0, −100%).
        by_type.push(TypeRow {
            event_type: key.to_string(),
            this_week: c,
            last_week: p,
            change_pct: pct(c, p),
        });
    }
    by_type.sort_by(|a, b| {
        b.this_week
            .cmp(&a.this_week)
            .then(a.event_type.cmp(&b.event_type))
    });

    Topline {
        total_this_week: this_week.len() as i64,
        total_last_week: last_week.len() as i64,
        change_pct: pct(this_week.len() as i64, last_week.len() as i64),
        by_type,
    }
}

/// Two events bundle iff same country, same subtype (case-insensitive), same
/// severity, and overlapping region lists (via the containment table).
fn bundles_with(bundle: &Bundle, e: &Event) -> bool {
    bundle.country.eq_ignore_ascii_case(&e.country)
        && bundle.event_subtype.eq_ignore_ascii_case(&e.event_subtype)
        && bundle.severity == e.severity
        && regions::lists_overlap(&bundle.raw_regions, &e.regions)
}

fn bundle_high_severity(this_week: &[Event]) -> Vec<Bundle> {
    let mut bundles: Vec<Bundle> = Vec::new();

    for e in this_week.iter().filter(|e| e.severity >= HIGH_SEVERITY_MIN) {
        if let Some(b) = bundles.iter_mut().find(|b| bundles_with(b, e)) {
            b.source_count += e.sources.len() as i64;
            merge_unique(&mut b.sources, &e.sources);
            merge_unique(&mut b.article_urls, &e.article_urls);
            merge_unique(&mut b.raw_regions, &e.regions);
            merge_unique(&mut b.actors, &e.actors_normalized);
            b.latest = b.latest.max(e.published_at);
            continue;
        }
        bundles.push(Bundle {
            summary: e.summary.clone(),
            country: e.country.clone(),
            event_subtype: e.event_subtype.clone(),
            severity: e.severity,
            verification_status: e.verification_status.as_str().to_string(),
            regions: Vec::new(),
            source_count: e.sources.len() as i64,
            sources: e.sources.clone(),
            article_urls: e.article_urls.clone(),
            actors: e.actors_normalized.clone(),
            rationale: clean_rationale(&e.rationale),
            raw_regions: e.regions.clone(),
            latest: e.published_at,
        });
    }

    bundles.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.source_count.cmp(&a.source_count))
            .then(b.latest.cmp(&a.latest))
    });
    bundles.truncate(MAX_BUNDLES);

    for b in &mut bundles {
        b.regions = regions::collapse_for_display(&b.raw_regions);
    }
    bundles
}

fn merge_unique(into: &mut Vec<String>, from: &[String]) {
    let seen: BTreeSet<String> = into.iter().map(|s| s.to_lowercase()).collect();
    for item in from {
        if !seen.contains(&item.to_lowercase()) {
            into.push(item.clone());
        }
    }
}

fn hot_regions(
    this_week: &[Event],
    last_week: &[Event],
    pct: &dyn Fn(i64, i64) -> Option<i64>,
) -> Vec<HotRegion> {
    let cur = region_rollup(this_week);
    let prev = region_rollup(last_week);
    let prev_weighted: BTreeMap<&str, i64> = prev
        .iter()
        .map(|r| (r.region.as_str(), r.weighted))
        .collect();

    cur.into_iter()
        .take(MAX_HOT_REGIONS)
        .map(|r| {
            let p = prev_weighted.get(r.region.as_str()).copied().unwrap_or(0);
            HotRegion {
                region: regions::display_name(&r.region),
                count: r.count,
                weighted: r.weighted,
                avg_severity: (r.avg_severity * 10.0).round() / 10.0,
                change_pct: pct(r.weighted, p),
            }
        })
        .collect()
}

fn actor_spikes(
    this_week: &[Event],
    last_week: &[Event],
    pct: &dyn Fn(i64, i64) -> Option<i64>,
) -> Vec<ActorSpike> {
    // Re-normalize at digest time: older events may predate alias additions.
    let count = |events: &[Event]| -> BTreeMap<String, i64> {
        let mut m = BTreeMap::new();
        for e in events {
            for actor in &e.actors_normalized {
                *m.entry(actors::normalize_actor(actor)).or_insert(0) += 1;
            }
        }
        m
    };

    let cur = count(this_week);
    let prev = count(last_week);

    let names: BTreeSet<&String> = cur.keys().chain(prev.keys()).collect();
    let mut spikes: Vec<ActorSpike> = names
        .into_iter()
        .map(|name| {
            let c = cur.get(name).copied().unwrap_or(0);
            let p = prev.get(name).copied().unwrap_or(0);
            ActorSpike {
                actor: name.clone(),
                this_week: c,
                last_week: p,
                delta: c - p,
                change_pct: pct(c, p),
            }
        })
        .filter(|s| s.delta != 0)
        .collect();

    // Largest movement first, risers before fallers at equal magnitude.
    spikes.sort_by(|a, b| {
        b.delta
            .abs()
            .cmp(&a.delta.abs())
            .then(b.delta.cmp(&a.delta))
            .then(a.actor.cmp(&b.actor))
    });
    spikes.truncate(MAX_ACTOR_SPIKES);
    spikes
}

/// Strip legacy verbose justifications the older prompts produced; a stripped
/// rationale renders as empty.
pub fn clean_rationale(rationale: &str) -> String {
    let r = rationale.trim();
    if r.is_empty() {
        return String::new();
    }
    let lower = r.to_lowercase();
    const DROP_PREFIXES: &[&str] = &[
        "the severity",
        "the verification",
        "the confidence",
        "this is rated",
        "rated as",
    ];
    if DROP_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return String::new();
    }
    static RE_SEVERITY_N: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"(?i)^severity \d").unwrap());
    if RE_SEVERITY_N.is_match(r) {
        return String::new();
    }
    static RE_GRAVE: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
        regex::Regex::new(r"(?i)which is a (grave|significant|major|serious)").unwrap()
    });
    if RE_GRAVE.is_match(r) {
        return String::new();
    }
    r.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Scope, VerificationStatus};
    use crate::sources::SourceTier;
    use chrono::TimeZone;

    fn event(hash: &str, severity: i64, country: &str, subtype: &str, regions: &[&str]) -> Event {
        Event {
            cluster_hash: hash.into(),
            summary: format!("summary {hash}"),
            country: country.into(),
            regions: regions.iter().map(|r| r.to_string()).collect(),
            event_type: EventType::Security,
            event_subtype: subtype.into(),
            severity,
            scope: Scope::Local,
            source_tier: SourceTier::Tier2,
            verification_status: VerificationStatus::Reported,
            confidence: 0.8,
            rationale: String::new(),
            actors: vec![],
            actors_normalized: vec![],
            article_count: 1,
            sources: vec![format!("src-{hash}")],
            article_urls: vec![format!("https://example.org/{hash}")],
            primary_url: format!("https://example.org/{hash}"),
            primary_title: format!("title {hash}"),
            published_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            extracted_at: Utc.timestamp_opt(1_700_000_100, 0).unwrap(),
            model_version: "m".into(),
            prompt_version: "v3".into(),
        }
    }

    fn windows() -> DigestWindows {
        windows_for_date(NaiveDate::from_ymd_opt(2026, 8, 2).unwrap())
    }

    #[test]
    fn pct_change_boundary_values() {
        assert_eq!(pct_change(0, 0), 0);
        assert_eq!(pct_change(7, 0), 100);
        assert_eq!(pct_change(0, 4), -100);
        assert_eq!(pct_change(6, 4), 50);
        assert_eq!(pct_change(3, 4), -25);
    }

    #[test]
    fn windows_are_adjacent_and_seven_days() {
        let w = windows();
        assert_eq!(w.this_week.start, w.last_week.end);
        assert_eq!((w.this_week.end - w.this_week.start).num_days(), 7);
        assert_eq!((w.last_week.end - w.last_week.start).num_days(), 7);
        assert!(w.label.starts_with("2026-07-27"));
        assert!(w.label.ends_with("2026-08-02"));
    }

    #[test]
    fn containment_bundles_same_story() {
        // El Fasher sits under North Darfur; same country/subtype/severity.
        let a = event("a", 5, "Sudan", "airstrike", &["El Fasher"]);
        let b = event("b", 5, "Sudan", "airstrike", &["North Darfur"]);
        let digest = build_digest(&windows(), &[a, b], &[]);
        assert_eq!(digest.high_severity.len(), 1);
        let bundle = &digest.high_severity[0];
        assert_eq!(bundle.source_count, 2);
        assert_eq!(bundle.regions, vec!["North Darfur (El Fasher)".to_string()]);
    }

    #[test]
    fn different_subtype_does_not_bundle() {
        let a = event("a", 5, "Sudan", "airstrike", &["El Fasher"]);
        let b = event("b", 5, "Sudan", "shelling", &["El Fasher"]);
        let digest = build_digest(&windows(), &[a, b], &[]);
        assert_eq!(digest.high_severity.len(), 2);
    }

    #[test]
    fn weak_baseline_suppresses_all_percentages() {
        let this_week: Vec<Event> = (0..6)
            .map(|i| event(&format!("t{i}"), 4, "Sudan", "shelling", &["Nyala"]))
            .collect();
        let last_week = vec![
            event("p1", 3, "Sudan", "protest", &["Khartoum"]),
            event("p2", 2, "Sudan", "protest", &["Khartoum"]),
        ];
        let digest = build_digest(&windows(), &this_week, &last_week);
        assert!(digest.baseline_weak);
        assert!(digest.topline.change_pct.is_none());
        assert!(digest.topline.by_type.iter().all(|r| r.change_pct.is_none()));
        assert!(digest.hot_regions.iter().all(|r| r.change_pct.is_none()));
        assert!(digest.actor_spikes.iter().all(|s| s.change_pct.is_none()));
    }

    #[test]
    fn type_present_only_last_week_gets_synthetic_row() {
        let this_week: Vec<Event> = (0..5)
            .map(|i| event(&format!("t{i}"), 3, "Sudan", "clash", &["Nyala"]))
            .collect();
        let mut last_week: Vec<Event> = (0..5)
            .map(|i| event(&format!("p{i}"), 3, "Sudan", "clash", &["Nyala"]))
            .collect();
        let mut legal = event("legal", 2, "Sudan", "trial", &["Khartoum"]);
        legal.event_type = EventType::Legal;
        last_week.push(legal);

        let digest = build_digest(&windows(), &this_week, &last_week);
        let legal_row = digest
            .topline
            .by_type
            .iter()
            .find(|r| r.event_type == "legal")
            .expect("synthetic row");
        assert_eq!(legal_row.this_week, 0);
        assert_eq!(legal_row.change_pct, Some(-100));
    }

    #[test]
    fn bundles_cap_at_eight() {
        let this_week: Vec<Event> = (0..12)
            .map(|i| {
                event(
                    &format!("e{i}"),
                    4,
                    "Sudan",
                    &format!("subtype{i}"),
                    &["Khartoum"],
                )
            })
            .collect();
        let digest = build_digest(&windows(), &this_week, &[]);
        assert_eq!(digest.high_severity.len(), 8);
    }

    #[test]
    fn hot_regions_rank_by_weighted_severity() {
        let this_week = vec![
            event("a", 5, "Sudan", "airstrike", &["El Fasher"]),
            event("b", 5, "Sudan", "airstrike", &["El Fasher"]),
            event("c", 2, "South Sudan", "protest", &["Juba"]),
        ];
        let digest = build_digest(&windows(), &this_week, &[]);
        assert_eq!(digest.hot_regions[0].region, "El Fasher");
        assert_eq!(digest.hot_regions[0].weighted, 10);
        assert_eq!(digest.hot_regions[0].count, 2);
    }

    #[test]
    fn actor_spikes_renormalize_and_rank_by_magnitude() {
        let mut a = event("a", 3, "Sudan", "clash", &["Nyala"]);
        a.actors_normalized = vec!["rsf".into()];
        let mut b = event("b", 3, "Sudan", "clash", &["Nyala"]);
        b.actors_normalized = vec!["Rapid Support Forces".into()];
        let mut prev: Vec<Event> = (0..5)
            .map(|i| event(&format!("p{i}"), 3, "Sudan", "clash", &["Nyala"]))
            .collect();
        prev[0].actors_normalized = vec!["UNMISS".into()];

        let digest = build_digest(&windows(), &[a, b], &prev);
        let rsf = digest
            .actor_spikes
            .iter()
            .find(|s| s.actor == "Rapid Support Forces")
            .expect("rsf spike");
        assert_eq!(rsf.this_week, 2);
        assert_eq!(rsf.delta, 2);
        assert_eq!(rsf.change_pct, Some(100));
    }

    #[test]
    fn legacy_rationales_are_stripped() {
        assert_eq!(clean_rationale("The severity reflects the scale of loss"), "");
        assert_eq!(clean_rationale("Rated as critical due to casualties"), "");
        assert_eq!(clean_rationale("Severity 4 because of displacement"), "");
        assert_eq!(
            clean_rationale("an attack which is a grave violation"),
            ""
        );
        assert_eq!(
            clean_rationale("artillery confirmed by two outlets"),
            "artillery confirmed by two outlets"
        );
    }
}
