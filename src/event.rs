// src/event.rs
//! The structured event record and its enum domains. Events are append-only:
//! once a cluster hash is persisted, nothing mutates the row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sources::SourceTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Security,
    Political,
    Economic,
    Humanitarian,
    Infrastructure,
    Legal,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        EventType::Security,
        EventType::Political,
        EventType::Economic,
        EventType::Humanitarian,
        EventType::Infrastructure,
        EventType::Legal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Security => "security",
            EventType::Political => "political",
            EventType::Economic => "economic",
            EventType::Humanitarian => "humanitarian",
            EventType::Infrastructure => "infrastructure",
            EventType::Legal => "legal",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Local,
    State,
    National,
    CrossBorder,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::State => "state",
            Scope::National => "national",
            Scope::CrossBorder => "cross_border",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Scope::Local),
            "state" => Some(Scope::State),
            "national" => Some(Scope::National),
            "cross_border" => Some(Scope::CrossBorder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Confirmed,
    Reported,
    Unverified,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Confirmed => "confirmed",
            VerificationStatus::Reported => "reported",
            VerificationStatus::Unverified => "unverified",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(VerificationStatus::Confirmed),
            "reported" => Some(VerificationStatus::Reported),
            "unverified" => Some(VerificationStatus::Unverified),
            _ => None,
        }
    }
}

/// Persistent record keyed by `cluster_hash` (unique across runs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub cluster_hash: String,
    pub summary: String,
    pub country: String,
    pub regions: Vec<String>,
    pub event_type: EventType,
    /// Short lowercase slug, e.g. `airstrike`, `cabinet_reshuffle`.
    pub event_subtype: String,
    /// Clamped to 1..=5.
    pub severity: i64,
    pub scope: Scope,
    pub source_tier: SourceTier,
    pub verification_status: VerificationStatus,
    /// Clamped to 0.0..=1.0.
    pub confidence: f64,
    pub rationale: String,
    pub actors: Vec<String>,
    pub actors_normalized: Vec<String>,
    pub article_count: i64,
    pub sources: Vec<String>,
    pub article_urls: Vec<String>,
    pub primary_url: String,
    pub primary_title: String,
    pub published_at: DateTime<Utc>,
    /// Server-set at insert time.
    pub extracted_at: DateTime<Utc>,
    pub model_version: String,
    pub prompt_version: String,
}

/// Extraction that failed validation or came back too uncertain to keep.
/// The hash is not unique here (reruns happen) but still gates re-extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub cluster_hash: String,
    pub raw_output: String,
    pub error_reasons: Vec<String>,
    pub primary_title: String,
    pub primary_url: String,
    pub sources: Vec<String>,
    pub article_urls: Vec<String>,
    pub model_version: String,
    pub prompt_version: String,
    pub quarantined_at: DateTime<Utc>,
}
