// src/extract/mod.rs
//! Structured event extraction. One LLM request per pending cluster, strictly
//! serial: the model's rate limit is the binding constraint, not our I/O.
//! Anything the model gets wrong lands in quarantine, never in the feed.

pub mod llm;
pub mod prompt;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

use crate::cluster::Cluster;
use crate::event::{Event, QuarantineRecord};
use crate::sources::best_tier;
use crate::actors;
use crate::store::EventStore;

use llm::{ChatClient, LlmError};

/// Inter-request pacing.
const CALL_DELAY: Duration = Duration::from_secs(3);
/// Exponential backoff ladder on rate-limit signals: 2 s, 4 s, 8 s.
const BACKOFF_BASE: Duration = Duration::from_secs(2);
const MAX_RETRIES: u32 = 3;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("extract_accepted_total", "Events persisted after validation.");
        describe_counter!("extract_quarantined_total", "Extractions routed to quarantine.");
        describe_counter!(
            "extract_skipped_total",
            "Clusters skipped because their hash was already extracted."
        );
    });
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    pub accepted: usize,
    pub quarantined: usize,
    pub skipped: usize,
}

/// Construct-once component holding the client handle; no process-wide state.
pub struct Extractor {
    client: Arc<dyn ChatClient>,
    call_delay: Duration,
    backoff_base: Duration,
}

impl Extractor {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            call_delay: CALL_DELAY,
            backoff_base: BACKOFF_BASE,
        }
    }

    /// Shrink the pacing delays; tests exercise the loop without wall-clock cost.
    pub fn with_pacing(mut self, call_delay: Duration, backoff_base: Duration) -> Self {
        self.call_delay = call_delay;
        self.backoff_base = backoff_base;
        self
    }

    /// Extract every cluster whose hash is unknown to the store. Serial by
    /// contract; a cancelled cycle simply leaves clusters pending for the next.
    pub async fn run_pending(&self, db: &EventStore, clusters: &[Cluster]) -> ExtractionStats {
        ensure_metrics_described();
        let mut stats = ExtractionStats::default();
        let mut first = true;

        for cluster in clusters {
            match db.exists(&cluster.cluster_hash) {
                Ok(true) => {
                    stats.skipped += 1;
                    counter!("extract_skipped_total").increment(1);
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = ?e, hash = %cluster.cluster_hash, "exists check failed");
                    continue;
                }
            }

            if !first {
                tokio::time::sleep(self.call_delay).await;
            }
            first = false;

            match self.extract_cluster(db, cluster).await {
                Ok(true) => {
                    stats.accepted += 1;
                    counter!("extract_accepted_total").increment(1);
                }
                Ok(false) => {
                    stats.quarantined += 1;
                    counter!("extract_quarantined_total").increment(1);
                }
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        title = %cluster.primary().title,
                        "extraction store write failed"
                    );
                }
            }
        }

        tracing::info!(
            accepted = stats.accepted,
            quarantined = stats.quarantined,
            skipped = stats.skipped,
            "extraction pass complete"
        );
        stats
    }

    /// Returns Ok(true) on accept, Ok(false) on quarantine; Err only for
    /// store write failures.
    async fn extract_cluster(&self, db: &EventStore, cluster: &Cluster) -> anyhow::Result<bool> {
        let user = prompt::build_user_prompt(cluster);

        let raw = match self.call_with_retry(prompt::SYSTEM_PROMPT, &user).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    title = %cluster.primary().title,
                    "llm call failed, quarantining"
                );
                db.insert_quarantine(&self.quarantine_record(
                    cluster,
                    String::new(),
                    vec![e.to_string()],
                ))?;
                return Ok(false);
            }
        };

        let parsed: serde_json::Value = match serde_json::from_str(strip_code_fence(&raw)) {
            Ok(v) => v,
            Err(e) => {
                db.insert_quarantine(&self.quarantine_record(
                    cluster,
                    raw,
                    vec![format!("json parse: {e}")],
                ))?;
                return Ok(false);
            }
        };

        let payload = match validate::validate_payload(&parsed) {
            Ok(p) => p,
            Err(reasons) => {
                db.insert_quarantine(&self.quarantine_record(cluster, raw, reasons))?;
                return Ok(false);
            }
        };

        let event = self.build_event(cluster, payload);
        let inserted = db.insert_event(&event)?;
        if !inserted {
            // Concurrent cycle got there first; the UNIQUE constraint makes
            // this a no-op by design.
            tracing::debug!(hash = %event.cluster_hash, "event already present");
        }
        Ok(true)
    }

    async fn call_with_retry(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.client.complete(system, user).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_rate_limit() && attempt < MAX_RETRIES => {
                    let wait = self.backoff_base * 2u32.pow(attempt);
                    tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, "rate limited, backing off");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn build_event(&self, cluster: &Cluster, payload: validate::ValidatedPayload) -> Event {
        let primary = cluster.primary();
        let summary = if payload.summary.trim().is_empty() {
            primary.title.clone()
        } else {
            payload.summary
        };
        Event {
            cluster_hash: cluster.cluster_hash.clone(),
            summary,
            country: payload.country,
            regions: payload.regions,
            event_type: payload.event_type,
            event_subtype: payload.event_subtype,
            severity: payload.severity,
            scope: payload.scope,
            source_tier: best_tier(cluster.reliabilities()),
            verification_status: payload.verification_status,
            confidence: payload.confidence,
            rationale: payload.rationale,
            actors_normalized: actors::normalize_actors(&payload.actors),
            actors: payload.actors,
            article_count: cluster.articles.len() as i64,
            sources: cluster.sources.iter().cloned().collect(),
            article_urls: cluster.articles.iter().map(|a| a.url.clone()).collect(),
            primary_url: primary.url.clone(),
            primary_title: primary.title.clone(),
            published_at: cluster.latest_date,
            extracted_at: Utc::now(),
            model_version: self.client.model_version().to_string(),
            prompt_version: prompt::PROMPT_VERSION.to_string(),
        }
    }

    fn quarantine_record(
        &self,
        cluster: &Cluster,
        raw_output: String,
        error_reasons: Vec<String>,
    ) -> QuarantineRecord {
        let primary = cluster.primary();
        QuarantineRecord {
            cluster_hash: cluster.cluster_hash.clone(),
            raw_output,
            error_reasons,
            primary_title: primary.title.clone(),
            primary_url: primary.url.clone(),
            sources: cluster.sources.iter().cloned().collect(),
            article_urls: cluster.articles.iter().map(|a| a.url.clone()).collect(),
            model_version: self.client.model_version().to_string(),
            prompt_version: prompt::PROMPT_VERSION.to_string(),
            quarantined_at: Utc::now(),
        }
    }
}

/// Drop a leading ```json (or bare ```) fence and a trailing ``` if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_stripping_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}
