// src/store.rs
//! Embedded event store: a single SQLite file with WAL journaling. One writer
//! behind a mutex; readers share the same handle. Migrations are additive
//! only — new columns arrive with NULL defaults and old rows stay valid.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::event::{Event, EventType, QuarantineRecord, Scope, VerificationStatus};
use crate::sources::SourceTier;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
  id INTEGER PRIMARY KEY,
  cluster_hash TEXT NOT NULL UNIQUE,
  summary TEXT NOT NULL,
  country TEXT NOT NULL,
  regions TEXT NOT NULL,
  event_type TEXT NOT NULL,
  event_subtype TEXT NOT NULL,
  severity INTEGER NOT NULL,
  scope TEXT NOT NULL,
  source_tier TEXT NOT NULL,
  verification_status TEXT NOT NULL,
  confidence REAL NOT NULL,
  rationale TEXT NOT NULL,
  actors TEXT NOT NULL,
  actors_normalized TEXT NOT NULL,
  article_count INTEGER NOT NULL,
  sources TEXT NOT NULL,
  article_urls TEXT NOT NULL,
  primary_url TEXT NOT NULL,
  primary_title TEXT NOT NULL,
  published_at TEXT NOT NULL,
  extracted_at TEXT NOT NULL,
  model_version TEXT NOT NULL,
  prompt_version TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_type ON events(event_type);
CREATE INDEX IF NOT EXISTS idx_events_country ON events(country);
CREATE INDEX IF NOT EXISTS idx_events_severity ON events(severity);
CREATE INDEX IF NOT EXISTS idx_events_published_at ON events(published_at);

CREATE TABLE IF NOT EXISTS quarantine (
  id INTEGER PRIMARY KEY,
  cluster_hash TEXT NOT NULL,
  raw_output TEXT NOT NULL,
  error_reasons TEXT NOT NULL,
  primary_title TEXT NOT NULL,
  primary_url TEXT NOT NULL,
  sources TEXT NOT NULL,
  article_urls TEXT NOT NULL,
  model_version TEXT NOT NULL,
  prompt_version TEXT NOT NULL,
  quarantined_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_quarantine_hash ON quarantine(cluster_hash);

CREATE TABLE IF NOT EXISTS unsubscribes (
  email TEXT PRIMARY KEY,
  token TEXT NOT NULL,
  unsubscribed_at TEXT NOT NULL
);
";

pub struct EventStore {
    conn: Mutex<Connection>,
}

/// Aggregate row: label + count.
#[derive(Debug, Clone, PartialEq)]
pub struct CountRow {
    pub label: String,
    pub count: i64,
}

/// Severity-weighted region aggregate for a window.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStat {
    pub region: String,
    pub count: i64,
    pub weighted: i64,
    pub avg_severity: f64,
}

/// Data-quality snapshot used by the admin view and ops logs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QualitySnapshot {
    pub events: i64,
    pub quarantined: i64,
    pub accept_rate: f64,
    pub mean_confidence: Option<f64>,
    /// Per-day mean confidence across the window, oldest first.
    pub confidence_trend: Vec<(String, f64)>,
    /// Sources whose events most often arrive without regions.
    pub missing_regions_by_source: Vec<(String, i64)>,
    pub recent_quarantine: Vec<(String, String, Vec<String>)>,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("open event store at {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("open in-memory store")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )
        .context("configure sqlite pragmas")?;
        conn.execute_batch(SCHEMA).context("apply schema")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Additive migrations only. Column presence is the schema version.
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        ensure_column(&conn, "events", "event_subtype", "TEXT")?;
        ensure_column(&conn, "events", "source_tier", "TEXT")?;
        ensure_column(&conn, "events", "actors_normalized", "TEXT")?;
        Ok(())
    }

    /// True iff the hash was ever extracted — accepted OR quarantined. Both
    /// tables gate re-extraction.
    pub fn exists(&self, cluster_hash: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM events WHERE cluster_hash = ?1
                 UNION ALL
                 SELECT 1 FROM quarantine WHERE cluster_hash = ?1
                 LIMIT 1",
                params![cluster_hash],
                |row| row.get(0),
            )
            .optional()
            .context("exists lookup")?;
        Ok(found.is_some())
    }

    /// Idempotent by the UNIQUE constraint: re-inserting an existing hash is
    /// a successful no-op. Returns true when a row was actually written.
    pub fn insert_event(&self, event: &Event) -> Result<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO events (
                    cluster_hash, summary, country, regions, event_type,
                    event_subtype, severity, scope, source_tier,
                    verification_status, confidence, rationale, actors,
                    actors_normalized, article_count, sources, article_urls,
                    primary_url, primary_title, published_at, extracted_at,
                    model_version, prompt_version
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                           ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
                params![
                    event.cluster_hash,
                    event.summary,
                    event.country,
                    serde_json::to_string(&event.regions)?,
                    event.event_type.as_str(),
                    event.event_subtype,
                    event.severity,
                    event.scope.as_str(),
                    event.source_tier.as_str(),
                    event.verification_status.as_str(),
                    event.confidence,
                    event.rationale,
                    serde_json::to_string(&event.actors)?,
                    serde_json::to_string(&event.actors_normalized)?,
                    event.article_count,
                    serde_json::to_string(&event.sources)?,
                    serde_json::to_string(&event.article_urls)?,
                    event.primary_url,
                    event.primary_title,
                    event.published_at.to_rfc3339(),
                    event.extracted_at.to_rfc3339(),
                    event.model_version,
                    event.prompt_version,
                ],
            )
            .context("insert event")?;
        Ok(changed > 0)
    }

    pub fn insert_quarantine(&self, rec: &QuarantineRecord) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO quarantine (
                cluster_hash, raw_output, error_reasons, primary_title,
                primary_url, sources, article_urls, model_version,
                prompt_version, quarantined_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rec.cluster_hash,
                rec.raw_output,
                serde_json::to_string(&rec.error_reasons)?,
                rec.primary_title,
                rec.primary_url,
                serde_json::to_string(&rec.sources)?,
                serde_json::to_string(&rec.article_urls)?,
                rec.model_version,
                rec.prompt_version,
                rec.quarantined_at.to_rfc3339(),
            ],
        )
        .context("insert quarantine record")?;
        Ok(())
    }

    pub fn get_event_by_cluster_hash(&self, cluster_hash: &str) -> Result<Option<Event>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            &format!("{EVENT_SELECT} WHERE cluster_hash = ?1"),
            params![cluster_hash],
            event_from_row,
        )
        .optional()
        .context("get event by hash")
    }

    /// Events whose published_at falls in [start, end).
    pub fn events_in_window(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "{EVENT_SELECT} WHERE published_at >= ?1 AND published_at < ?2
             ORDER BY published_at DESC"
        ))?;
        let rows = stmt.query_map(
            params![start.to_rfc3339(), end.to_rfc3339()],
            event_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode event row")?);
        }
        Ok(out)
    }

    pub fn counts_by_type(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CountRow>> {
        self.grouped_counts("event_type", start, end)
    }

    pub fn counts_by_severity(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CountRow>> {
        self.grouped_counts("severity", start, end)
    }

    pub fn counts_by_country(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CountRow>> {
        self.grouped_counts("country", start, end)
    }

    fn grouped_counts(
        &self,
        column: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CountRow>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT CAST({column} AS TEXT), COUNT(*) FROM events
             WHERE published_at >= ?1 AND published_at < ?2
             GROUP BY {column} ORDER BY COUNT(*) DESC"
        ))?;
        let rows = stmt.query_map(params![start.to_rfc3339(), end.to_rfc3339()], |row| {
            Ok(CountRow {
                label: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Region aggregates for a window: raw count, severity-weighted count,
    /// mean severity. Region lists live as JSON text, so the explode happens
    /// here rather than in SQL.
    pub fn region_stats(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<RegionStat>> {
        Ok(region_rollup(&self.events_in_window(start, end)?))
    }

    /// Normalized-actor mention counts for a window.
    pub fn actor_counts(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CountRow>> {
        use std::collections::HashMap;
        let events = self.events_in_window(start, end)?;
        let mut acc: HashMap<String, i64> = HashMap::new();
        for e in &events {
            for actor in &e.actors_normalized {
                *acc.entry(actor.clone()).or_insert(0) += 1;
            }
        }
        let mut out: Vec<CountRow> = acc
            .into_iter()
            .map(|(label, count)| CountRow { label, count })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then(a.label.cmp(&b.label)));
        Ok(out)
    }

    pub fn quality_snapshot(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<QualitySnapshot> {
        let events = self.events_in_window(start, end)?;
        let quarantined = {
            let conn = self.conn.lock().expect("store mutex poisoned");
            conn.query_row(
                "SELECT COUNT(*) FROM quarantine
                 WHERE quarantined_at >= ?1 AND quarantined_at < ?2",
                params![start.to_rfc3339(), end.to_rfc3339()],
                |row| row.get::<_, i64>(0),
            )?
        };

        let accepted = events.len() as i64;
        let total = accepted + quarantined;
        let accept_rate = if total == 0 {
            1.0
        } else {
            accepted as f64 / total as f64
        };
        let mean_confidence = if events.is_empty() {
            None
        } else {
            Some(events.iter().map(|e| e.confidence).sum::<f64>() / events.len() as f64)
        };

        let mut by_day: std::collections::BTreeMap<String, (f64, i64)> =
            std::collections::BTreeMap::new();
        for e in &events {
            let day = e.extracted_at.format("%Y-%m-%d").to_string();
            let entry = by_day.entry(day).or_insert((0.0, 0));
            entry.0 += e.confidence;
            entry.1 += 1;
        }
        let confidence_trend: Vec<(String, f64)> = by_day
            .into_iter()
            .map(|(day, (sum, n))| (day, sum / n as f64))
            .collect();

        let mut missing: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        for e in events.iter().filter(|e| e.regions.is_empty()) {
            for s in &e.sources {
                *missing.entry(s.clone()).or_insert(0) += 1;
            }
        }
        let mut missing_regions_by_source: Vec<(String, i64)> = missing.into_iter().collect();
        missing_regions_by_source.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let recent_quarantine = {
            let conn = self.conn.lock().expect("store mutex poisoned");
            let mut stmt = conn.prepare(
                "SELECT cluster_hash, primary_title, error_reasons FROM quarantine
                 ORDER BY quarantined_at DESC LIMIT 10",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (hash, title, reasons_json) = row?;
                let reasons: Vec<String> =
                    serde_json::from_str(&reasons_json).unwrap_or_default();
                out.push((hash, title, reasons));
            }
            out
        };

        Ok(QualitySnapshot {
            events: accepted,
            quarantined,
            accept_rate,
            mean_confidence,
            confidence_trend,
            missing_regions_by_source,
            recent_quarantine,
        })
    }

    /* -------- unsubscribe list -------- */

    pub fn record_unsubscribe(&self, email: &str, token: &str) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO unsubscribes (email, token, unsubscribed_at)
             VALUES (?1, ?2, ?3)",
            params![email.to_lowercase(), token, Utc::now().to_rfc3339()],
        )
        .context("record unsubscribe")?;
        Ok(())
    }

    pub fn is_unsubscribed(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM unsubscribes WHERE email = ?1",
                params![email.to_lowercase()],
                |row| row.get(0),
            )
            .optional()
            .context("unsubscribe lookup")?;
        Ok(found.is_some())
    }
}

/// Pure region rollup over a slice of events, severity-weighted and sorted.
/// Shared by the store aggregate and the digest builder.
pub fn region_rollup(events: &[Event]) -> Vec<RegionStat> {
    use std::collections::HashMap;
    let mut acc: HashMap<String, (i64, i64)> = HashMap::new();
    for e in events {
        for region in &e.regions {
            let key = region.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let entry = acc.entry(key).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += e.severity;
        }
    }
    let mut out: Vec<RegionStat> = acc
        .into_iter()
        .map(|(region, (count, weighted))| RegionStat {
            region,
            count,
            weighted,
            avg_severity: weighted as f64 / count as f64,
        })
        .collect();
    out.sort_by(|a, b| {
        b.weighted
            .cmp(&a.weighted)
            .then(b.count.cmp(&a.count))
            .then(a.region.cmp(&b.region))
    });
    out
}

const EVENT_SELECT: &str = "SELECT cluster_hash, summary, country, regions, event_type,
    event_subtype, severity, scope, source_tier, verification_status,
    confidence, rationale, actors, actors_normalized, article_count, sources,
    article_urls, primary_url, primary_title, published_at, extracted_at,
    model_version, prompt_version FROM events";

fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

fn parse_dt(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let event_type: String = row.get(4)?;
    let scope: String = row.get(7)?;
    let tier: String = row.get(8)?;
    let verification: String = row.get(9)?;
    Ok(Event {
        cluster_hash: row.get(0)?,
        summary: row.get(1)?,
        country: row.get(2)?,
        regions: json_list(row, 3)?,
        event_type: EventType::parse_str(&event_type).unwrap_or(EventType::Security),
        event_subtype: row.get(5)?,
        severity: row.get(6)?,
        scope: Scope::parse_str(&scope).unwrap_or(Scope::Local),
        source_tier: SourceTier::parse_str(&tier).unwrap_or(SourceTier::Tier3),
        verification_status: VerificationStatus::parse_str(&verification)
            .unwrap_or(VerificationStatus::Reported),
        confidence: row.get(10)?,
        rationale: row.get(11)?,
        actors: json_list(row, 12)?,
        actors_normalized: json_list(row, 13)?,
        article_count: row.get(14)?,
        sources: json_list(row, 15)?,
        article_urls: json_list(row, 16)?,
        primary_url: row.get(17)?,
        primary_title: row.get(18)?,
        published_at: parse_dt(row, 19)?,
        extracted_at: parse_dt(row, 20)?,
        model_version: row.get(21)?,
        prompt_version: row.get(22)?,
    })
}

/// Add a column if it is not already present. The migration discipline is
/// additive only, so this is the whole migration engine.
fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<_>>()?;
    if !existing.iter().any(|c| c == column) {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))
            .with_context(|| format!("add column {table}.{column}"))?;
    }
    Ok(())
}
