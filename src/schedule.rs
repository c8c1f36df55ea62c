// src/schedule.rs
//! The two periodic drivers: a 15-minute ingest tick and the Monday 07:00
//! weekly digest. Both self-reschedule on completion. A process restarted
//! after a missed weekly fire waits for the next week; restarted on Monday
//! before 07:00 it still makes the same-day run.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, Duration as ChronoDuration, Local, TimeZone};
use tokio::task::JoinHandle;

use crate::pipeline::Pipeline;

pub const INGEST_INTERVAL_SECS: u64 = 15 * 60;
const DIGEST_HOUR: u32 = 7;

pub fn spawn_ingest_scheduler(pipeline: Arc<Pipeline>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(INGEST_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The caller runs the first cycle itself; swallow the immediate tick.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let summary = pipeline.run_cycle().await;
            tracing::debug!(clusters = summary.clusters, "scheduled ingest tick done");
        }
    })
}

/// Next Monday 07:00 strictly after `now` — except that a Monday earlier than
/// 07:00 keeps the same-day fire.
pub fn next_weekly_fire<Tz: TimeZone>(now: DateTime<Tz>) -> DateTime<Tz> {
    let today = now.date_naive();
    let days_until_monday = (7 - today.weekday().num_days_from_monday()) % 7;
    let candidate_day = today
        .checked_add_days(Days::new(u64::from(days_until_monday)))
        .expect("date in range");
    let fire_naive = candidate_day
        .and_hms_opt(DIGEST_HOUR, 0, 0)
        .expect("07:00 exists");

    let tz = now.timezone();
    let at = |naive| {
        tz.from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive))
    };

    let fire = at(fire_naive);
    if fire > now {
        fire
    } else {
        at(fire_naive + ChronoDuration::days(7))
    }
}

pub fn spawn_weekly_scheduler(pipeline: Arc<Pipeline>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Local::now();
            let fire = next_weekly_fire(now);
            let wait = (fire.clone() - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(60));
            tracing::info!(fire = %fire.to_rfc3339(), "weekly digest scheduled");
            tokio::time::sleep(wait).await;

            if let Err(e) = pipeline.run_weekly_digest().await {
                tracing::warn!(error = ?e, "weekly digest run failed");
            }
        }
    })
}
