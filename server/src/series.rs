// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reminders_common::Reminder;
use reminders_common::recurrence::generate_next_occurrence_at;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::database;

/// Shared state for everything that generates occurrences: the end-after-count
/// and pending-occurrence checks need the whole series, which the recurrence
/// engine never sees.
///
/// Owned by the application state and the background sweep, never global.
pub struct SeriesCoordinator {
    // Held while a series is checked and extended, so two callers can't both
    // decide that a next occurrence is missing.
    generation_lock: tokio::sync::Mutex<()>,
    recently_processed: Mutex<HashMap<String, DateTime<Utc>>>,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
    cooldown: Duration,
    sweep_min_interval: Duration,
}

impl SeriesCoordinator {
    pub fn new(cooldown: Duration, sweep_min_interval: Duration) -> Self {
        Self {
            generation_lock: tokio::sync::Mutex::new(()),
            recently_processed: Mutex::new(HashMap::new()),
            last_sweep: Mutex::new(None),
            cooldown,
            sweep_min_interval,
        }
    }

    /// Records that `series_id` is being handled at `now`.
    /// Returns false if the series was already handled within the cooldown.
    pub fn try_mark_processed(&self, series_id: &str, now: DateTime<Utc>) -> bool {
        let mut processed = self.recently_processed.lock();
        match processed.get(series_id) {
            Some(last) if now - *last < self.cooldown => false,
            _ => {
                processed.insert(series_id.to_string(), now);
                true
            }
        }
    }

    /// Forgets `series_id` so the next sweep retries it.
    pub fn release(&self, series_id: &str) {
        self.recently_processed.lock().remove(series_id);
    }

    /// Drops cooldown entries that have expired.
    pub fn prune(&self, now: DateTime<Utc>) {
        let cooldown = self.cooldown;
        self.recently_processed
            .lock()
            .retain(|_, last| now - *last < cooldown);
    }

    /// Claims the right to run a sweep at `now`.
    /// Returns false if the previous sweep started less than the minimum interval ago.
    pub fn begin_sweep(&self, now: DateTime<Utc>) -> bool {
        let mut last_sweep = self.last_sweep.lock();
        match *last_sweep {
            Some(last) if now - last < self.sweep_min_interval => false,
            _ => {
                *last_sweep = Some(now);
                true
            }
        }
    }
}

/// What the caller may do with a series before asking the engine for more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesDecision {
    Generate,
    /// A later, still open occurrence already exists.
    HasFutureOccurrence(String),
    /// The series already holds `limit` occurrences.
    CountExhausted { occurrences: usize, limit: i32 },
}

/// Checks the series of `source` against the limits the engine doesn't enforce.
///
/// `series` is every occurrence sharing the source's group id, `source` included.
pub fn check_series(source: &Reminder, series: &[Reminder]) -> SeriesDecision {
    let live = || series.iter().filter(|r| r.deleted_at.is_none());

    if let Some(existing) =
        live().find(|r| r.id != source.id && !r.completed && r.due_date > source.due_date)
    {
        return SeriesDecision::HasFutureOccurrence(existing.id.clone());
    }

    if let Some(limit) = source.recurring_end_after.filter(|&n| n > 0) {
        let occurrences = live().count();
        if occurrences >= usize::try_from(limit).unwrap_or(usize::MAX) {
            return SeriesDecision::CountExhausted { occurrences, limit };
        }
    }

    SeriesDecision::Generate
}

/// Generates and stores the occurrence following `source`, if the series allows it.
///
/// `source` must be the record as it was before completion: a completed record
/// never yields a next occurrence.
pub async fn advance_series(
    pool: &SqlitePool,
    coordinator: &SeriesCoordinator,
    source: &Reminder,
    now: DateTime<Utc>,
) -> Result<Option<Reminder>> {
    let _guard = coordinator.generation_lock.lock().await;

    let series = database::get_series_reminders(pool, source.series_id()).await?;
    match check_series(source, &series) {
        SeriesDecision::Generate => {}
        decision => {
            debug!(
                "Not extending series {}: {:?}",
                source.series_id(),
                decision
            );
            return Ok(None);
        }
    }

    let Some(next) = generate_next_occurrence_at(source, now) else {
        debug!("Series {} has no further occurrence", source.series_id());
        return Ok(None);
    };

    database::insert_reminder(pool, &next).await?;
    info!(
        "Generated occurrence {} of series {} due {}",
        next.id,
        next.series_id(),
        next.due_date
    );

    Ok(Some(next))
}

/// Keeps only the latest overdue occurrence of each series, oldest series first.
/// Earlier ones already have a later occurrence and would only claim the cooldown.
fn latest_per_series(overdue: &[Reminder]) -> Vec<&Reminder> {
    let mut latest: HashMap<&str, &Reminder> = HashMap::new();
    for reminder in overdue {
        latest
            .entry(reminder.series_id())
            .and_modify(|current| {
                if reminder.due_date > current.due_date {
                    *current = reminder;
                }
            })
            .or_insert(reminder);
    }

    let mut latest: Vec<&Reminder> = latest.into_values().collect();
    latest.sort_by_key(|reminder| reminder.due_date);
    latest
}

/// Counters reported by one catch-up sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// True when the sweep was throttled and nothing was scanned.
    pub throttled: bool,
    pub scanned: usize,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Looks for overdue open recurring reminders and generates their next occurrence.
///
/// Each series is handled at most once per cooldown window, even if several
/// sweeps overlap.
pub async fn run_overdue_sweep(
    pool: &SqlitePool,
    coordinator: &SeriesCoordinator,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    if !coordinator.begin_sweep(now) {
        debug!("Skipping sweep, the previous one ran less than the minimum interval ago.");
        return Ok(SweepReport {
            throttled: true,
            ..Default::default()
        });
    }

    coordinator.prune(now);
    let overdue = database::find_overdue_recurring_reminders(pool, now.date_naive()).await?;
    let mut report = SweepReport {
        scanned: overdue.len(),
        ..Default::default()
    };

    for reminder in latest_per_series(&overdue) {
        if !coordinator.try_mark_processed(reminder.series_id(), now) {
            report.skipped += 1;
            continue;
        }

        match advance_series(pool, coordinator, reminder, now).await {
            Ok(Some(_)) => report.generated += 1,
            Ok(None) => report.skipped += 1,
            Err(e) => {
                error!(
                    "Failed to extend series {}: {:?}",
                    reminder.series_id(),
                    e
                );
                coordinator.release(reminder.series_id());
                report.failed += 1;
            }
        }
    }

    if report.failed > 0 {
        warn!("Sweep finished with {} failures.", report.failed);
    }
    info!(
        "Sweep scanned {} overdue reminders, generated {} occurrences.",
        report.scanned, report.generated
    );

    Ok(report)
}
