// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::Reminder;

// Pure functions only. "No further occurrence" is `None` or a short `Vec`, never an
// error. Series-level limits (end-after-count, pending occurrences) are the caller's.

/// Default upper bound on day-by-day scanning for weekly/weekdays/weekends rules.
pub const DEFAULT_MAX_ITERATIONS: usize = 366;

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// The repeat unit of a rule.
///
/// Values that don't name a known unit are kept verbatim in `Unrecognized`
/// so that `validate_recurring_pattern` can report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RepeatKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Weekdays,
    Weekends,
    Unrecognized(String),
}

impl RepeatKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "yearly" => Self::Yearly,
            "weekdays" => Self::Weekdays,
            "weekends" => Self::Weekends,
            _ => Self::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Weekdays => "weekdays",
            Self::Weekends => "weekends",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for RepeatKind {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<RepeatKind> for String {
    fn from(kind: RepeatKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Repeat policy derived from a reminder. Never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    #[serde(rename = "type")]
    pub kind: RepeatKind,
    /// Absent means "every 1 unit".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i32>,
    /// Weekdays (0 = Sunday) for weekly rules. Out-of-range values never match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn new(kind: RepeatKind) -> Self {
        Self {
            kind,
            interval: None,
            days_of_week: None,
            end_date: None,
        }
    }

    pub fn with_interval(mut self, interval: i32) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn with_days(mut self, days: Vec<u8>) -> Self {
        self.days_of_week = Some(days);
        self
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }
}

/// Outcome of `validate_recurring_pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Derives the recurrence rule of a reminder.
pub fn parse_recurring_pattern(reminder: &Reminder) -> RecurrenceRule {
    let kind = RepeatKind::parse(reminder.repeat_pattern.as_deref().unwrap_or_default());
    let interval = reminder.custom_interval.filter(|&n| n != 1);
    let days_of_week = (kind == RepeatKind::Weekly && !reminder.repeat_days.is_empty())
        .then(|| reminder.repeat_days.clone());
    let end_date = reminder
        .recurring_end_date
        .as_deref()
        .and_then(parse_end_date);

    RecurrenceRule {
        kind,
        interval,
        days_of_week,
        end_date,
    }
}

/// Lenient end date parsing: a plain date, an RFC 3339 timestamp, or a naive
/// timestamp. Anything else means "no end date".
pub fn parse_end_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Computes the first date strictly after `current` that satisfies `rule`.
///
/// `max_iterations` bounds the day-by-day scan used by weekly-with-days,
/// weekdays and weekends rules (defaults to [`DEFAULT_MAX_ITERATIONS`]). A low
/// bound can legitimately return `None` even though a later date exists.
///
/// Returns `None` when the candidate falls after `rule.end_date`, when the scan
/// is exhausted, or when the rule can't be interpreted (unknown kind,
/// non-positive interval).
pub fn calculate_next_occurrence_date(
    current: NaiveDate,
    rule: &RecurrenceRule,
    max_iterations: Option<usize>,
) -> Option<NaiveDate> {
    let step = match rule.interval {
        None => 1,
        Some(n) if n > 0 => n.unsigned_abs(),
        Some(n) => {
            debug!("Refusing to advance with non-positive interval {}", n);
            return None;
        }
    };
    let max_iterations = max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);

    let candidate = match &rule.kind {
        RepeatKind::Daily => current.checked_add_days(Days::new(u64::from(step))),
        RepeatKind::Weekly => match rule.days_of_week.as_deref() {
            Some(days) if !days.is_empty() => scan_forward(current, max_iterations, |weekday| {
                days.contains(&weekday_index(weekday))
            }),
            // No explicit days: same weekday, `interval` weeks later.
            _ => current.checked_add_days(Days::new(u64::from(step) * 7)),
        },
        RepeatKind::Weekdays => scan_forward(current, max_iterations, |weekday| {
            !is_weekend(weekday)
        }),
        RepeatKind::Weekends => scan_forward(current, max_iterations, is_weekend),
        // chrono clamps to the last day of a shorter month.
        RepeatKind::Monthly => current.checked_add_months(Months::new(step)),
        RepeatKind::Yearly => add_years(current, step),
        RepeatKind::Unrecognized(raw) => {
            debug!("Unrecognized recurrence type {:?}, no next occurrence", raw);
            return None;
        }
    };

    let Some(candidate) = candidate else {
        if is_scan_based(rule) {
            debug!(
                "No {} occurrence found after {} within {} steps",
                rule.kind.as_str(),
                current,
                max_iterations
            );
        } else {
            debug!(
                "Advancing {} from {} leaves the calendar range",
                rule.kind.as_str(),
                current
            );
        }
        return None;
    };

    match rule.end_date {
        Some(end_date) if candidate > end_date => {
            debug!(
                "Next occurrence {} is past the end date {}",
                candidate, end_date
            );
            None
        }
        _ => Some(candidate),
    }
}

/// Whether a reminder is still eligible to produce its next occurrence.
///
/// Does not look at `recurring_end_after`: counting the series is up to the caller.
pub fn should_generate_next_occurrence(reminder: &Reminder) -> bool {
    should_generate_next_occurrence_on(reminder, Utc::now().date_naive())
}

/// Same as [`should_generate_next_occurrence`] with an explicit "today".
/// An end date equal to `today` is not in the past.
pub fn should_generate_next_occurrence_on(reminder: &Reminder, today: NaiveDate) -> bool {
    if !reminder.is_recurring || reminder.completed {
        return false;
    }

    reminder
        .recurring_end_date
        .as_deref()
        .and_then(parse_end_date)
        .is_none_or(|end_date| end_date >= today)
}

/// Builds the occurrence that follows `reminder`, or `None` when the series stops.
pub fn generate_next_occurrence(reminder: &Reminder) -> Option<Reminder> {
    generate_next_occurrence_at(reminder, Utc::now())
}

pub fn generate_next_occurrence_at(reminder: &Reminder, now: DateTime<Utc>) -> Option<Reminder> {
    if !should_generate_next_occurrence_on(reminder, now.date_naive()) {
        return None;
    }

    let rule = parse_recurring_pattern(reminder);
    let next_date = calculate_next_occurrence_date(reminder.due_date, &rule, None)?;

    Some(build_occurrence(reminder, next_date, now))
}

/// Produces up to `max_count` future occurrences, each advanced from the previous one.
pub fn generate_occurrences(reminder: &Reminder, max_count: usize) -> Vec<Reminder> {
    generate_occurrences_with(reminder, max_count, None, Utc::now())
}

/// Batch generation with a caller-chosen scan bound and clock.
///
/// Stops early when the end date is reached or a scan comes up empty. The
/// result is in ascending due date order. Non-recurring reminders yield nothing.
pub fn generate_occurrences_with(
    reminder: &Reminder,
    max_count: usize,
    max_iterations: Option<usize>,
    now: DateTime<Utc>,
) -> Vec<Reminder> {
    if !reminder.is_recurring {
        return Vec::new();
    }

    let rule = parse_recurring_pattern(reminder);
    let mut occurrences = Vec::with_capacity(max_count.min(64));
    let mut reference = reminder.due_date;

    while occurrences.len() < max_count {
        let Some(next_date) = calculate_next_occurrence_date(reference, &rule, max_iterations)
        else {
            break;
        };
        occurrences.push(build_occurrence(reminder, next_date, now));
        reference = next_date;
    }

    occurrences
}

/// Human readable summary such as "Every 3 days" or "Weekly: Monday, Friday".
pub fn get_recurring_pattern_description(reminder: &Reminder) -> String {
    if !reminder.is_recurring || reminder.repeat_pattern.is_none() {
        return "Does not repeat".to_string();
    }

    describe_rule(&parse_recurring_pattern(reminder))
}

/// Renders a rule. Any interval above 1 gives the "Every N <unit>s" form, except
/// for weekdays and weekends: their day scan ignores the interval, so showing it
/// would describe a schedule that is never produced.
pub fn describe_rule(rule: &RecurrenceRule) -> String {
    let interval = rule.interval.filter(|&n| n > 1);

    match &rule.kind {
        RepeatKind::Daily => every(interval, "Daily", "days"),
        RepeatKind::Weekly => {
            let base = every(interval, "Weekly", "weeks");
            let names = rule
                .days_of_week
                .as_deref()
                .map(weekday_names)
                .unwrap_or_default();
            if names.is_empty() {
                base
            } else {
                format!("{}: {}", base, names.join(", "))
            }
        }
        RepeatKind::Monthly => every(interval, "Monthly", "months"),
        RepeatKind::Yearly => every(interval, "Yearly", "years"),
        RepeatKind::Weekdays => "Weekdays".to_string(),
        RepeatKind::Weekends => "Weekends".to_string(),
        RepeatKind::Unrecognized(_) => "Custom".to_string(),
    }
}

/// Checks that a rule can be interpreted. `days_of_week` is not checked:
/// out-of-range days are simply never matched by the scan.
pub fn validate_recurring_pattern(rule: &RecurrenceRule) -> ValidationResult {
    let mut errors = Vec::new();

    if let RepeatKind::Unrecognized(raw) = &rule.kind {
        if raw.trim().is_empty() {
            errors.push("Recurrence type is required.".to_string());
        } else {
            errors.push(format!("Unrecognized recurrence type: {}.", raw));
        }
    }

    if let Some(interval) = rule.interval {
        if interval <= 0 {
            errors.push(format!(
                "Interval must be a positive number, got {}.",
                interval
            ));
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}

fn build_occurrence(source: &Reminder, due_date: NaiveDate, now: DateTime<Utc>) -> Reminder {
    Reminder {
        id: Uuid::new_v4().to_string(),
        due_date,
        is_recurring: true,
        completed: false,
        completed_at: None,
        recurring_group_id: Some(source.series_id().to_string()),
        created_at: now,
        updated_at: now,
        deleted_at: None,
        ..source.clone()
    }
}

/// Kinds whose next date comes from a bounded day-by-day search.
fn is_scan_based(rule: &RecurrenceRule) -> bool {
    match rule.kind {
        RepeatKind::Weekdays | RepeatKind::Weekends => true,
        RepeatKind::Weekly => rule.days_of_week.as_deref().is_some_and(|days| !days.is_empty()),
        _ => false,
    }
}

fn scan_forward(
    current: NaiveDate,
    max_iterations: usize,
    matches: impl Fn(Weekday) -> bool,
) -> Option<NaiveDate> {
    let mut candidate = current;
    for _ in 0..max_iterations {
        candidate = candidate.succ_opt()?;
        if matches(candidate.weekday()) {
            return Some(candidate);
        }
    }
    None
}

/// Feb 29 on a non-leap target year lands on Mar 1.
fn add_years(date: NaiveDate, years: u32) -> Option<NaiveDate> {
    let year = date.year().checked_add(i32::try_from(years).ok()?)?;
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
}

fn weekday_index(weekday: Weekday) -> u8 {
    // 0..=6, always fits.
    weekday.num_days_from_sunday() as u8
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

fn weekday_names(days: &[u8]) -> Vec<&'static str> {
    WEEKDAY_NAMES
        .iter()
        .zip(0u8..)
        .filter(|(_, index)| days.contains(index))
        .map(|(name, _)| *name)
        .collect()
}

fn every(interval: Option<i32>, single: &str, unit: &str) -> String {
    match interval {
        Some(n) => format!("Every {} {}", n, unit),
        None => single.to_string(),
    }
}
