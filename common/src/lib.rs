// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
pub mod recurrence;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of item a reminder describes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReminderType {
    #[default]
    Task,
    Event,
    Note,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[allow(clippy::doc_overindented_list_items)]
/// A reminder record, either a one-off item or one occurrence of a recurring series.
///
/// Derivation attributes (derive):
/// - `Serialize`, `Deserialize`: Allows conversion to/from JSON.
/// - `sqlx::FromRow`: Allows `sqlx` to build a `Reminder` directly from a row
///    of the `reminders` table. List-valued fields are stored as JSON text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Reminder {
    pub id: String,

    pub user_id: String,

    pub title: String,

    pub description: Option<String>,

    pub reminder_type: ReminderType,

    pub priority: Priority,

    pub location: Option<String>,

    // Only the calendar day matters for recurrence, the time of day is carried as-is.
    pub due_date: NaiveDate,

    pub due_time: Option<NaiveTime>,

    pub completed: bool,

    pub completed_at: Option<DateTime<Utc>>,

    pub is_recurring: bool,

    /// Raw recurrence type (`daily`, `weekly`, ...). Kept as text so that an
    /// unknown value can be reported by validation instead of failing to load.
    pub repeat_pattern: Option<String>,

    pub custom_interval: Option<i32>,

    /// Weekdays for weekly rules, 0 = Sunday.
    #[sqlx(json)]
    #[serde(default)]
    pub repeat_days: Vec<u8>,

    pub recurring_end_date: Option<String>,

    /// Maximum number of occurrences in the series.
    pub recurring_end_after: Option<i32>,

    pub recurring_group_id: Option<String>,

    pub notification_enabled: bool,

    /// Minutes before the due time at which a notification fires.
    #[sqlx(json)]
    #[serde(default)]
    pub notification_timings: Vec<i32>,

    #[sqlx(json)]
    #[serde(default)]
    pub tags: Vec<String>,

    pub assigned_to: Option<String>,

    pub assigned_by: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl Reminder {
    /// Key shared by every occurrence of the same recurring series.
    /// A record without a group id is the first occurrence of its own series.
    pub fn series_id(&self) -> &str {
        self.recurring_group_id.as_deref().unwrap_or(&self.id)
    }
}

/// Structure used to receive reminder creation data from the API.
/// Identity, timestamps and completion state are assigned server-side.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CreateReminderPayload {
    #[serde(default)]
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub reminder_type: Option<ReminderType>,
    pub priority: Option<Priority>,
    pub location: Option<String>,
    // The day is optional. If not provided, the current day is used.
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    #[serde(default)]
    pub is_recurring: bool,
    pub repeat_pattern: Option<String>,
    pub custom_interval: Option<i32>,
    #[serde(default)]
    pub repeat_days: Vec<u8>,
    pub recurring_end_date: Option<String>,
    pub recurring_end_after: Option<i32>,
    #[serde(default)]
    pub notification_enabled: bool,
    #[serde(default)]
    pub notification_timings: Vec<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub assigned_to: Option<String>,
    pub assigned_by: Option<String>,
}

impl CreateReminderPayload {
    /// Turns the payload into a fresh record created at `now`.
    ///
    /// A recurring reminder becomes the first occurrence of a new series, so
    /// its group id is its own id.
    pub fn into_reminder(self, now: DateTime<Utc>) -> Reminder {
        let id = Uuid::new_v4().to_string();
        let recurring_group_id = self.is_recurring.then(|| id.clone());

        Reminder {
            id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            reminder_type: self.reminder_type.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            location: self.location,
            due_date: self.due_date.unwrap_or_else(|| now.date_naive()),
            due_time: self.due_time,
            completed: false,
            completed_at: None,
            is_recurring: self.is_recurring,
            repeat_pattern: self.repeat_pattern,
            custom_interval: self.custom_interval,
            repeat_days: self.repeat_days,
            recurring_end_date: self.recurring_end_date,
            recurring_end_after: self.recurring_end_after,
            recurring_group_id,
            notification_enabled: self.notification_enabled,
            notification_timings: self.notification_timings,
            tags: self.tags,
            assigned_to: self.assigned_to,
            assigned_by: self.assigned_by,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
