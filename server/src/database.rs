// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use reminders_common::Reminder;
use sqlx::types::Json;
use sqlx::{Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::{debug, info};

const CREATE_REMINDERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS reminders (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NULL,
        reminder_type TEXT NOT NULL,
        priority TEXT NOT NULL,
        location TEXT NULL,
        due_date DATE NOT NULL,
        due_time TIME NULL,
        completed BOOLEAN NOT NULL DEFAULT 0,
        completed_at TIMESTAMP NULL,
        is_recurring BOOLEAN NOT NULL DEFAULT 0,
        repeat_pattern TEXT NULL,
        custom_interval INTEGER NULL,
        repeat_days TEXT NOT NULL DEFAULT '[]',
        recurring_end_date TEXT NULL,
        recurring_end_after INTEGER NULL,
        recurring_group_id TEXT NULL,
        notification_enabled BOOLEAN NOT NULL DEFAULT 0,
        notification_timings TEXT NOT NULL DEFAULT '[]',
        tags TEXT NOT NULL DEFAULT '[]',
        assigned_to TEXT NULL,
        assigned_by TEXT NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        deleted_at TIMESTAMP NULL
    );
"#;

const CREATE_GROUP_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_reminders_group ON reminders (recurring_group_id, due_date);";

/// Establishes the database connection pool.
/// If the database does not exist, it creates it.
/// It also ensures the `reminders` table has the correct schema.
pub async fn establish_connection_pool(database_url: &str) -> Result<SqlitePool> {
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        info!("Creating database {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .context("Failed to create database")?;
    } else {
        info!("Database already exists.");
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .context("Failed to connect to database")?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Creates the `reminders` table and its indexes when missing.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(CREATE_REMINDERS_TABLE)
        .execute(pool)
        .await
        .context("Failed to create 'reminders' table")?;

    sqlx::query(CREATE_GROUP_INDEX)
        .execute(pool)
        .await
        .context("Failed to create recurring group index")?;

    info!("'reminders' table is ready.");
    Ok(())
}

/// Persists a fully built reminder record as-is.
pub async fn insert_reminder(pool: &SqlitePool, reminder: &Reminder) -> Result<()> {
    debug!(
        "Insert reminder: id={}, title={}, due_date={}, group={:?}",
        reminder.id, reminder.title, reminder.due_date, reminder.recurring_group_id
    );

    sqlx::query(
        r#"
        INSERT INTO reminders (
            id, user_id, title, description, reminder_type, priority, location,
            due_date, due_time, completed, completed_at, is_recurring, repeat_pattern,
            custom_interval, repeat_days, recurring_end_date, recurring_end_after,
            recurring_group_id, notification_enabled, notification_timings, tags,
            assigned_to, assigned_by, created_at, updated_at, deleted_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&reminder.id)
    .bind(&reminder.user_id)
    .bind(&reminder.title)
    .bind(&reminder.description)
    .bind(reminder.reminder_type)
    .bind(reminder.priority)
    .bind(&reminder.location)
    .bind(reminder.due_date)
    .bind(reminder.due_time)
    .bind(reminder.completed)
    .bind(reminder.completed_at)
    .bind(reminder.is_recurring)
    .bind(&reminder.repeat_pattern)
    .bind(reminder.custom_interval)
    .bind(Json(&reminder.repeat_days))
    .bind(&reminder.recurring_end_date)
    .bind(reminder.recurring_end_after)
    .bind(&reminder.recurring_group_id)
    .bind(reminder.notification_enabled)
    .bind(Json(&reminder.notification_timings))
    .bind(Json(&reminder.tags))
    .bind(&reminder.assigned_to)
    .bind(&reminder.assigned_by)
    .bind(reminder.created_at)
    .bind(reminder.updated_at)
    .bind(reminder.deleted_at)
    .execute(pool)
    .await
    .context(format!("Failed to insert reminder {} into DB", reminder.id))?;

    Ok(())
}

/// Fetches one reminder, soft-deleted ones included.
pub async fn get_reminder_by_id(pool: &SqlitePool, reminder_id: &str) -> Result<Option<Reminder>> {
    sqlx::query_as::<_, Reminder>("SELECT * FROM reminders WHERE id = ?")
        .bind(reminder_id)
        .fetch_optional(pool)
        .await
        .context(format!("Failed to fetch reminder {}", reminder_id))
}

/// Retrieves every reminder that is not soft-deleted, earliest first.
pub async fn list_active_reminders(pool: &SqlitePool) -> Result<Vec<Reminder>> {
    sqlx::query_as::<_, Reminder>(
        "SELECT * FROM reminders WHERE deleted_at IS NULL ORDER BY due_date ASC, due_time ASC NULLS LAST;",
    )
    .fetch_all(pool)
    .await
    .context("Failed to retrieve reminders from DB")
}

/// All live occurrences of a recurring series, ordered by due date.
///
/// The root record of a series may predate group ids, so it is matched by id too.
pub async fn get_series_reminders(pool: &SqlitePool, series_id: &str) -> Result<Vec<Reminder>> {
    sqlx::query_as::<_, Reminder>(
        "SELECT * FROM reminders WHERE (recurring_group_id = ? OR id = ?) AND deleted_at IS NULL ORDER BY due_date ASC;",
    )
    .bind(series_id)
    .bind(series_id)
    .fetch_all(pool)
    .await
    .context(format!("Failed to retrieve series {}", series_id))
}

/// Marks a reminder as completed.
/// Returns false if it doesn't exist, is deleted, or was already completed.
pub async fn complete_reminder_in_db(
    pool: &SqlitePool,
    reminder_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE reminders SET completed = 1, completed_at = ?, updated_at = ? WHERE id = ? AND completed = 0 AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(reminder_id)
    .execute(pool)
    .await
    .context(format!("Failed to complete reminder with ID: {}", reminder_id))?;

    Ok(result.rows_affected() > 0)
}

/// Clears the completion of a reminder whose next occurrence could not be stored.
pub async fn reopen_reminder_in_db(
    pool: &SqlitePool,
    reminder_id: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE reminders SET completed = 0, completed_at = NULL, updated_at = ? WHERE id = ? AND completed = 1",
    )
    .bind(now)
    .bind(reminder_id)
    .execute(pool)
    .await
    .context(format!("Failed to reopen reminder with ID: {}", reminder_id))?;

    Ok(result.rows_affected() > 0)
}

/// Soft deletes a reminder by setting its `deleted_at` timestamp.
/// Returns true if a reminder was updated, false if no live reminder had that ID.
pub async fn soft_delete_reminder_in_db(pool: &SqlitePool, reminder_id: &str) -> Result<bool> {
    debug!("Attempting to soft delete reminder with ID: {}", reminder_id);
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE reminders SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(reminder_id)
    .execute(pool)
    .await
    .context(format!("Failed to soft delete reminder with ID: {}", reminder_id))?;

    let rows_affected = result.rows_affected();
    info!(
        "Soft deleted {} rows for reminder ID: {}",
        rows_affected, reminder_id
    );

    Ok(rows_affected > 0)
}

/// Recurring reminders still open whose due date is before `today`.
pub async fn find_overdue_recurring_reminders(
    pool: &SqlitePool,
    today: NaiveDate,
) -> Result<Vec<Reminder>> {
    sqlx::query_as::<_, Reminder>(
        "SELECT * FROM reminders WHERE is_recurring = 1 AND completed = 0 AND deleted_at IS NULL AND due_date < ? ORDER BY due_date ASC;",
    )
    .bind(today)
    .fetch_all(pool)
    .await
    .context("Failed to retrieve overdue recurring reminders")
}
