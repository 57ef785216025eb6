// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::database;
use crate::series::{self, SweepReport};
use crate::state::AppState;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use reminders_common::recurrence::{
    generate_occurrences, get_recurring_pattern_description, parse_recurring_pattern,
    validate_recurring_pattern,
};
use reminders_common::{CreateReminderPayload, Reminder};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

const DEFAULT_PREVIEW_COUNT: usize = 5;
const MAX_PREVIEW_COUNT: usize = 100;

/// A reminder together with its human readable repeat rule.
#[derive(Serialize, Deserialize, Debug)]
pub struct ReminderDetails {
    #[serde(flatten)]
    pub reminder: Reminder,
    pub repeat_description: String,
}

/// Result of completing a reminder.
#[derive(Serialize, Deserialize, Debug)]
pub struct CompletionResponse {
    pub completed: Reminder,
    pub next_occurrence: Option<Reminder>,
}

#[derive(Deserialize, Debug)]
pub struct PreviewQuery {
    pub count: Option<usize>,
}

/// Upcoming dates of a series, computed but not stored.
#[derive(Serialize, Deserialize, Debug)]
pub struct OccurrencePreview {
    pub description: String,
    pub dates: Vec<NaiveDate>,
}

/// Handler for listing every live reminder.
pub async fn list_reminders(
    State(state): State<AppState>, // State injection (DB pool + series coordinator)
) -> Result<Json<Vec<Reminder>>, AppError> {
    let reminders = database::list_active_reminders(&state.pool).await?;
    info!("Successfully retrieved {} reminders.", reminders.len());
    Ok(Json(reminders))
}

/// Handler for creating a new reminder.
pub async fn create_reminder(
    State(state): State<AppState>,
    Json(payload): Json<CreateReminderPayload>, // Extracting the request body as JSON
) -> Result<(StatusCode, Json<Reminder>), AppError> {
    debug!("Received request to create reminder: {}", payload.title);

    if payload.title.trim().is_empty() {
        error!("Validation failed: title is empty.");
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Title cannot be empty.",
        ));
    }

    let reminder = payload.into_reminder(Utc::now());

    // Recurring reminders must carry a rule the engine can interpret.
    if reminder.is_recurring {
        let validation = validate_recurring_pattern(&parse_recurring_pattern(&reminder));
        if !validation.is_valid {
            error!("Validation failed: {:?}", validation.errors);
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                &validation.errors.join(" "),
            ));
        }
    }

    database::insert_reminder(&state.pool, &reminder).await?;
    info!("Reminder created successfully with ID: {}", reminder.id);

    // Return a 201 Created status with the new reminder as JSON.
    Ok((StatusCode::CREATED, Json(reminder)))
}

/// Handler returning one reminder with its repeat description.
pub async fn get_reminder(
    State(state): State<AppState>,
    Path(reminder_id): Path<String>,
) -> Result<Json<ReminderDetails>, AppError> {
    let reminder = fetch_live_reminder(&state, &reminder_id).await?;
    let repeat_description = get_recurring_pattern_description(&reminder);
    Ok(Json(ReminderDetails {
        reminder,
        repeat_description,
    }))
}

/// Handler for deleting a reminder by ID.
pub async fn delete_reminder(
    State(state): State<AppState>,
    Path(reminder_id): Path<String>, // Extract reminder ID from the URL path
) -> Result<StatusCode, AppError> {
    debug!("Attempting to delete reminder with ID: {}", reminder_id);

    let deleted = database::soft_delete_reminder_in_db(&state.pool, &reminder_id).await?;

    if deleted {
        info!("Reminder with ID {} deleted successfully.", reminder_id);
        Ok(StatusCode::NO_CONTENT) // 204 No Content for successful deletion
    } else {
        error!("Reminder with ID {} not found for deletion.", reminder_id);
        Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Reminder with ID {} not found for deletion.", reminder_id),
        ))
    }
}

/// Handler for completing a reminder.
/// For a recurring reminder this also creates the next occurrence when the series allows it.
pub async fn complete_reminder(
    State(state): State<AppState>,
    Path(reminder_id): Path<String>,
) -> Result<Json<CompletionResponse>, AppError> {
    let reminder = fetch_live_reminder(&state, &reminder_id).await?;
    let already_completed = || {
        AppError::new(
            StatusCode::CONFLICT,
            &format!("Reminder with ID {} is already completed.", reminder_id),
        )
    };
    if reminder.completed {
        return Err(already_completed());
    }

    let now = Utc::now();
    if !database::complete_reminder_in_db(&state.pool, &reminder_id, now).await? {
        return Err(already_completed());
    }

    // The engine works from the record as it was before completion.
    let next_occurrence = if reminder.is_recurring {
        match series::advance_series(&state.pool, &state.series, &reminder, now).await {
            Ok(next) => next,
            Err(e) => {
                // Left completed, the series would never be picked up again.
                if let Err(reopen_err) =
                    database::reopen_reminder_in_db(&state.pool, &reminder_id, Utc::now()).await
                {
                    error!(
                        "Failed to reopen reminder {} after a failed extension: {:?}",
                        reminder_id, reopen_err
                    );
                }
                return Err(e.into());
            }
        }
    } else {
        None
    };

    info!(
        "Reminder {} completed, next occurrence: {:?}",
        reminder_id,
        next_occurrence.as_ref().map(|next| next.due_date)
    );

    let completed = Reminder {
        completed: true,
        completed_at: Some(now),
        updated_at: now,
        ..reminder
    };
    Ok(Json(CompletionResponse {
        completed,
        next_occurrence,
    }))
}

/// Handler listing every live occurrence in the reminder's series.
pub async fn get_series(
    State(state): State<AppState>,
    Path(reminder_id): Path<String>,
) -> Result<Json<Vec<Reminder>>, AppError> {
    let reminder = fetch_live_reminder(&state, &reminder_id).await?;
    let series = database::get_series_reminders(&state.pool, reminder.series_id()).await?;
    Ok(Json(series))
}

/// Handler previewing the next dates of a recurring reminder without storing them.
pub async fn preview_occurrences(
    State(state): State<AppState>,
    Path(reminder_id): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<OccurrencePreview>, AppError> {
    let reminder = fetch_live_reminder(&state, &reminder_id).await?;
    let count = query
        .count
        .unwrap_or(DEFAULT_PREVIEW_COUNT)
        .min(MAX_PREVIEW_COUNT);

    let dates = generate_occurrences(&reminder, count)
        .into_iter()
        .map(|occurrence| occurrence.due_date)
        .collect();

    Ok(Json(OccurrencePreview {
        description: get_recurring_pattern_description(&reminder),
        dates,
    }))
}

/// Handler running the overdue catch-up sweep on demand.
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    debug!("Received request to run the overdue sweep.");
    let report = series::run_overdue_sweep(&state.pool, &state.series, Utc::now()).await?;
    Ok(Json(report))
}

async fn fetch_live_reminder(state: &AppState, reminder_id: &str) -> Result<Reminder, AppError> {
    match database::get_reminder_by_id(&state.pool, reminder_id).await? {
        Some(reminder) if reminder.deleted_at.is_none() => Ok(reminder),
        _ => Err(AppError::new(
            StatusCode::NOT_FOUND,
            &format!("Reminder with ID {} not found.", reminder_id),
        )),
    }
}

// --- Custom Error Handling ---

/// Error type returned by every handler.
pub struct AppError {
    code: StatusCode,
    message: String,
}

impl AppError {
    fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
        }
    }
}

/// Allows converting an `anyhow::Error` (coming from `database.rs` or `series.rs`)
/// into our `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Log the internal error for debugging.
        tracing::error!("Internal server error: {:?}", err);
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: "An internal error occurred.".to_string(),
        }
    }
}

/// Allows Axum to convert our `AppError` into an HTTP `Response`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            "Responding with error: status_code={}, message={}",
            self.code.as_u16(),
            self.message
        );
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_state() -> AppState {
        let pool: SqlitePool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        database::init_schema(&pool).await.unwrap();
        AppState::with_defaults(pool)
    }

    // Helper to create a payload for tests
    fn create_test_payload(title: &str, repeat_pattern: Option<&str>) -> Json<CreateReminderPayload> {
        Json(CreateReminderPayload {
            title: title.to_string(),
            is_recurring: repeat_pattern.is_some(),
            repeat_pattern: repeat_pattern.map(str::to_string),
            due_date: Some(Utc::now().date_naive()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_create_reminder_validation_empty_title() {
        // Arrange
        let state = test_state().await;
        let payload = create_test_payload("   ", None);

        // Act
        let result = create_reminder(State(state), payload).await;

        // Assert
        let err = result.err().unwrap();
        assert_eq!(err.code, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Title cannot be empty.");
    }

    #[tokio::test]
    async fn test_create_reminder_validation_bad_rule() {
        let state = test_state().await;
        let payload = create_test_payload("Feed the cat", Some("hourly"));

        let result = create_reminder(State(state.clone()), payload).await;

        let err = result.err().unwrap();
        assert_eq!(err.code, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("Unrecognized recurrence type: hourly"));
        // Nothing was stored.
        assert!(
            database::list_active_reminders(&state.pool)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_create_reminder_validation_non_positive_interval() {
        let state = test_state().await;
        let mut payload = create_test_payload("Backup", Some("daily"));
        payload.custom_interval = Some(-2);

        let err = create_reminder(State(state), payload).await.err().unwrap();

        assert_eq!(err.code, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("Interval must be a positive number"));
    }

    #[tokio::test]
    async fn test_complete_one_off_reminder() {
        let state = test_state().await;
        let (_, Json(created)) = create_reminder(State(state.clone()), create_test_payload("Call mum", None))
            .await
            .ok()
            .unwrap();

        let Json(response) = complete_reminder(State(state.clone()), Path(created.id.clone()))
            .await
            .ok()
            .unwrap();

        assert!(response.completed.completed);
        assert!(response.next_occurrence.is_none());

        // Completing again is a conflict.
        let err = complete_reminder(State(state), Path(created.id))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_failed_extension_reopens_reminder() {
        let state = test_state().await;
        let (_, Json(created)) =
            create_reminder(State(state.clone()), create_test_payload("Water plants", Some("daily")))
                .await
                .ok()
                .unwrap();
        // Storage refuses every generated occurrence.
        sqlx::query(
            "CREATE TRIGGER reject_occurrences BEFORE INSERT ON reminders \
             WHEN NEW.id <> NEW.recurring_group_id \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&state.pool)
        .await
        .unwrap();

        let err = complete_reminder(State(state.clone()), Path(created.id.clone()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code, StatusCode::INTERNAL_SERVER_ERROR);

        // The reminder stays open, so a later completion or sweep can extend it.
        let stored = database::get_reminder_by_id(&state.pool, &created.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.completed);
        assert!(stored.completed_at.is_none());
        let series = database::get_series_reminders(&state.pool, &created.id)
            .await
            .unwrap();
        assert_eq!(series.len(), 1);

        sqlx::query("DROP TRIGGER reject_occurrences")
            .execute(&state.pool)
            .await
            .unwrap();
        let Json(response) = complete_reminder(State(state), Path(created.id))
            .await
            .ok()
            .unwrap();
        assert!(response.next_occurrence.is_some());
    }

    #[tokio::test]
    async fn test_preview_is_capped() {
        let state = test_state().await;
        let (_, Json(created)) =
            create_reminder(State(state.clone()), create_test_payload("Stand-up", Some("weekdays")))
                .await
                .ok()
                .unwrap();

        let Json(preview) = preview_occurrences(
            State(state),
            Path(created.id),
            Query(PreviewQuery { count: Some(1000) }),
        )
        .await
        .ok()
        .unwrap();

        assert_eq!(preview.description, "Weekdays");
        assert_eq!(preview.dates.len(), MAX_PREVIEW_COUNT);
    }

    #[tokio::test]
    async fn test_unknown_reminder_is_not_found() {
        let state = test_state().await;

        let err = get_reminder(State(state), Path("missing".to_string()))
            .await
            .err()
            .unwrap();

        assert_eq!(err.code, StatusCode::NOT_FOUND);
    }
}
