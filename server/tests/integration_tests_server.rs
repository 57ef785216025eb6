use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, NaiveDate, Utc};
use http_body_util::BodyExt; // For `collect`
use reminders_common::{CreateReminderPayload, Reminder};
use serde_json::{Value, json};
use server::database;
use server::routes::create_router;
use server::state::AppState;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt; // For `oneshot`

/// Helper function to set up a fresh, in-memory database for each test.
async fn setup_test_db_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory SQLite");

    // Same schema as the application.
    database::init_schema(&pool)
        .await
        .expect("Failed to create reminders table in test DB");

    pool
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_create_and_list_reminders() {
    let pool = setup_test_db_pool().await;
    let app = create_router(AppState::with_defaults(pool));
    let today_str = Utc::now().date_naive().to_string(); // Use a dynamic date

    // Act: Create a new reminder via POST request
    let (status, body) = send(
        &app,
        "POST",
        "/api/reminders",
        Some(json!({
            "title": "Renew passport",
            "due_date": today_str,
            "priority": "high",
            "tags": ["admin"]
        })),
    )
    .await;

    // Assert: Check that the reminder was created successfully
    assert_eq!(status, StatusCode::CREATED);
    let created: Reminder = serde_json::from_value(body).unwrap();
    assert_eq!(created.title, "Renew passport");
    assert!(!created.is_recurring);

    // Act: List reminders via GET request
    let (status, body) = send(&app, "GET", "/api/reminders", None).await;

    // Assert: Check that the list contains the new reminder
    assert_eq!(status, StatusCode::OK);
    let reminders: Vec<Reminder> = serde_json::from_value(body).unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].id, created.id);
    assert_eq!(reminders[0].tags, vec!["admin".to_string()]);
}

#[tokio::test]
async fn test_delete_reminder() {
    let pool = setup_test_db_pool().await;
    let app = create_router(AppState::with_defaults(pool));
    let (_, body) = send(
        &app,
        "POST",
        "/api/reminders",
        Some(json!({ "title": "Reminder to delete" })),
    )
    .await;
    let created: Reminder = serde_json::from_value(body).unwrap();

    // Act: Send a DELETE request for the created reminder
    let (status, _) = send(&app, "DELETE", &format!("/api/reminders/{}", created.id), None).await;

    // Assert: The delete was successful (204 NO_CONTENT) and the list is empty
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, "GET", "/api/reminders", None).await;
    let reminders: Vec<Reminder> = serde_json::from_value(body).unwrap();
    assert!(reminders.is_empty());

    // Deleting it again is a 404
    let (status, _) = send(&app, "DELETE", &format!("/api/reminders/{}", created.id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_reminder_empty_title() {
    let pool = setup_test_db_pool().await;
    let app = create_router(AppState::with_defaults(pool));

    let (status, body) = send(&app, "POST", "/api/reminders", Some(json!({ "title": "" }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Title cannot be empty.");
}

#[tokio::test]
async fn test_create_reminder_with_invalid_rule() {
    let pool = setup_test_db_pool().await;
    let app = create_router(AppState::with_defaults(pool));

    let (status, body) = send(
        &app,
        "POST",
        "/api/reminders",
        Some(json!({
            "title": "Mystery",
            "is_recurring": true,
            "repeat_pattern": "bogus"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unrecognized recurrence type: bogus.");
}

#[tokio::test]
async fn test_complete_recurring_reminder_creates_next_occurrence() {
    let pool = setup_test_db_pool().await;
    let app = create_router(AppState::with_defaults(pool));
    let today = Utc::now().date_naive();

    let (_, body) = send(
        &app,
        "POST",
        "/api/reminders",
        Some(json!({
            "title": "Water the plants",
            "due_date": today.to_string(),
            "due_time": "08:00:00",
            "is_recurring": true,
            "repeat_pattern": "daily",
            "custom_interval": 2
        })),
    )
    .await;
    let created: Reminder = serde_json::from_value(body).unwrap();
    assert_eq!(created.recurring_group_id.as_deref(), Some(created.id.as_str()));

    // Act: Complete the first occurrence
    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/reminders/{}/complete", created.id),
        None,
    )
    .await;

    // Assert: The next occurrence is two days later and belongs to the same series
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["completed"]["completed"], true);
    let next: Reminder = serde_json::from_value(body["next_occurrence"].clone()).unwrap();
    assert_eq!(next.due_date, today + Duration::days(2));
    assert_eq!(next.due_time, created.due_time);
    assert_eq!(next.recurring_group_id.as_deref(), Some(created.id.as_str()));
    assert!(!next.completed);

    // The series now holds both records, in due date order
    let (_, body) = send(&app, "GET", &format!("/api/reminders/{}/series", next.id), None).await;
    let series: Vec<Reminder> = serde_json::from_value(body).unwrap();
    let ids: Vec<&str> = series.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec![created.id.as_str(), next.id.as_str()]);

    // Completing the same reminder twice is rejected
    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/reminders/{}/complete", created.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_end_after_count_stops_the_series() {
    let pool = setup_test_db_pool().await;
    let app = create_router(AppState::with_defaults(pool));

    let (_, body) = send(
        &app,
        "POST",
        "/api/reminders",
        Some(json!({
            "title": "Take antibiotics",
            "is_recurring": true,
            "repeat_pattern": "daily",
            "recurring_end_after": 2
        })),
    )
    .await;
    let first: Reminder = serde_json::from_value(body).unwrap();

    let (_, body) = send(&app, "PATCH", &format!("/api/reminders/{}/complete", first.id), None).await;
    let second: Reminder = serde_json::from_value(body["next_occurrence"].clone()).unwrap();

    // Completing the last allowed occurrence yields nothing more
    let (status, body) =
        send(&app, "PATCH", &format!("/api/reminders/{}/complete", second.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["next_occurrence"].is_null());

    let (_, body) = send(&app, "GET", &format!("/api/reminders/{}/series", first.id), None).await;
    let series: Vec<Reminder> = serde_json::from_value(body).unwrap();
    assert_eq!(series.len(), 2);
    assert!(series.iter().all(|r| r.completed));
}

#[tokio::test]
async fn test_get_reminder_with_description() {
    let pool = setup_test_db_pool().await;
    let app = create_router(AppState::with_defaults(pool));

    let (_, body) = send(
        &app,
        "POST",
        "/api/reminders",
        Some(json!({
            "title": "Swimming",
            "is_recurring": true,
            "repeat_pattern": "weekly",
            "repeat_days": [5, 1, 3]
        })),
    )
    .await;
    let created: Reminder = serde_json::from_value(body).unwrap();

    let (status, body) = send(&app, "GET", &format!("/api/reminders/{}", created.id), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Swimming");
    assert_eq!(body["repeat_description"], "Weekly: Monday, Wednesday, Friday");
}

#[tokio::test]
async fn test_preview_occurrences() {
    let pool = setup_test_db_pool().await;
    let app = create_router(AppState::with_defaults(pool.clone()));

    let (_, body) = send(
        &app,
        "POST",
        "/api/reminders",
        Some(json!({
            "title": "Pay rent",
            "due_date": "2024-01-31",
            "is_recurring": true,
            "repeat_pattern": "monthly",
            "recurring_end_date": "2024-04-15"
        })),
    )
    .await;
    let created: Reminder = serde_json::from_value(body).unwrap();

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/reminders/{}/occurrences?count=10", created.id),
        None,
    )
    .await;

    // The end date cuts the preview short
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "Monthly");
    let dates: Vec<NaiveDate> = serde_json::from_value(body["dates"].clone()).unwrap();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 29).unwrap()
        ]
    );

    // Previews are never stored
    let series = database::get_series_reminders(&pool, &created.id).await.unwrap();
    assert_eq!(series.len(), 1);
}

#[tokio::test]
async fn test_sweep_endpoint_generates_once() {
    let pool = setup_test_db_pool().await;
    let app = create_router(AppState::with_defaults(pool.clone()));
    let today = Utc::now().date_naive();

    // An overdue recurring reminder, inserted directly as an older record would be
    let overdue = CreateReminderPayload {
        title: "Weekly review".to_string(),
        due_date: Some(today - Duration::days(3)),
        is_recurring: true,
        repeat_pattern: Some("weekly".to_string()),
        ..Default::default()
    }
    .into_reminder(Utc::now());
    database::insert_reminder(&pool, &overdue).await.unwrap();

    let (status, body) = send(&app, "POST", "/api/reminders/sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scanned"], 1);
    assert_eq!(body["generated"], 1);

    // A second sweep right away is throttled
    let (_, body) = send(&app, "POST", "/api/reminders/sweep", None).await;
    assert_eq!(body["throttled"], true);

    let series = database::get_series_reminders(&pool, &overdue.id).await.unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[1].due_date, today + Duration::days(4));
}
