// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::handlers;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Creates and configures the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // `GET /api/reminders` lists live reminders, `POST` creates one
        .route(
            "/api/reminders",
            get(handlers::list_reminders).post(handlers::create_reminder),
        )
        // Static segment, matched before `{id}`
        .route("/api/reminders/sweep", post(handlers::run_sweep))
        .route(
            "/api/reminders/{id}",
            get(handlers::get_reminder).delete(handlers::delete_reminder),
        )
        .route(
            "/api/reminders/{id}/complete",
            patch(handlers::complete_reminder),
        )
        .route("/api/reminders/{id}/series", get(handlers::get_series))
        .route(
            "/api/reminders/{id}/occurrences",
            get(handlers::preview_occurrences),
        )
        // Adds the database pool and series coordinator to the application state
        .with_state(state)
}
