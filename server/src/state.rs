// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::sync::Arc;

use chrono::Duration;
use sqlx::SqlitePool;

use crate::series::SeriesCoordinator;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub series: Arc<SeriesCoordinator>,
}

impl AppState {
    pub fn new(pool: SqlitePool, series: Arc<SeriesCoordinator>) -> Self {
        Self { pool, series }
    }

    /// State with the default one minute cooldown and sweep spacing.
    pub fn with_defaults(pool: SqlitePool) -> Self {
        Self::new(
            pool,
            Arc::new(SeriesCoordinator::new(
                Duration::seconds(60),
                Duration::seconds(60),
            )),
        )
    }
}
