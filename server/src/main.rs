// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::sync::Arc;

use axum::http::HeaderName;
use chrono::Utc;
use server::config::ServerConfig;
use server::series::{self, SeriesCoordinator};
use server::state::AppState;
use server::{database, routes};
use tokio::time;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting up the server...");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:?}", e);
            std::process::exit(1);
        }
    };

    let db_pool = match database::establish_connection_pool(&config.database_url).await {
        Ok(pool) => {
            tracing::info!("Database connection was made successfully.");
            pool
        }
        Err(e) => {
            tracing::error!("Failed to connect with the database: {:?}", e);
            std::process::exit(1);
        }
    };

    let (cooldown, sweep_min_interval) = match (
        chrono::Duration::from_std(config.series_cooldown),
        chrono::Duration::from_std(config.sweep_min_interval),
    ) {
        (Ok(cooldown), Ok(min_interval)) => (cooldown, min_interval),
        _ => {
            tracing::error!("Cooldown settings are out of range.");
            std::process::exit(1);
        }
    };
    let coordinator = Arc::new(SeriesCoordinator::new(cooldown, sweep_min_interval));

    let sweep_pool = db_pool.clone(); // Clone the pool for the catch-up sweep
    let sweep_coordinator = Arc::clone(&coordinator);
    let sweep_interval = config.sweep_interval;
    let sweep_timeout = config.sweep_timeout;

    tokio::spawn(async move {
        let mut interval = time::interval(sweep_interval);

        // The first tick completes immediately. Skip it to wait for the first interval.
        interval.tick().await;

        loop {
            interval.tick().await; // Wait for the next interval tick

            let sweep = series::run_overdue_sweep(&sweep_pool, &sweep_coordinator, Utc::now());
            match time::timeout(sweep_timeout, sweep).await {
                Ok(Ok(report)) if report.throttled => {
                    tracing::debug!("Overdue sweep throttled.");
                }
                Ok(Ok(report)) => {
                    tracing::info!(
                        "Overdue sweep done: {} scanned, {} generated, {} skipped, {} failed.",
                        report.scanned,
                        report.generated,
                        report.skipped,
                        report.failed
                    );
                }
                Ok(Err(e)) => {
                    tracing::error!("Error during overdue sweep: {:?}", e);
                }
                Err(_) => {
                    tracing::error!("Overdue sweep timed out after {:?}.", sweep_timeout);
                }
            }
        }
    });

    let app_routes = routes::create_router(AppState::new(db_pool, coordinator));

    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("accept"),
        ])
        .allow_origin(Any);

    let app = app_routes.layer(cors).layer(TraceLayer::new_for_http());

    tracing::info!("The server listens on http://{}", config.bind_addr);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {:?}", config.bind_addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {:?}", e);
        std::process::exit(1);
    }
}
