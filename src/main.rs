//! Circulation Server - library loan transaction service

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use circulation_server::{
    api,
    config::{AppConfig, LoggingConfig, StorageBackend},
    repository::{memory::InMemoryStore, Repository},
    services::{loans::LoansService, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting Circulation Server v{}", env!("CARGO_PKG_VERSION"));

    let repository = match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!("Database migrations completed");

            Repository::new(pool)
        }
        StorageBackend::Memory => {
            let seed = &config.storage.seed;
            let store = InMemoryStore::new();
            store.seed(seed).await;
            tracing::warn!(
                copies = seed.copies.len(),
                members = seed.members.len(),
                "Using in-memory storage, state is lost on shutdown"
            );
            Repository::in_memory(store)
        }
    };

    let services = Services::new(repository, config.loans.clone());

    if config.sweep.interval_secs > 0 {
        spawn_overdue_sweep(
            services.loans.clone(),
            Duration::from_secs(config.sweep.interval_secs),
        );
    }

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("circulation_server={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Periodic overdue sweep, standing in for an external scheduler
fn spawn_overdue_sweep(loans: LoansService, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = loans.sweep_overdue(Utc::now()).await {
                tracing::error!(error = %e, "Overdue sweep failed");
            }
        }
    });
}
