//! Formsync Server - mirrors form submissions into sheets.
//!
//! Hosts the formsync engine behind an HTTP API. Forms, submissions, mappings,
//! sheets and the activity log all live in PostgreSQL; the engine reaches them
//! through the collaborators in [`db`].

mod auth;
mod config;
mod db;
mod error;
mod routes;

use crate::config::Config;
use crate::db::{PgActivityLog, PgFormRepository, PgMappingStore, PgSheetStore, Pool};
use axum::Router;
use formsync_engine::{Collaborators, SyncOrchestrator};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

/// Wire the engine to the PostgreSQL-backed collaborators.
fn build_orchestrator(pool: &Pool, config: &Config) -> SyncOrchestrator {
    let forms = Arc::new(PgFormRepository::new(pool.clone()));

    SyncOrchestrator::new(
        config.sync_config(),
        Collaborators {
            schema: forms.clone(),
            submissions: forms,
            store: Arc::new(PgSheetStore::new(pool.clone(), config.public_url.clone())),
            mappings: Arc::new(PgMappingStore::new(pool.clone())),
            notifier: Arc::new(PgActivityLog::new(pool.clone(), config.log_retention)),
        },
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "formsync_server=debug,formsync_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Formsync Server on {}:{}", config.host, config.port);

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Build application state
    let orchestrator = Arc::new(build_orchestrator(&pool, &config));
    tracing::debug!(?orchestrator, "sync engine ready");
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        orchestrator,
    };

    // Build router
    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
