use std::sync::Arc;

use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sectorscope_backend::{
    config::AppConfig,
    jobs,
    routes::build_router,
    services::{progress::ProgressTracker, rate_limiter::RateLimiter, tushare::TushareClient},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sectorscope_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;

    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None).await?;

    let limiter = RateLimiter::new(config.rate_limit, config.rate_window);
    let provider = TushareClient::new(
        config.tushare_token.clone(),
        config.tushare_base_url.clone(),
        limiter,
    );

    let state = AppState {
        db,
        provider: Arc::new(provider),
        config: Arc::new(config),
        progress: ProgressTracker::new(),
    };

    if state.config.enable_jobs {
        tracing::info!("Starting scheduled jobs");
        jobs::start_all(&state).await;
    } else {
        tracing::info!("Scheduled jobs disabled (ENABLE_SCHEDULED_JOBS=false)");
    }

    let bind_addr = state.config.bind_addr.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
