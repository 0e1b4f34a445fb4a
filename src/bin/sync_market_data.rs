use std::env;

use chrono::Utc;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sectorscope_backend::config::{parse_yyyymmdd, AppConfig};
use sectorscope_backend::services::daily_indicators::update_daily_indicators;
use sectorscope_backend::services::fundamentals::FundamentalsUpdater;
use sectorscope_backend::services::historical_prices::HistoricalPriceUpdater;
use sectorscope_backend::services::instruments::refresh_instruments;
use sectorscope_backend::services::progress::ProgressTracker;
use sectorscope_backend::services::rate_limiter::RateLimiter;
use sectorscope_backend::services::sector_membership::reconcile_all_index_sectors;
use sectorscope_backend::services::tushare::TushareClient;

const USAGE: &str = "Usage: cargo run --bin sync_market_data <instruments|historical [code]|indicators [YYYYMMDD]|fundamentals [code]|reconcile>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sectorscope_backend=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let Some(task) = args.get(1) else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };
    let target = args.get(2).map(String::as_str);

    let config = AppConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url).await?;
    migration::Migrator::up(&db, None).await?;

    let provider = TushareClient::new(
        config.tushare_token.clone(),
        config.tushare_base_url.clone(),
        RateLimiter::new(config.rate_limit, config.rate_window),
    );

    match task.as_str() {
        "instruments" => {
            let report = refresh_instruments(&db, &provider).await?;
            tracing::info!("Stored {} instruments", report.count);
        }
        "historical" => {
            let updater = HistoricalPriceUpdater::new(&db, &provider, &config);
            let report = match target {
                Some(code) => updater.update_one(code).await?,
                None => updater.update_all(&ProgressTracker::new()).await?,
            };
            tracing::info!(
                "Historical update: {} updated, {} skipped, {} errors",
                report.updated_count,
                report.skipped_count,
                report.error_count
            );
            for line in &report.error_logs {
                tracing::warn!("{}", line);
            }
        }
        "indicators" => {
            let trade_date = match target {
                Some(raw) => parse_yyyymmdd(raw)
                    .ok_or_else(|| format!("Invalid trade date '{}', expected YYYYMMDD", raw))?,
                None => Utc::now().date_naive(),
            };
            let report = update_daily_indicators(&db, &provider, trade_date).await?;
            tracing::info!("{}", report.message);
        }
        "fundamentals" => {
            let updater = FundamentalsUpdater::new(&db, &provider, &config);
            let report = match target {
                Some(code) => updater.update_one(code).await?,
                None => updater.update_all().await?,
            };
            tracing::info!("{}", report.message);
        }
        "reconcile" => {
            for (code, result) in reconcile_all_index_sectors(&db, &provider).await? {
                match result {
                    Ok(stats) => tracing::info!(
                        "{}: +{} -{} ={} (total {})",
                        code,
                        stats.added,
                        stats.removed,
                        stats.unchanged,
                        stats.total
                    ),
                    Err(e) => tracing::error!("{}: reconcile failed: {}", code, e),
                }
            }
        }
        other => {
            eprintln!("Unknown task '{}'", other);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }

    Ok(())
}
