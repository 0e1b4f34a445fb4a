use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::config::AppConfig;
use crate::services::historical_prices::HistoricalPriceUpdater;
use crate::services::progress::ProgressTracker;
use crate::services::provider::MarketDataProvider;
use crate::services::sync_status::{self, intervals, jobs};

/// How often the job wakes up to check whether a run is due
const CHECK_INTERVAL_SECS: u64 = 3600;

pub async fn start_historical_prices_sync_job(
    db: DatabaseConnection,
    provider: Arc<dyn MarketDataProvider>,
    config: Arc<AppConfig>,
    tracker: ProgressTracker,
) {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(CHECK_INTERVAL_SECS));

        loop {
            interval.tick().await;

            if let Err(e) = sync_historical_prices(&db, provider.as_ref(), &config, &tracker).await {
                tracing::error!("Historical prices sync failed: {}", e);
                if let Err(record_err) = sync_status::record_failure(
                    &db,
                    jobs::HISTORICAL_PRICES,
                    intervals::HISTORICAL_PRICES,
                    &e.to_string(),
                )
                .await
                {
                    tracing::warn!("Failed to record sync failure: {}", record_err);
                }
            }
        }
    });
}

async fn sync_historical_prices(
    db: &DatabaseConnection,
    provider: &dyn MarketDataProvider,
    config: &AppConfig,
    tracker: &ProgressTracker,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !sync_status::should_sync(db, jobs::HISTORICAL_PRICES).await? {
        return Ok(());
    }

    if tracker.snapshot().is_running {
        tracing::info!("Historical update already running (manual trigger), skipping scheduled run");
        return Ok(());
    }

    tracing::info!("Starting scheduled historical prices sync");
    let report = HistoricalPriceUpdater::new(db, provider, config)
        .update_all(tracker)
        .await?;

    let summary = format!(
        "updated={} skipped={} errors={}",
        report.updated_count, report.skipped_count, report.error_count
    );
    sync_status::record_success(db, jobs::HISTORICAL_PRICES, intervals::HISTORICAL_PRICES, &summary)
        .await?;

    tracing::info!("Historical prices sync complete: {}", summary);
    Ok(())
}
