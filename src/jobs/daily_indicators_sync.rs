use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::services::daily_indicators::update_daily_indicators;
use crate::services::provider::MarketDataProvider;
use crate::services::sync_status::{self, intervals, jobs};

const CHECK_INTERVAL_SECS: u64 = 3600;

pub async fn start_daily_indicators_sync_job(
    db: DatabaseConnection,
    provider: Arc<dyn MarketDataProvider>,
) {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(CHECK_INTERVAL_SECS));

        loop {
            interval.tick().await;

            if let Err(e) = sync_daily_indicators(&db, provider.as_ref()).await {
                tracing::error!("Daily indicators sync failed: {}", e);
                if let Err(record_err) = sync_status::record_failure(
                    &db,
                    jobs::DAILY_INDICATORS,
                    intervals::DAILY_INDICATORS,
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

async fn sync_daily_indicators(
    db: &DatabaseConnection,
    provider: &dyn MarketDataProvider,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !sync_status::should_sync(db, jobs::DAILY_INDICATORS).await? {
        return Ok(());
    }

    let today = Utc::now().date_naive();
    let report = update_daily_indicators(db, provider, today).await?;

    // Before publication the provider returns nothing; retry next wake-up
    if report.count == 0 {
        tracing::info!("No daily indicators for {} yet", today);
        return Ok(());
    }

    sync_status::record_success(db, jobs::DAILY_INDICATORS, intervals::DAILY_INDICATORS, &report.message)
        .await?;
    Ok(())
}
