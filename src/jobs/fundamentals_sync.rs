use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::config::AppConfig;
use crate::services::fundamentals::FundamentalsUpdater;
use crate::services::provider::MarketDataProvider;
use crate::services::sync_status::{self, intervals, jobs};

const CHECK_INTERVAL_SECS: u64 = 21600;

pub async fn start_fundamentals_sync_job(
    db: DatabaseConnection,
    provider: Arc<dyn MarketDataProvider>,
    config: Arc<AppConfig>,
) {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(CHECK_INTERVAL_SECS));

        loop {
            interval.tick().await;

            if let Err(e) = sync_fundamentals(&db, provider.as_ref(), &config).await {
                tracing::error!("Fundamentals sync failed: {}", e);
                if let Err(record_err) = sync_status::record_failure(
                    &db,
                    jobs::FUNDAMENTALS,
                    intervals::FUNDAMENTALS,
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

async fn sync_fundamentals(
    db: &DatabaseConnection,
    provider: &dyn MarketDataProvider,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !sync_status::should_sync(db, jobs::FUNDAMENTALS).await? {
        return Ok(());
    }

    let report = FundamentalsUpdater::new(db, provider, config).update_all().await?;
    sync_status::record_success(db, jobs::FUNDAMENTALS, intervals::FUNDAMENTALS, &report.message)
        .await?;
    Ok(())
}
