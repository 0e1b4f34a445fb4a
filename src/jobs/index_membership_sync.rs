use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::services::provider::MarketDataProvider;
use crate::services::sector_membership::reconcile_all_index_sectors;
use crate::services::sync_status::{self, intervals, jobs};

pub async fn start_index_membership_sync_job(
    db: DatabaseConnection,
    provider: Arc<dyn MarketDataProvider>,
) {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(86400)); // Every 24 hours

        loop {
            interval.tick().await;

            if let Err(e) = sync_index_membership(&db, provider.as_ref()).await {
                tracing::error!("Failed to sync index membership: {}", e);
                if let Err(record_err) = sync_status::record_failure(
                    &db,
                    jobs::INDEX_MEMBERSHIP,
                    intervals::INDEX_MEMBERSHIP,
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

async fn sync_index_membership(
    db: &DatabaseConnection,
    provider: &dyn MarketDataProvider,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !sync_status::should_sync(db, jobs::INDEX_MEMBERSHIP).await? {
        return Ok(());
    }

    let results = reconcile_all_index_sectors(db, provider).await?;

    let mut failed = Vec::new();
    let mut parts = Vec::new();
    for (code, outcome) in results {
        match outcome {
            Ok(stats) => parts.push(format!(
                "{}: +{} -{} ={}",
                code, stats.added, stats.removed, stats.unchanged
            )),
            Err(e) => failed.push(format!("{}: {}", code, e)),
        }
    }

    if !failed.is_empty() {
        return Err(failed.join("; ").into());
    }

    let summary = parts.join(", ");
    sync_status::record_success(db, jobs::INDEX_MEMBERSHIP, intervals::INDEX_MEMBERSHIP, &summary)
        .await?;
    tracing::info!("Index membership sync complete: {}", summary);
    Ok(())
}
