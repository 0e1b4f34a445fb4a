pub mod daily_indicators_sync;
pub mod fundamentals_sync;
pub mod historical_prices_sync;
pub mod index_membership_sync;

use crate::AppState;

/// Spawn every background job against the shared state
pub async fn start_all(state: &AppState) {
    index_membership_sync::start_index_membership_sync_job(
        state.db.clone(),
        state.provider.clone(),
    )
    .await;
    historical_prices_sync::start_historical_prices_sync_job(
        state.db.clone(),
        state.provider.clone(),
        state.config.clone(),
        state.progress.clone(),
    )
    .await;
    daily_indicators_sync::start_daily_indicators_sync_job(
        state.db.clone(),
        state.provider.clone(),
    )
    .await;
    fundamentals_sync::start_fundamentals_sync_job(
        state.db.clone(),
        state.provider.clone(),
        state.config.clone(),
    )
    .await;

    tracing::info!("Background jobs started");
}
