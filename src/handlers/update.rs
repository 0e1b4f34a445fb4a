use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::config::parse_yyyymmdd;
use crate::error::AppError;
use crate::models::common::MessageResponse;
use crate::models::update::{DailyIndicatorsQuery, UpdateStatusResponse};
use crate::services::daily_indicators::{self, DailyIndicatorReport};
use crate::services::fundamentals::{FundamentalsReport, FundamentalsUpdater};
use crate::services::historical_prices::{
    spawn_bulk_update, HistoricalPriceUpdater, HistoricalUpdateReport,
};
use crate::services::instruments::{self, InstrumentRefreshReport};
use crate::services::progress::UpdateProgress;
use crate::services::sync_status;
use crate::AppState;

pub async fn refresh_instruments(
    State(state): State<AppState>,
) -> Result<Json<InstrumentRefreshReport>, AppError> {
    Ok(Json(
        instruments::refresh_instruments(&state.db, state.provider.as_ref()).await?,
    ))
}

/// Start the bulk update in the background; poll `/api/update/progress`
pub async fn start_historical_update(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    spawn_bulk_update(
        state.db.clone(),
        state.provider.clone(),
        state.config.clone(),
        state.progress.clone(),
    )?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::ok("historical price update started")),
    ))
}

pub async fn update_single_stock(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<HistoricalUpdateReport>, AppError> {
    let updater = HistoricalPriceUpdater::new(&state.db, state.provider.as_ref(), &state.config);
    Ok(Json(updater.update_one(&code).await?))
}

pub async fn stop_update(State(state): State<AppState>) -> Json<MessageResponse> {
    if state.progress.request_stop() {
        Json(MessageResponse::ok("stop requested"))
    } else {
        Json(MessageResponse {
            success: false,
            message: "no update is running".to_string(),
        })
    }
}

pub async fn get_update_progress(State(state): State<AppState>) -> Json<UpdateProgress> {
    Json(state.progress.snapshot())
}

pub async fn get_update_status(
    State(state): State<AppState>,
) -> Result<Json<UpdateStatusResponse>, AppError> {
    Ok(Json(UpdateStatusResponse {
        progress: state.progress.snapshot(),
        jobs: sync_status::list(&state.db).await?,
    }))
}

pub async fn update_fundamentals(
    State(state): State<AppState>,
) -> Result<Json<FundamentalsReport>, AppError> {
    let updater = FundamentalsUpdater::new(&state.db, state.provider.as_ref(), &state.config);
    Ok(Json(updater.update_all().await?))
}

pub async fn update_daily_indicators(
    State(state): State<AppState>,
    Query(query): Query<DailyIndicatorsQuery>,
) -> Result<Json<DailyIndicatorReport>, AppError> {
    let trade_date = match query.trade_date.as_deref() {
        Some(raw) => parse_yyyymmdd(raw).ok_or_else(|| {
            AppError::Validation(format!("invalid trade_date '{}', expected YYYYMMDD", raw))
        })?,
        None => Utc::now().date_naive(),
    };

    let report =
        daily_indicators::update_daily_indicators(&state.db, state.provider.as_ref(), trade_date)
            .await?;
    Ok(Json(report))
}
