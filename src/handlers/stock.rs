use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::error::AppError;
use crate::services::instruments::find_instrument;
use crate::services::money_flow::{self, ProviderMoneyFlow};
use crate::services::stock_analytics::{self, StockFinancials, StockSeries};
use crate::AppState;

const MONEY_FLOW_LOOKBACK_DAYS: i64 = 90;

pub async fn get_stock_series(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<StockSeries>, AppError> {
    let series =
        stock_analytics::get_stock_series(&state.db, &code, state.config.history_start).await?;
    Ok(Json(series))
}

pub async fn get_stock_financials(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<StockFinancials>, AppError> {
    let financials = stock_analytics::get_stock_financials(
        &state.db,
        Some(state.provider.as_ref()),
        &state.config,
        &code,
    )
    .await?;
    Ok(Json(financials))
}

pub async fn get_stock_money_flow(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ProviderMoneyFlow>, AppError> {
    let instrument = find_instrument(&state.db, &code).await?;
    let flow = money_flow::fetch_money_flow(
        state.provider.as_ref(),
        &instrument.code,
        Utc::now().date_naive(),
        MONEY_FLOW_LOOKBACK_DAYS,
    )
    .await?;
    Ok(Json(flow))
}
