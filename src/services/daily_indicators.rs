//! Per-date valuation indicators. A date is fetched at most once.

use chrono::NaiveDate;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::entities::{daily_indicators, prelude::*};
use crate::error::AppError;
use crate::services::instruments::normalize_code;
use crate::services::provider::{DailyIndicatorRecord, MarketDataProvider};

const INSERT_CHUNK: usize = 300;

#[derive(Debug, Clone, Serialize)]
pub struct DailyIndicatorReport {
    pub trade_date: NaiveDate,
    pub count: u64,
    /// False when the date was already stored and nothing was fetched
    pub fetched: bool,
    pub message: String,
}

pub async fn update_daily_indicators(
    db: &DatabaseConnection,
    provider: &dyn MarketDataProvider,
    trade_date: NaiveDate,
) -> Result<DailyIndicatorReport, AppError> {
    let existing = DailyIndicators::find()
        .filter(daily_indicators::Column::TradeDate.eq(trade_date))
        .count(db)
        .await?;

    if existing > 0 {
        info!(%trade_date, existing, "Daily indicators already stored, skipping fetch");
        return Ok(DailyIndicatorReport {
            trade_date,
            count: existing,
            fetched: false,
            message: format!("{} already has {} rows", trade_date, existing),
        });
    }

    let records = provider.fetch_daily_indicators(trade_date).await?;
    let mut seen = HashSet::new();
    let models: Vec<daily_indicators::ActiveModel> = records
        .iter()
        .filter(|r| r.trade_date == trade_date)
        .filter_map(|r| Some((normalize_code(&r.ts_code)?, r)))
        .filter(|(code, _)| seen.insert(code.clone()))
        .map(|(code, r)| to_active_model(code, r))
        .collect();
    let count = models.len() as u64;

    if models.is_empty() {
        // Non-trading day or data not published yet
        return Ok(DailyIndicatorReport {
            trade_date,
            count: 0,
            fetched: true,
            message: format!("no indicator data for {}", trade_date),
        });
    }

    let txn = db.begin().await?;
    for chunk in models.chunks(INSERT_CHUNK) {
        DailyIndicators::insert_many(chunk.to_vec())
            .exec_without_returning(&txn)
            .await?;
    }
    txn.commit().await?;

    info!(%trade_date, count, "Daily indicators stored");
    Ok(DailyIndicatorReport {
        trade_date,
        count,
        fetched: true,
        message: format!("stored {} rows for {}", count, trade_date),
    })
}

fn to_active_model(code: String, r: &DailyIndicatorRecord) -> daily_indicators::ActiveModel {
    daily_indicators::ActiveModel {
        code: Set(code),
        trade_date: Set(r.trade_date),
        close: Set(r.close),
        turnover_rate: Set(r.turnover_rate),
        turnover_rate_f: Set(r.turnover_rate_f),
        volume_ratio: Set(r.volume_ratio),
        pe: Set(r.pe),
        pe_ttm: Set(r.pe_ttm),
        pb: Set(r.pb),
        ps: Set(r.ps),
        ps_ttm: Set(r.ps_ttm),
        dv_ratio: Set(r.dv_ratio),
        dv_ttm: Set(r.dv_ttm),
        total_share: Set(r.total_share),
        float_share: Set(r.float_share),
        free_share: Set(r.free_share),
        total_mv: Set(r.total_mv),
        circ_mv: Set(r.circ_mv),
        ..Default::default()
    }
}
