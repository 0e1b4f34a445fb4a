//! Single-stock views: price series with sector memberships, and the
//! latest financial statement facts.

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, Order, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait,
};
use serde::Serialize;
use tracing::warn;

use crate::config::AppConfig;
use crate::entities::{
    balance_sheets, daily_bars, financial_indicators, income_statements, prelude::*,
    sector_stocks, sectors::{self, SectorType},
};
use crate::error::AppError;
use crate::services::fundamentals::{has_period, reporting_period, FundamentalsUpdater};
use crate::services::instruments::find_instrument;
use crate::services::money_flow::{simulate_money_flow, SimulatedMoneyFlow};
use crate::services::provider::MarketDataProvider;
use crate::services::units::{round2, thousands_to_yuan, yuan_to_yi};

#[derive(Debug, Clone, Serialize)]
pub struct StockSector {
    pub id: i32,
    pub name: String,
    pub sector_type: SectorType,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockSeries {
    pub code: String,
    pub name: String,
    pub dates: Vec<String>,
    pub opens: Vec<Option<f64>>,
    pub highs: Vec<Option<f64>>,
    pub lows: Vec<Option<f64>>,
    pub closes: Vec<Option<f64>>,
    /// Traded value in yuan
    pub volumes: Vec<f64>,
    /// Percent vs the preceding close inside the window; 0 on the first day
    pub changes: Vec<f64>,
    pub sectors: Vec<StockSector>,
    pub money_flow: SimulatedMoneyFlow,
}

/// Day-over-day percent changes; the first entry (and any day whose
/// previous close is missing or zero) is 0.
pub fn day_over_day_changes(closes: &[Option<f64>]) -> Vec<f64> {
    let mut prev: Option<f64> = None;
    closes
        .iter()
        .map(|close| {
            let change = match (close, prev) {
                (Some(c), Some(p)) if p != 0.0 => round2((c - p) / p * 100.0),
                _ => 0.0,
            };
            prev = *close;
            change
        })
        .collect()
}

pub async fn get_stock_series(
    db: &DatabaseConnection,
    raw_code: &str,
    cutoff: NaiveDate,
) -> Result<StockSeries, AppError> {
    let instrument = find_instrument(db, raw_code).await?;

    let bars = DailyBars::find()
        .filter(daily_bars::Column::Code.eq(instrument.code.as_str()))
        .filter(daily_bars::Column::TradeDate.gte(cutoff))
        .order_by(daily_bars::Column::TradeDate, Order::Asc)
        .all(db)
        .await?;

    let sectors = Sectors::find()
        .join(JoinType::InnerJoin, sectors::Relation::SectorStocks.def())
        .filter(sector_stocks::Column::Code.eq(instrument.code.as_str()))
        .order_by(sectors::Column::SectorType, Order::Desc)
        .order_by(sectors::Column::Name, Order::Asc)
        .all(db)
        .await?
        .into_iter()
        .map(|s| StockSector {
            id: s.id,
            name: s.name,
            sector_type: s.sector_type,
        })
        .collect();

    let dates: Vec<String> = bars
        .iter()
        .map(|b| b.trade_date.format("%Y-%m-%d").to_string())
        .collect();
    let closes: Vec<Option<f64>> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars
        .iter()
        .map(|b| thousands_to_yuan(b.amount.unwrap_or(0.0)))
        .collect();

    let flow_input: Vec<(String, f64)> = dates.iter().cloned().zip(volumes.iter().copied()).collect();
    let money_flow = simulate_money_flow(&flow_input, &mut rand::thread_rng());

    Ok(StockSeries {
        code: instrument.code,
        name: instrument.name,
        opens: bars.iter().map(|b| b.open).collect(),
        highs: bars.iter().map(|b| b.high).collect(),
        lows: bars.iter().map(|b| b.low).collect(),
        changes: day_over_day_changes(&closes),
        closes,
        volumes,
        dates,
        sectors,
        money_flow,
    })
}

/// Statement facts in hundred-millions (ratios in percent)
#[derive(Debug, Clone, Serialize)]
pub struct StockFinancials {
    pub code: String,
    pub name: String,
    pub period: Option<NaiveDate>,
    pub total_assets: Option<f64>,
    pub total_liab: Option<f64>,
    pub total_equity: Option<f64>,
    pub revenue: Option<f64>,
    pub operate_profit: Option<f64>,
    pub net_profit: Option<f64>,
    pub gross_margin: Option<f64>,
    pub debt_ratio: Option<f64>,
}

/// Latest stored statements for a stock. When the current period is
/// missing and a provider is supplied, it is fetched first.
pub async fn get_stock_financials(
    db: &DatabaseConnection,
    provider: Option<&dyn MarketDataProvider>,
    config: &AppConfig,
    raw_code: &str,
) -> Result<StockFinancials, AppError> {
    let instrument = find_instrument(db, raw_code).await?;
    let code = instrument.code.as_str();

    if let Some(provider) = provider {
        let period = reporting_period(Utc::now().date_naive());
        if !has_period(db, code, period).await? {
            let updater = FundamentalsUpdater::new(db, provider, config).with_period(period);
            if let Err(e) = updater.update_one(code).await {
                warn!(code, error = %e, "On-demand fundamentals fetch failed");
            }
        }
    }

    let balance = BalanceSheets::find()
        .filter(balance_sheets::Column::Code.eq(code))
        .order_by(balance_sheets::Column::EndDate, Order::Desc)
        .one(db)
        .await?;
    let income = IncomeStatements::find()
        .filter(income_statements::Column::Code.eq(code))
        .order_by(income_statements::Column::EndDate, Order::Desc)
        .one(db)
        .await?;
    let indicator = FinancialIndicators::find()
        .filter(financial_indicators::Column::Code.eq(code))
        .order_by(financial_indicators::Column::EndDate, Order::Desc)
        .one(db)
        .await?;

    if balance.is_none() && income.is_none() && indicator.is_none() {
        return Err(AppError::NotFound(format!(
            "no financial data stored for {}",
            code
        )));
    }

    let period = [
        balance.as_ref().map(|b| b.end_date),
        income.as_ref().map(|i| i.end_date),
        indicator.as_ref().map(|i| i.end_date),
    ]
    .into_iter()
    .flatten()
    .max();

    Ok(StockFinancials {
        code: instrument.code.clone(),
        name: instrument.name.clone(),
        period,
        total_assets: balance.as_ref().and_then(|b| b.total_assets).map(yuan_to_yi),
        total_liab: balance.as_ref().and_then(|b| b.total_liab).map(yuan_to_yi),
        total_equity: balance.as_ref().and_then(|b| b.total_equity).map(yuan_to_yi),
        revenue: income.as_ref().and_then(|i| i.total_revenue).map(yuan_to_yi),
        operate_profit: income.as_ref().and_then(|i| i.operate_profit).map(yuan_to_yi),
        net_profit: income.as_ref().and_then(|i| i.net_income).map(yuan_to_yi),
        gross_margin: indicator.as_ref().and_then(|i| i.gross_margin).map(round2),
        debt_ratio: indicator.as_ref().and_then(|i| i.debt_to_assets).map(round2),
    })
}
