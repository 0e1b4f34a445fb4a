//! Valuation and statement overview for a sector's members.

use chrono::{Duration as ChronoDuration, NaiveDate};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter, QueryOrder};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::entities::{daily_indicators, financial_indicators, income_statements, prelude::*};
use crate::error::AppError;
use crate::services::instruments::names_for;
use crate::services::sector_membership::{find_sector, member_codes};
use crate::services::units::{round2, wan_to_yi, yuan_to_yi};

/// Indicators older than this (relative to the newest row) are ignored
const INDICATOR_STALENESS_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberFundamentals {
    pub code: String,
    pub name: String,
    /// Hundred-millions
    pub market_value: Option<f64>,
    pub pe_ttm: Option<f64>,
    pub pb: Option<f64>,
    /// Hundred-millions
    pub revenue: Option<f64>,
    /// Hundred-millions
    pub net_profit: Option<f64>,
    pub gross_margin: Option<f64>,
    pub debt_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorFundamentals {
    pub sector_id: i32,
    pub sector_name: String,
    pub period: NaiveDate,
    pub stocks: Vec<MemberFundamentals>,
}

/// Largest market value first, members without one last
pub fn sort_by_market_value(rows: &mut [MemberFundamentals]) {
    rows.sort_by(|a, b| match (a.market_value, b.market_value) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.code.cmp(&b.code),
    });
}

pub async fn get_sector_fundamentals(
    db: &DatabaseConnection,
    sector_id: i32,
    period: NaiveDate,
) -> Result<SectorFundamentals, AppError> {
    let sector = find_sector(db, sector_id).await?;
    let codes = member_codes(db, sector_id).await?;

    if codes.is_empty() {
        return Ok(SectorFundamentals {
            sector_id,
            sector_name: sector.name,
            period,
            stocks: Vec::new(),
        });
    }

    let names = names_for(db, &codes).await?;

    // Latest indicator row per member within the staleness window
    let newest = DailyIndicators::find()
        .filter(daily_indicators::Column::Code.is_in(codes.clone()))
        .order_by(daily_indicators::Column::TradeDate, Order::Desc)
        .one(db)
        .await?
        .map(|r| r.trade_date);

    let mut indicators: HashMap<String, daily_indicators::Model> = HashMap::new();
    if let Some(newest) = newest {
        let rows = DailyIndicators::find()
            .filter(daily_indicators::Column::Code.is_in(codes.clone()))
            .filter(
                daily_indicators::Column::TradeDate
                    .gte(newest - ChronoDuration::days(INDICATOR_STALENESS_DAYS)),
            )
            .order_by(daily_indicators::Column::TradeDate, Order::Desc)
            .all(db)
            .await?;
        for row in rows {
            indicators.entry(row.code.clone()).or_insert(row);
        }
    }

    let income: HashMap<String, income_statements::Model> = IncomeStatements::find()
        .filter(income_statements::Column::Code.is_in(codes.clone()))
        .filter(income_statements::Column::EndDate.eq(period))
        .all(db)
        .await?
        .into_iter()
        .map(|r| (r.code.clone(), r))
        .collect();

    let ratios: HashMap<String, financial_indicators::Model> = FinancialIndicators::find()
        .filter(financial_indicators::Column::Code.is_in(codes.clone()))
        .filter(financial_indicators::Column::EndDate.eq(period))
        .all(db)
        .await?
        .into_iter()
        .map(|r| (r.code.clone(), r))
        .collect();

    let mut stocks: Vec<MemberFundamentals> = codes
        .into_iter()
        .map(|code| {
            let ind = indicators.get(&code);
            let inc = income.get(&code);
            let ratio = ratios.get(&code);
            MemberFundamentals {
                name: names.get(&code).cloned().unwrap_or_else(|| code.clone()),
                market_value: ind.and_then(|i| i.total_mv).map(wan_to_yi),
                pe_ttm: ind.and_then(|i| i.pe_ttm).map(round2),
                pb: ind.and_then(|i| i.pb).map(round2),
                revenue: inc.and_then(|i| i.total_revenue).map(yuan_to_yi),
                net_profit: inc.and_then(|i| i.net_income).map(yuan_to_yi),
                gross_margin: ratio.and_then(|r| r.gross_margin).map(round2),
                debt_ratio: ratio.and_then(|r| r.debt_to_assets).map(round2),
                code,
            }
        })
        .collect();

    sort_by_market_value(&mut stocks);

    Ok(SectorFundamentals {
        sector_id,
        sector_name: sector.name,
        period,
        stocks,
    })
}
