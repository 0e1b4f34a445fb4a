//! Market data provider seam.
//!
//! Updaters and on-demand views only talk to `MarketDataProvider`; the
//! production implementation is `TushareClient`, tests plug in fakes.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::config::parse_yyyymmdd;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {code}: {msg}")]
    Api { code: i64, msg: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub ts_code: String,
    pub name: String,
    #[serde(default)]
    pub list_status: Option<String>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub list_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBarRecord {
    pub ts_code: String,
    #[serde(deserialize_with = "de_date")]
    pub trade_date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub pre_close: Option<f64>,
    pub change: Option<f64>,
    pub pct_chg: Option<f64>,
    pub vol: Option<f64>,
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyIndicatorRecord {
    pub ts_code: String,
    #[serde(deserialize_with = "de_date")]
    pub trade_date: NaiveDate,
    pub close: Option<f64>,
    pub turnover_rate: Option<f64>,
    pub turnover_rate_f: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub pe: Option<f64>,
    pub pe_ttm: Option<f64>,
    pub pb: Option<f64>,
    pub ps: Option<f64>,
    pub ps_ttm: Option<f64>,
    pub dv_ratio: Option<f64>,
    pub dv_ttm: Option<f64>,
    pub total_share: Option<f64>,
    pub float_share: Option<f64>,
    pub free_share: Option<f64>,
    pub total_mv: Option<f64>,
    pub circ_mv: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSheetRecord {
    pub ts_code: String,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub ann_date: Option<NaiveDate>,
    #[serde(deserialize_with = "de_date")]
    pub end_date: NaiveDate,
    pub total_assets: Option<f64>,
    pub total_liab: Option<f64>,
    /// Equity attributable to shareholders, excluding minority interest
    #[serde(rename = "total_hldr_eqy_exc_min_int")]
    pub total_equity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub ts_code: String,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub ann_date: Option<NaiveDate>,
    #[serde(deserialize_with = "de_date")]
    pub end_date: NaiveDate,
    pub total_revenue: Option<f64>,
    pub operate_profit: Option<f64>,
    /// Net income attributable to the parent
    #[serde(rename = "n_income_attr_p")]
    pub net_income: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialIndicatorRecord {
    pub ts_code: String,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub ann_date: Option<NaiveDate>,
    #[serde(deserialize_with = "de_date")]
    pub end_date: NaiveDate,
    #[serde(rename = "grossprofit_margin")]
    pub gross_margin: Option<f64>,
    pub debt_to_assets: Option<f64>,
}

/// Order-size tiered flow, amounts in ten-thousands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyFlowRecord {
    pub ts_code: String,
    #[serde(deserialize_with = "de_date")]
    pub trade_date: NaiveDate,
    pub buy_sm_amount: Option<f64>,
    pub sell_sm_amount: Option<f64>,
    pub buy_md_amount: Option<f64>,
    pub sell_md_amount: Option<f64>,
    pub buy_lg_amount: Option<f64>,
    pub sell_lg_amount: Option<f64>,
    pub buy_elg_amount: Option<f64>,
    pub sell_elg_amount: Option<f64>,
    pub net_mf_amount: Option<f64>,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Listed instruments (basic reference data)
    async fn fetch_instruments(&self) -> Result<Vec<InstrumentRecord>, ProviderError>;

    /// Daily bars for one instrument in `[start, end]`
    async fn fetch_daily_bars(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBarRecord>, ProviderError>;

    /// Valuation/turnover indicators for every instrument on one date
    async fn fetch_daily_indicators(
        &self,
        trade_date: NaiveDate,
    ) -> Result<Vec<DailyIndicatorRecord>, ProviderError>;

    async fn fetch_balance_sheets(
        &self,
        code: &str,
        period: NaiveDate,
    ) -> Result<Vec<BalanceSheetRecord>, ProviderError>;

    async fn fetch_income_statements(
        &self,
        code: &str,
        period: NaiveDate,
    ) -> Result<Vec<IncomeRecord>, ProviderError>;

    async fn fetch_financial_indicators(
        &self,
        code: &str,
        period: NaiveDate,
    ) -> Result<Vec<FinancialIndicatorRecord>, ProviderError>;

    /// Current constituent codes of a published index
    async fn fetch_index_constituents(&self, index_code: &str) -> Result<Vec<String>, ProviderError>;

    async fn fetch_money_flow(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MoneyFlowRecord>, ProviderError>;
}

fn de_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_yyyymmdd(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", raw)))
}

fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_yyyymmdd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_daily_bar_parses_compact_date() {
        let bar: DailyBarRecord = serde_json::from_value(json!({
            "ts_code": "600000.SH",
            "trade_date": "20240923",
            "open": 7.1, "high": 7.3, "low": 7.0, "close": 7.2,
            "pre_close": 7.05, "change": 0.15, "pct_chg": 2.13,
            "vol": 120000.0, "amount": 86000.5
        }))
        .unwrap();

        assert_eq!(bar.trade_date, NaiveDate::from_ymd_opt(2024, 9, 23).unwrap());
        assert_eq!(bar.close, Some(7.2));
    }

    #[test]
    fn test_statement_field_renames() {
        let balance: BalanceSheetRecord = serde_json::from_value(json!({
            "ts_code": "000001.SZ",
            "ann_date": null,
            "end_date": "20240630",
            "total_assets": 1.0e12,
            "total_liab": 9.0e11,
            "total_hldr_eqy_exc_min_int": 1.0e11
        }))
        .unwrap();
        assert_eq!(balance.total_equity, Some(1.0e11));
        assert!(balance.ann_date.is_none());

        let indicator: FinancialIndicatorRecord = serde_json::from_value(json!({
            "ts_code": "000001.SZ",
            "ann_date": "20240816",
            "end_date": "20240630",
            "grossprofit_margin": 31.5,
            "debt_to_assets": 91.2
        }))
        .unwrap();
        assert_eq!(indicator.gross_margin, Some(31.5));
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let result: Result<DailyBarRecord, _> = serde_json::from_value(json!({
            "ts_code": "600000.SH",
            "trade_date": "2024-09-23",
            "open": null, "high": null, "low": null, "close": null,
            "pre_close": null, "change": null, "pct_chg": null,
            "vol": null, "amount": null
        }));
        assert!(result.is_err());
    }
}
