use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use moka::future::Cache;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::format_yyyymmdd;
use crate::services::provider::{
    BalanceSheetRecord, DailyBarRecord, DailyIndicatorRecord, FinancialIndicatorRecord,
    IncomeRecord, InstrumentRecord, MarketDataProvider, MoneyFlowRecord, ProviderError,
};
use crate::services::rate_limiter::RateLimiter;

const DAILY_FIELDS: &[&str] = &[
    "ts_code", "trade_date", "open", "high", "low", "close", "pre_close", "change", "pct_chg",
    "vol", "amount",
];

const DAILY_BASIC_FIELDS: &[&str] = &[
    "ts_code", "trade_date", "close", "turnover_rate", "turnover_rate_f", "volume_ratio", "pe",
    "pe_ttm", "pb", "ps", "ps_ttm", "dv_ratio", "dv_ttm", "total_share", "float_share",
    "free_share", "total_mv", "circ_mv",
];

const MONEYFLOW_FIELDS: &[&str] = &[
    "ts_code", "trade_date", "buy_sm_amount", "sell_sm_amount", "buy_md_amount",
    "sell_md_amount", "buy_lg_amount", "sell_lg_amount", "buy_elg_amount", "sell_elg_amount",
    "net_mf_amount",
];

/// Index weights are published monthly; look back far enough to catch one
const INDEX_WEIGHT_LOOKBACK_DAYS: i64 = 45;

#[derive(Debug, Serialize)]
struct TushareRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: Value,
    fields: String,
}

#[derive(Debug, Deserialize)]
struct TushareResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<TushareTable>,
}

#[derive(Debug, Deserialize)]
struct TushareTable {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct IndexWeightRow {
    con_code: String,
    trade_date: String,
}

/// HTTP client for the Tushare Pro API. Every call goes through the shared
/// rate limiter.
#[derive(Clone)]
pub struct TushareClient {
    client: Client,
    token: String,
    base_url: String,
    limiter: RateLimiter,
    constituents_cache: Arc<Cache<String, Vec<String>>>,
    money_flow_cache: Arc<Cache<String, Vec<MoneyFlowRecord>>>,
}

impl TushareClient {
    pub fn new(token: String, base_url: String, limiter: RateLimiter) -> Self {
        let constituents_cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(Duration::from_secs(3600))
            .build();
        let money_flow_cache = Cache::builder()
            .max_capacity(500)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Self {
            client: Client::new(),
            token,
            base_url,
            limiter,
            constituents_cache: Arc::new(constituents_cache),
            money_flow_cache: Arc::new(money_flow_cache),
        }
    }

    /// Run one API call and zip the columnar payload into typed rows
    async fn query<T: DeserializeOwned>(
        &self,
        api_name: &str,
        params: Value,
        fields: &[&str],
    ) -> Result<Vec<T>, ProviderError> {
        self.limiter.acquire().await;

        let request = TushareRequest {
            api_name,
            token: &self.token,
            params,
            fields: fields.join(","),
        };

        let response = self.client.post(&self.base_url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                code: status.as_u16() as i64,
                msg: text,
            });
        }

        let body: TushareResponse = response.json().await?;
        decode_table(api_name, body)
    }
}

fn decode_table<T: DeserializeOwned>(
    api_name: &str,
    body: TushareResponse,
) -> Result<Vec<T>, ProviderError> {
    if body.code != 0 {
        return Err(ProviderError::Api {
            code: body.code,
            msg: body.msg.unwrap_or_default(),
        });
    }

    let Some(table) = body.data else {
        return Ok(Vec::new());
    };

    table
        .items
        .into_iter()
        .map(|item| {
            let row: Map<String, Value> = table.fields.iter().cloned().zip(item).collect();
            serde_json::from_value(Value::Object(row))
                .map_err(|e| ProviderError::Decode(format!("{}: {}", api_name, e)))
        })
        .collect()
}

/// Keep the first row per (code, period); the provider repeats revised rows
fn first_per_period<T, F>(rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (String, NaiveDate),
{
    let mut seen = std::collections::HashSet::new();
    rows.into_iter().filter(|row| seen.insert(key(row))).collect()
}

#[async_trait]
impl MarketDataProvider for TushareClient {
    async fn fetch_instruments(&self) -> Result<Vec<InstrumentRecord>, ProviderError> {
        self.query(
            "stock_basic",
            json!({ "exchange": "", "list_status": "L" }),
            &["ts_code", "name", "list_status", "list_date"],
        )
        .await
    }

    async fn fetch_daily_bars(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBarRecord>, ProviderError> {
        self.query(
            "daily",
            json!({
                "ts_code": code,
                "start_date": format_yyyymmdd(start),
                "end_date": format_yyyymmdd(end),
            }),
            DAILY_FIELDS,
        )
        .await
    }

    async fn fetch_daily_indicators(
        &self,
        trade_date: NaiveDate,
    ) -> Result<Vec<DailyIndicatorRecord>, ProviderError> {
        self.query(
            "daily_basic",
            json!({ "ts_code": "", "trade_date": format_yyyymmdd(trade_date) }),
            DAILY_BASIC_FIELDS,
        )
        .await
    }

    async fn fetch_balance_sheets(
        &self,
        code: &str,
        period: NaiveDate,
    ) -> Result<Vec<BalanceSheetRecord>, ProviderError> {
        let rows = self
            .query(
                "balancesheet",
                json!({ "ts_code": code, "period": format_yyyymmdd(period) }),
                &[
                    "ts_code", "ann_date", "end_date", "total_assets", "total_liab",
                    "total_hldr_eqy_exc_min_int",
                ],
            )
            .await?;
        Ok(first_per_period(rows, |r: &BalanceSheetRecord| {
            (r.ts_code.clone(), r.end_date)
        }))
    }

    async fn fetch_income_statements(
        &self,
        code: &str,
        period: NaiveDate,
    ) -> Result<Vec<IncomeRecord>, ProviderError> {
        let rows = self
            .query(
                "income",
                json!({ "ts_code": code, "period": format_yyyymmdd(period) }),
                &[
                    "ts_code", "ann_date", "end_date", "total_revenue", "operate_profit",
                    "n_income_attr_p",
                ],
            )
            .await?;
        Ok(first_per_period(rows, |r: &IncomeRecord| {
            (r.ts_code.clone(), r.end_date)
        }))
    }

    async fn fetch_financial_indicators(
        &self,
        code: &str,
        period: NaiveDate,
    ) -> Result<Vec<FinancialIndicatorRecord>, ProviderError> {
        let rows = self
            .query(
                "fina_indicator",
                json!({ "ts_code": code, "period": format_yyyymmdd(period) }),
                &["ts_code", "ann_date", "end_date", "grossprofit_margin", "debt_to_assets"],
            )
            .await?;
        Ok(first_per_period(rows, |r: &FinancialIndicatorRecord| {
            (r.ts_code.clone(), r.end_date)
        }))
    }

    async fn fetch_index_constituents(&self, index_code: &str) -> Result<Vec<String>, ProviderError> {
        if let Some(cached) = self.constituents_cache.get(index_code).await {
            tracing::debug!(index_code, "Index constituents cache hit");
            return Ok(cached);
        }

        let today = Utc::now().date_naive();
        let start = today - ChronoDuration::days(INDEX_WEIGHT_LOOKBACK_DAYS);

        let rows: Vec<IndexWeightRow> = self
            .query(
                "index_weight",
                json!({
                    "index_code": index_code,
                    "start_date": format_yyyymmdd(start),
                    "end_date": format_yyyymmdd(today),
                }),
                &["index_code", "con_code", "trade_date", "weight"],
            )
            .await?;

        let constituents = latest_snapshot(rows);
        if !constituents.is_empty() {
            self.constituents_cache
                .insert(index_code.to_string(), constituents.clone())
                .await;
        }

        Ok(constituents)
    }

    async fn fetch_money_flow(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MoneyFlowRecord>, ProviderError> {
        let cache_key = format!("{}_{}_{}", code, start, end);
        if let Some(cached) = self.money_flow_cache.get(&cache_key).await {
            return Ok(cached);
        }

        let mut rows: Vec<MoneyFlowRecord> = self
            .query(
                "moneyflow",
                json!({
                    "ts_code": code,
                    "start_date": format_yyyymmdd(start),
                    "end_date": format_yyyymmdd(end),
                }),
                MONEYFLOW_FIELDS,
            )
            .await?;
        rows.sort_by_key(|r| r.trade_date);

        self.money_flow_cache.insert(cache_key, rows.clone()).await;
        Ok(rows)
    }
}

/// Codes from the most recent publication date only
fn latest_snapshot(rows: Vec<IndexWeightRow>) -> Vec<String> {
    let Some(latest) = rows.iter().map(|r| r.trade_date.clone()).max() else {
        return Vec::new();
    };

    let mut codes: Vec<String> = rows
        .into_iter()
        .filter(|r| r.trade_date == latest)
        .map(|r| r.con_code)
        .collect();
    codes.sort();
    codes.dedup();
    codes
}
