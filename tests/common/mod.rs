#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use migration::{Migrator, MigratorTrait};
use parking_lot::Mutex;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DbErr, Set};
use tokio::sync::Notify;

use sectorscope_backend::config::{parse_yyyymmdd, AppConfig};
use sectorscope_backend::entities::daily_bars;
use sectorscope_backend::services::instruments::upsert_instrument;
use sectorscope_backend::services::progress::ProgressTracker;
use sectorscope_backend::services::provider::{
    BalanceSheetRecord, DailyBarRecord, DailyIndicatorRecord, FinancialIndicatorRecord,
    IncomeRecord, InstrumentRecord, MarketDataProvider, MoneyFlowRecord, ProviderError,
};
use sectorscope_backend::AppState;

/// Fresh in-memory SQLite database with every migration applied.
///
/// The pool holds exactly one connection so the memory database lives as
/// long as the handle.
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn date(raw: &str) -> NaiveDate {
    parse_yyyymmdd(raw).expect("valid YYYYMMDD test date")
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        tushare_token: "test-token".to_string(),
        history_start: date("20240920"),
        batch_size: 2,
        batch_pause: Duration::ZERO,
        concurrency: 1,
        fundamentals_commit_every: 2,
        ..Default::default()
    }
}

pub fn test_state(db: DatabaseConnection, provider: Arc<FakeProvider>) -> AppState {
    AppState {
        db,
        provider,
        config: Arc::new(test_config()),
        progress: ProgressTracker::new(),
    }
}

pub async fn seed_instrument(db: &DatabaseConnection, code: &str, name: &str) {
    upsert_instrument(db, code, name)
        .await
        .expect("seed instrument");
}

pub async fn seed_bar(
    db: &DatabaseConnection,
    code: &str,
    trade_date: &str,
    open: f64,
    close: f64,
    amount: f64,
) {
    daily_bars::ActiveModel {
        code: Set(code.to_string()),
        trade_date: Set(date(trade_date)),
        open: Set(Some(open)),
        high: Set(Some(open.max(close))),
        low: Set(Some(open.min(close))),
        close: Set(Some(close)),
        pre_close: Set(None),
        change: Set(None),
        pct_chg: Set(None),
        vol: Set(Some(1000.0)),
        amount: Set(Some(amount)),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed bar");
}

pub fn bar(code: &str, trade_date: &str, open: f64, close: f64, amount: f64) -> DailyBarRecord {
    DailyBarRecord {
        ts_code: code.to_string(),
        trade_date: date(trade_date),
        open: Some(open),
        high: Some(open.max(close)),
        low: Some(open.min(close)),
        close: Some(close),
        pre_close: None,
        change: None,
        pct_chg: None,
        vol: Some(1000.0),
        amount: Some(amount),
    }
}

pub fn instrument(code: &str, name: &str) -> InstrumentRecord {
    InstrumentRecord {
        ts_code: code.to_string(),
        name: name.to_string(),
        list_status: Some("L".to_string()),
        list_date: None,
    }
}

/// In-memory `MarketDataProvider` with call recording
#[derive(Default)]
pub struct FakeProvider {
    pub instruments: Mutex<Vec<InstrumentRecord>>,
    pub bars: Mutex<HashMap<String, Vec<DailyBarRecord>>>,
    pub indicators: Mutex<Vec<DailyIndicatorRecord>>,
    pub balance_sheets: Mutex<HashMap<String, Vec<BalanceSheetRecord>>>,
    pub income: Mutex<HashMap<String, Vec<IncomeRecord>>>,
    pub financial_indicators: Mutex<HashMap<String, Vec<FinancialIndicatorRecord>>>,
    pub constituents: Mutex<HashMap<String, Vec<String>>>,
    pub money_flow: Mutex<HashMap<String, Vec<MoneyFlowRecord>>>,
    /// Codes whose per-instrument calls fail
    pub failing: Mutex<HashSet<String>>,
    pub bar_requests: Mutex<Vec<(String, NaiveDate, NaiveDate)>>,
    /// When set, the first bar fetch asks this tracker to stop
    pub stop_on_fetch: Mutex<Option<ProgressTracker>>,
    /// When set, the first bar fetch waits until this is notified
    pub bar_gate: Mutex<Option<Arc<Notify>>>,
    pub indicator_calls: AtomicUsize,
    pub statement_calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_bars(&self, code: &str, bars: Vec<DailyBarRecord>) {
        self.bars.lock().insert(code.to_string(), bars);
    }

    pub fn set_constituents(&self, index_code: &str, codes: &[&str]) {
        self.constituents.lock().insert(
            index_code.to_string(),
            codes.iter().map(|c| c.to_string()).collect(),
        );
    }

    pub fn set_statements(&self, code: &str, period: NaiveDate, revenue: f64) {
        self.balance_sheets.lock().insert(
            code.to_string(),
            vec![BalanceSheetRecord {
                ts_code: code.to_string(),
                ann_date: None,
                end_date: period,
                total_assets: Some(revenue * 10.0),
                total_liab: Some(revenue * 6.0),
                total_equity: Some(revenue * 4.0),
            }],
        );
        self.income.lock().insert(
            code.to_string(),
            vec![IncomeRecord {
                ts_code: code.to_string(),
                ann_date: None,
                end_date: period,
                total_revenue: Some(revenue),
                operate_profit: Some(revenue * 0.2),
                net_income: Some(revenue * 0.1),
            }],
        );
        self.financial_indicators.lock().insert(
            code.to_string(),
            vec![FinancialIndicatorRecord {
                ts_code: code.to_string(),
                ann_date: None,
                end_date: period,
                gross_margin: Some(30.456),
                debt_to_assets: Some(60.0),
            }],
        );
    }

    /// Hold the next bar fetch until the returned handle is notified
    pub fn hold_bar_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.bar_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn fail_for(&self, code: &str) {
        self.failing.lock().insert(code.to_string());
    }

    fn check(&self, code: &str) -> Result<(), ProviderError> {
        if self.failing.lock().contains(code) {
            return Err(ProviderError::Api {
                code: -1,
                msg: format!("simulated failure for {}", code),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    async fn fetch_instruments(&self) -> Result<Vec<InstrumentRecord>, ProviderError> {
        Ok(self.instruments.lock().clone())
    }

    async fn fetch_daily_bars(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBarRecord>, ProviderError> {
        self.bar_requests
            .lock()
            .push((code.to_string(), start, end));
        if let Some(tracker) = self.stop_on_fetch.lock().take() {
            tracker.request_stop();
        }
        let gate = self.bar_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check(code)?;

        Ok(self
            .bars
            .lock()
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.trade_date >= start && b.trade_date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_daily_indicators(
        &self,
        trade_date: NaiveDate,
    ) -> Result<Vec<DailyIndicatorRecord>, ProviderError> {
        self.indicator_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .indicators
            .lock()
            .iter()
            .filter(|r| r.trade_date == trade_date)
            .cloned()
            .collect())
    }

    async fn fetch_balance_sheets(
        &self,
        code: &str,
        _period: NaiveDate,
    ) -> Result<Vec<BalanceSheetRecord>, ProviderError> {
        self.statement_calls.fetch_add(1, Ordering::SeqCst);
        self.check(code)?;
        Ok(self
            .balance_sheets
            .lock()
            .get(code)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_income_statements(
        &self,
        code: &str,
        _period: NaiveDate,
    ) -> Result<Vec<IncomeRecord>, ProviderError> {
        self.check(code)?;
        Ok(self.income.lock().get(code).cloned().unwrap_or_default())
    }

    async fn fetch_financial_indicators(
        &self,
        code: &str,
        _period: NaiveDate,
    ) -> Result<Vec<FinancialIndicatorRecord>, ProviderError> {
        self.check(code)?;
        Ok(self
            .financial_indicators
            .lock()
            .get(code)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_index_constituents(&self, index_code: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .constituents
            .lock()
            .get(index_code)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_money_flow(
        &self,
        code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MoneyFlowRecord>, ProviderError> {
        self.check(code)?;
        Ok(self
            .money_flow
            .lock()
            .get(code)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.trade_date >= start && r.trade_date <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
