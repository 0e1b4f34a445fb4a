// src/lib.rs

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use config::AppConfig;
use services::{progress::ProgressTracker, provider::MarketDataProvider};

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub provider: Arc<dyn MarketDataProvider>,
    pub config: Arc<AppConfig>,
    pub progress: ProgressTracker,
}

pub mod entities {
    pub mod prelude;
    pub mod instruments;
    pub mod daily_bars;
    pub mod daily_indicators;
    pub mod balance_sheets;
    pub mod income_statements;
    pub mod financial_indicators;
    pub mod sectors;
    pub mod sector_stocks;
    pub mod sync_status;
}

pub mod services {
    pub mod rate_limiter;
    pub mod provider;
    pub mod tushare;
    pub mod instruments;
    pub mod progress;
    pub mod historical_prices;
    pub mod fundamentals;
    pub mod daily_indicators;
    pub mod sector_membership;
    pub mod units;
    pub mod sector_analytics;
    pub mod sector_fundamentals;
    pub mod stock_analytics;
    pub mod money_flow;
    pub mod sync_status;
}

pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod routes;
