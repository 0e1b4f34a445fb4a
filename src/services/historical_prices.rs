//! Incremental daily bar catch-up.
//!
//! For every instrument the fetch starts the day after the last stored bar
//! (or at the configured epoch) and runs through today. Rows are upserted on
//! (code, trade_date) so provider revisions overwrite earlier values.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::entities::{daily_bars, prelude::*};
use crate::error::AppError;
use crate::services::instruments::{find_instrument, is_excluded_class};
use crate::services::progress::{ProgressTracker, UpdateStatus};
use crate::services::provider::{DailyBarRecord, MarketDataProvider};

const UPSERT_CHUNK: usize = 200;

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoricalUpdateReport {
    pub updated_count: usize,
    pub error_count: usize,
    pub error_logs: Vec<String>,
    /// Instruments already current through today
    pub skipped_count: usize,
    pub stopped: bool,
}

enum Outcome {
    Updated(usize),
    UpToDate,
    Failed(String),
}

pub struct HistoricalPriceUpdater<'a> {
    db: &'a DatabaseConnection,
    provider: &'a dyn MarketDataProvider,
    config: &'a AppConfig,
    today: NaiveDate,
}

impl<'a> HistoricalPriceUpdater<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        provider: &'a dyn MarketDataProvider,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            db,
            provider,
            config,
            today: Utc::now().date_naive(),
        }
    }

    /// Pin "today" (fetch end date)
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Update one instrument synchronously
    pub async fn update_one(&self, raw_code: &str) -> Result<HistoricalUpdateReport, AppError> {
        let instrument = find_instrument(self.db, raw_code).await?;
        let mut report = HistoricalUpdateReport::default();

        match self.process(&instrument.code).await {
            Outcome::Updated(rows) => {
                info!(code = %instrument.code, rows, "Historical prices updated");
                report.updated_count = 1;
            }
            Outcome::UpToDate => report.skipped_count = 1,
            Outcome::Failed(msg) => {
                report.error_count = 1;
                report.error_logs.push(msg);
            }
        }

        Ok(report)
    }

    /// Update every eligible instrument, claiming `tracker` for the run.
    pub async fn update_all(
        &self,
        tracker: &ProgressTracker,
    ) -> Result<HistoricalUpdateReport, AppError> {
        tracker.begin()?;
        self.run_claimed(tracker).await
    }

    /// Body of a run whose tracker has already been claimed; always
    /// releases the tracker.
    async fn run_claimed(
        &self,
        tracker: &ProgressTracker,
    ) -> Result<HistoricalUpdateReport, AppError> {
        match self.run_batches(tracker).await {
            Ok(report) => {
                let (status, message) = if report.stopped {
                    (UpdateStatus::Stopped, "update stopped on request".to_string())
                } else {
                    (
                        UpdateStatus::Completed,
                        format!(
                            "updated {} instruments, {} failures",
                            report.updated_count, report.error_count
                        ),
                    )
                };
                tracker.finish(status, message);
                Ok(report)
            }
            Err(e) => {
                tracker.finish(UpdateStatus::Failed, e.to_string());
                Err(e)
            }
        }
    }

    async fn run_batches(
        &self,
        tracker: &ProgressTracker,
    ) -> Result<HistoricalUpdateReport, AppError> {
        let mut codes: Vec<String> = Instruments::find()
            .all(self.db)
            .await?
            .into_iter()
            .map(|i| i.code)
            .filter(|c| !is_excluded_class(c))
            .collect();
        codes.sort();

        tracker.set_total(codes.len());
        info!(
            total = codes.len(),
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "Starting historical price update"
        );

        let mut report = HistoricalUpdateReport::default();
        let batches: Vec<&[String]> = codes.chunks(self.config.batch_size.max(1)).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            if tracker.stop_requested() {
                report.stopped = true;
                break;
            }

            let outcomes: Vec<Outcome> = stream::iter(batch.iter().cloned())
                .map(|code: String| async move {
                    if tracker.stop_requested() {
                        return None;
                    }
                    tracker.set_current(&code);
                    Some(self.process(&code).await)
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .filter_map(|o| async move { o })
                .collect()
                .await;

            for outcome in outcomes {
                match outcome {
                    Outcome::Updated(_) => {
                        report.updated_count += 1;
                        tracker.record_processed(true);
                    }
                    Outcome::UpToDate => {
                        report.skipped_count += 1;
                        tracker.record_processed(false);
                    }
                    Outcome::Failed(msg) => {
                        report.error_count += 1;
                        report.error_logs.push(msg.clone());
                        tracker.record_error(msg);
                    }
                }
            }

            debug!(batch = index + 1, batch_count, "Historical batch finished");

            if index + 1 < batch_count && !self.config.batch_pause.is_zero() {
                sleep(self.config.batch_pause).await;
            }
        }

        if tracker.stop_requested() {
            report.stopped = true;
        }

        info!(
            updated = report.updated_count,
            skipped = report.skipped_count,
            errors = report.error_count,
            stopped = report.stopped,
            "Historical price update finished"
        );
        Ok(report)
    }

    /// Fetch and persist one instrument; never returns an error so the
    /// batch carries on.
    async fn process(&self, code: &str) -> Outcome {
        match self.catch_up(code).await {
            Ok(Some(rows)) => Outcome::Updated(rows),
            Ok(None) => Outcome::UpToDate,
            Err(e) => {
                warn!(code, error = %e, "Historical price update failed");
                Outcome::Failed(format!("Failed to update {}: {}", code, e))
            }
        }
    }

    /// `Ok(None)` when nothing needed fetching
    async fn catch_up(&self, code: &str) -> Result<Option<usize>, AppError> {
        let start = self.fetch_start(code).await?;
        if start > self.today {
            debug!(code, "Already up to date");
            return Ok(None);
        }

        let bars = self
            .provider
            .fetch_daily_bars(code, start, self.today)
            .await?;
        if bars.is_empty() {
            return Ok(None);
        }

        let rows = upsert_bars(self.db, code, &bars).await?;
        Ok(Some(rows))
    }

    async fn fetch_start(&self, code: &str) -> Result<NaiveDate, AppError> {
        let last = DailyBars::find()
            .filter(daily_bars::Column::Code.eq(code))
            .order_by(daily_bars::Column::TradeDate, Order::Desc)
            .one(self.db)
            .await?;

        Ok(match last {
            Some(bar) if bar.trade_date >= self.config.history_start => {
                bar.trade_date + ChronoDuration::days(1)
            }
            _ => self.config.history_start,
        })
    }
}

/// Kick off a bulk update in the background. The tracker is claimed
/// before returning so a concurrent start is rejected immediately.
pub fn spawn_bulk_update(
    db: DatabaseConnection,
    provider: Arc<dyn MarketDataProvider>,
    config: Arc<AppConfig>,
    tracker: ProgressTracker,
) -> Result<(), AppError> {
    tracker.begin()?;

    tokio::spawn(async move {
        let updater = HistoricalPriceUpdater::new(&db, provider.as_ref(), &config);
        if let Err(e) = updater.run_claimed(&tracker).await {
            error!(error = %e, "Background historical update failed");
        }
    });

    Ok(())
}

/// Upsert one instrument's bars in a single transaction
pub async fn upsert_bars(
    db: &DatabaseConnection,
    code: &str,
    bars: &[DailyBarRecord],
) -> Result<usize, AppError> {
    let models: Vec<daily_bars::ActiveModel> = bars
        .iter()
        .map(|bar| daily_bars::ActiveModel {
            code: Set(code.to_string()),
            trade_date: Set(bar.trade_date),
            open: Set(bar.open),
            high: Set(bar.high),
            low: Set(bar.low),
            close: Set(bar.close),
            pre_close: Set(bar.pre_close),
            change: Set(bar.change),
            pct_chg: Set(bar.pct_chg),
            vol: Set(bar.vol),
            amount: Set(bar.amount),
            ..Default::default()
        })
        .collect();

    let on_conflict = OnConflict::columns([daily_bars::Column::Code, daily_bars::Column::TradeDate])
        .update_columns([
            daily_bars::Column::Open,
            daily_bars::Column::High,
            daily_bars::Column::Low,
            daily_bars::Column::Close,
            daily_bars::Column::PreClose,
            daily_bars::Column::Change,
            daily_bars::Column::PctChg,
            daily_bars::Column::Vol,
            daily_bars::Column::Amount,
        ])
        .to_owned();

    let txn = db.begin().await?;
    for chunk in models.chunks(UPSERT_CHUNK) {
        DailyBars::insert_many(chunk.to_vec())
            .on_conflict(on_conflict.clone())
            .exec_without_returning(&txn)
            .await?;
    }
    txn.commit().await?;

    Ok(models.len())
}
