//! Financial statement facts for the current reporting period.

use chrono::{Datelike, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::entities::{balance_sheets, financial_indicators, income_statements, prelude::*};
use crate::error::AppError;
use crate::services::instruments::{find_instrument, is_excluded_class};
use crate::services::provider::{
    BalanceSheetRecord, FinancialIndicatorRecord, IncomeRecord, MarketDataProvider,
};

/// The statement period considered "current" on `today`.
///
/// | today            | period              |
/// |------------------|---------------------|
/// | Jan-Apr, May 1   | prior year Dec 31   |
/// | May-Jun          | Mar 31              |
/// | Jul-Aug          | Jun 30              |
/// | Sep-Dec          | Sep 30              |
pub fn reporting_period(today: NaiveDate) -> NaiveDate {
    let year = today.year();
    let (y, m, d) = match today.month() {
        1..=4 => (year - 1, 12, 31),
        5 if today.day() == 1 => (year - 1, 12, 31),
        5 | 6 => (year, 3, 31),
        7 | 8 => (year, 6, 30),
        _ => (year, 9, 30),
    };
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(today)
}

#[derive(Debug, Clone, Serialize)]
pub struct FundamentalsReport {
    pub period: NaiveDate,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub message: String,
}

struct StatementSet {
    balance: Option<BalanceSheetRecord>,
    income: Option<IncomeRecord>,
    indicator: Option<FinancialIndicatorRecord>,
}

impl StatementSet {
    fn is_empty(&self) -> bool {
        self.balance.is_none() && self.income.is_none() && self.indicator.is_none()
    }
}

pub struct FundamentalsUpdater<'a> {
    db: &'a DatabaseConnection,
    provider: &'a dyn MarketDataProvider,
    config: &'a AppConfig,
    period: NaiveDate,
}

impl<'a> FundamentalsUpdater<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        provider: &'a dyn MarketDataProvider,
        config: &'a AppConfig,
    ) -> Self {
        Self {
            db,
            provider,
            config,
            period: reporting_period(Utc::now().date_naive()),
        }
    }

    pub fn with_period(mut self, period: NaiveDate) -> Self {
        self.period = period;
        self
    }

    pub fn period(&self) -> NaiveDate {
        self.period
    }

    /// Fill in every instrument missing facts for the period.
    pub async fn update_all(&self) -> Result<FundamentalsReport, AppError> {
        let covered = covered_codes(self.db, self.period).await?;

        let mut pending: Vec<String> = Instruments::find()
            .all(self.db)
            .await?
            .into_iter()
            .map(|i| i.code)
            .filter(|c| !is_excluded_class(c) && !covered.contains(c))
            .collect();
        pending.sort();

        info!(
            period = %self.period,
            pending = pending.len(),
            covered = covered.len(),
            "Starting fundamentals update"
        );

        let mut updated = 0usize;
        let mut errors = 0usize;
        let mut empty = 0usize;

        for chunk in pending.chunks(self.config.fundamentals_commit_every.max(1)) {
            let txn = self.db.begin().await?;

            for code in chunk {
                let statements = match self.fetch(code).await {
                    Ok(s) if s.is_empty() => {
                        empty += 1;
                        continue;
                    }
                    Ok(s) => s,
                    Err(e) => {
                        warn!(code = %code, error = %e, "Fundamentals fetch failed");
                        errors += 1;
                        continue;
                    }
                };

                // Savepoint so one bad write does not poison the chunk
                let savepoint = txn.begin().await?;
                match write_statements(&savepoint, &statements).await {
                    Ok(()) => {
                        savepoint.commit().await?;
                        updated += 1;
                    }
                    Err(e) => {
                        savepoint.rollback().await?;
                        warn!(code = %code, error = %e, "Fundamentals write failed");
                        errors += 1;
                    }
                }
            }

            txn.commit().await?;
            debug!(committed = updated, "Fundamentals chunk committed");
        }

        let message = format!(
            "period {}: updated {} instruments, {} already covered, {} without data, {} failures",
            self.period.format("%Y%m%d"),
            updated,
            covered.len(),
            empty,
            errors
        );
        info!("{}", message);

        Ok(FundamentalsReport {
            period: self.period,
            updated_count: updated,
            skipped_count: covered.len() + empty,
            error_count: errors,
            message,
        })
    }

    /// Fetch and store one instrument regardless of existing coverage
    pub async fn update_one(&self, raw_code: &str) -> Result<FundamentalsReport, AppError> {
        let instrument = find_instrument(self.db, raw_code).await?;
        let statements = self.fetch(&instrument.code).await?;

        if statements.is_empty() {
            return Ok(FundamentalsReport {
                period: self.period,
                updated_count: 0,
                skipped_count: 1,
                error_count: 0,
                message: format!("no statements for {} in period", instrument.code),
            });
        }

        let txn = self.db.begin().await?;
        write_statements(&txn, &statements).await?;
        txn.commit().await?;

        Ok(FundamentalsReport {
            period: self.period,
            updated_count: 1,
            skipped_count: 0,
            error_count: 0,
            message: format!("updated {}", instrument.code),
        })
    }

    async fn fetch(&self, code: &str) -> Result<StatementSet, AppError> {
        let balance = self.provider.fetch_balance_sheets(code, self.period).await?;
        let income = self.provider.fetch_income_statements(code, self.period).await?;
        let indicator = self
            .provider
            .fetch_financial_indicators(code, self.period)
            .await?;

        Ok(StatementSet {
            balance: balance.into_iter().find(|r| r.end_date == self.period),
            income: income.into_iter().find(|r| r.end_date == self.period),
            indicator: indicator.into_iter().find(|r| r.end_date == self.period),
        })
    }
}

/// Update-if-exists, insert-if-absent for each of the three fact tables
async fn write_statements(
    txn: &DatabaseTransaction,
    statements: &StatementSet,
) -> Result<(), AppError> {
    let now = Utc::now().naive_utc();

    if let Some(r) = &statements.balance {
        let existing = BalanceSheets::find()
            .filter(balance_sheets::Column::Code.eq(r.ts_code.as_str()))
            .filter(balance_sheets::Column::EndDate.eq(r.end_date))
            .one(txn)
            .await?;
        let mut model = match existing {
            Some(row) => row.into(),
            None => balance_sheets::ActiveModel {
                code: Set(r.ts_code.clone()),
                end_date: Set(r.end_date),
                ..Default::default()
            },
        };
        model.ann_date = Set(r.ann_date);
        model.total_assets = Set(r.total_assets);
        model.total_liab = Set(r.total_liab);
        model.total_equity = Set(r.total_equity);
        model.updated_at = Set(now);
        model.save(txn).await?;
    }

    if let Some(r) = &statements.income {
        let existing = IncomeStatements::find()
            .filter(income_statements::Column::Code.eq(r.ts_code.as_str()))
            .filter(income_statements::Column::EndDate.eq(r.end_date))
            .one(txn)
            .await?;
        let mut model = match existing {
            Some(row) => row.into(),
            None => income_statements::ActiveModel {
                code: Set(r.ts_code.clone()),
                end_date: Set(r.end_date),
                ..Default::default()
            },
        };
        model.ann_date = Set(r.ann_date);
        model.total_revenue = Set(r.total_revenue);
        model.operate_profit = Set(r.operate_profit);
        model.net_income = Set(r.net_income);
        model.updated_at = Set(now);
        model.save(txn).await?;
    }

    if let Some(r) = &statements.indicator {
        let existing = FinancialIndicators::find()
            .filter(financial_indicators::Column::Code.eq(r.ts_code.as_str()))
            .filter(financial_indicators::Column::EndDate.eq(r.end_date))
            .one(txn)
            .await?;
        let mut model = match existing {
            Some(row) => row.into(),
            None => financial_indicators::ActiveModel {
                code: Set(r.ts_code.clone()),
                end_date: Set(r.end_date),
                ..Default::default()
            },
        };
        model.ann_date = Set(r.ann_date);
        model.gross_margin = Set(r.gross_margin);
        model.debt_to_assets = Set(r.debt_to_assets);
        model.updated_at = Set(now);
        model.save(txn).await?;
    }

    Ok(())
}

/// Codes with at least one fact row (balance sheet, income or ratios)
/// for `period`
pub async fn covered_codes<C: ConnectionTrait>(
    db: &C,
    period: NaiveDate,
) -> Result<HashSet<String>, AppError> {
    let mut covered: HashSet<String> = IncomeStatements::find()
        .select_only()
        .column(income_statements::Column::Code)
        .filter(income_statements::Column::EndDate.eq(period))
        .into_tuple::<String>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    covered.extend(
        BalanceSheets::find()
            .select_only()
            .column(balance_sheets::Column::Code)
            .filter(balance_sheets::Column::EndDate.eq(period))
            .into_tuple::<String>()
            .all(db)
            .await?,
    );

    covered.extend(
        FinancialIndicators::find()
            .select_only()
            .column(financial_indicators::Column::Code)
            .filter(financial_indicators::Column::EndDate.eq(period))
            .into_tuple::<String>()
            .all(db)
            .await?,
    );

    Ok(covered)
}

/// Whether any statement facts for `code` already exist for `period`
pub async fn has_period<C: ConnectionTrait>(
    db: &C,
    code: &str,
    period: NaiveDate,
) -> Result<bool, AppError> {
    if IncomeStatements::find()
        .filter(income_statements::Column::Code.eq(code))
        .filter(income_statements::Column::EndDate.eq(period))
        .one(db)
        .await?
        .is_some()
    {
        return Ok(true);
    }

    if BalanceSheets::find()
        .filter(balance_sheets::Column::Code.eq(code))
        .filter(balance_sheets::Column::EndDate.eq(period))
        .one(db)
        .await?
        .is_some()
    {
        return Ok(true);
    }

    let ratios = FinancialIndicators::find()
        .filter(financial_indicators::Column::Code.eq(code))
        .filter(financial_indicators::Column::EndDate.eq(period))
        .one(db)
        .await?;
    Ok(ratios.is_some())
}
