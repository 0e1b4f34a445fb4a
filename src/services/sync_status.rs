//! Persisted bookkeeping for scheduled updater jobs, so a restart does not
//! re-run a job inside its minimum interval.

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::sync_status::{self, Entity as SyncStatus};
use crate::error::AppError;

/// Job names
pub mod jobs {
    pub const HISTORICAL_PRICES: &str = "historical_prices_sync";
    pub const DAILY_INDICATORS: &str = "daily_indicators_sync";
    pub const INDEX_MEMBERSHIP: &str = "index_membership_sync";
    pub const FUNDAMENTALS: &str = "fundamentals_sync";
}

/// Default minimum intervals between runs (seconds)
pub mod intervals {
    pub const HISTORICAL_PRICES: i32 = 43200; // 12 hours
    pub const DAILY_INDICATORS: i32 = 43200;
    pub const INDEX_MEMBERSHIP: i32 = 86400;
    pub const FUNDAMENTALS: i32 = 604800; // weekly
}

async fn find(
    db: &DatabaseConnection,
    job_name: &str,
) -> Result<Option<sync_status::Model>, AppError> {
    Ok(SyncStatus::find()
        .filter(sync_status::Column::JobName.eq(job_name))
        .one(db)
        .await?)
}

/// True when the job has never succeeded or its interval has elapsed
pub async fn should_sync(db: &DatabaseConnection, job_name: &str) -> Result<bool, AppError> {
    let Some(record) = find(db, job_name).await? else {
        tracing::info!(job = job_name, "No sync record, will run");
        return Ok(true);
    };

    let Some(last_success) = record.last_success_at else {
        return Ok(true);
    };

    let elapsed = Utc::now().naive_utc().signed_duration_since(last_success);
    let interval = Duration::seconds(record.min_interval_secs as i64);

    if elapsed >= interval {
        Ok(true)
    } else {
        tracing::info!(
            job = job_name,
            elapsed_secs = elapsed.num_seconds(),
            next_in_secs = (interval - elapsed).num_seconds(),
            "Skipping run, last success too recent"
        );
        Ok(false)
    }
}

pub async fn record_success(
    db: &DatabaseConnection,
    job_name: &str,
    default_interval_secs: i32,
    summary: &str,
) -> Result<(), AppError> {
    let now = Utc::now().naive_utc();

    match find(db, job_name).await? {
        Some(record) => {
            let success_count = record.success_count + 1;
            let mut active: sync_status::ActiveModel = record.into();
            active.last_success_at = Set(Some(now));
            active.last_attempt_at = Set(Some(now));
            active.last_error = Set(None);
            active.last_summary = Set(Some(summary.to_string()));
            active.success_count = Set(success_count);
            active.update(db).await?;
        }
        None => {
            sync_status::ActiveModel {
                job_name: Set(job_name.to_string()),
                last_success_at: Set(Some(now)),
                last_attempt_at: Set(Some(now)),
                last_error: Set(None),
                last_summary: Set(Some(summary.to_string())),
                success_count: Set(1),
                error_count: Set(0),
                min_interval_secs: Set(default_interval_secs),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
    }

    Ok(())
}

pub async fn record_failure(
    db: &DatabaseConnection,
    job_name: &str,
    default_interval_secs: i32,
    error: &str,
) -> Result<(), AppError> {
    let now = Utc::now().naive_utc();

    match find(db, job_name).await? {
        Some(record) => {
            let error_count = record.error_count + 1;
            let mut active: sync_status::ActiveModel = record.into();
            active.last_attempt_at = Set(Some(now));
            active.last_error = Set(Some(error.to_string()));
            active.error_count = Set(error_count);
            active.update(db).await?;
        }
        None => {
            sync_status::ActiveModel {
                job_name: Set(job_name.to_string()),
                last_success_at: Set(None),
                last_attempt_at: Set(Some(now)),
                last_error: Set(Some(error.to_string())),
                last_summary: Set(None),
                success_count: Set(0),
                error_count: Set(1),
                min_interval_secs: Set(default_interval_secs),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
    }

    tracing::debug!(job = job_name, error, "Recorded failed run");
    Ok(())
}

/// All job records, for the status endpoint
pub async fn list(db: &DatabaseConnection) -> Result<Vec<sync_status::Model>, AppError> {
    Ok(SyncStatus::find().all(db).await?)
}
