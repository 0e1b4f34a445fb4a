//! Sector CRUD and membership maintenance.
//!
//! Custom sectors are built from pasted stock lists and replaced wholesale;
//! index sectors follow a published constituent list and are only ever
//! reconciled by delta.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, FromQueryResult,
    JoinType, Order, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::entities::{
    prelude::*,
    sector_stocks,
    sectors::{self, SectorType},
};
use crate::error::AppError;
use crate::services::instruments::{names_for, normalize_code, resolve_tokens, split_tokens};
use crate::services::provider::MarketDataProvider;

/// Provider index codes for the built-in index sectors
pub fn index_code_for(sector_code: &str) -> Option<&'static str> {
    match sector_code {
        "SZ50" => Some("000016.SH"),
        "HS300" => Some("000300.SH"),
        "ZZ500" => Some("000905.SH"),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorSaveResult {
    pub sector_id: i32,
    pub code: String,
    pub resolved_count: usize,
    pub unmatched: Vec<String>,
    /// False when an existing sector's membership was replaced
    pub created: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub total: usize,
}

/// Set arithmetic behind a reconcile, kept separate from persistence
#[derive(Debug, Clone, Default)]
pub struct MembershipDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl MembershipDelta {
    pub fn compute(current: &HashSet<String>, target: &HashSet<String>) -> Self {
        let mut added: Vec<String> = target.difference(current).cloned().collect();
        let mut removed: Vec<String> = current.difference(target).cloned().collect();
        let mut unchanged: Vec<String> = current.intersection(target).cloned().collect();
        added.sort();
        removed.sort();
        unchanged.sort();
        Self {
            added,
            removed,
            unchanged,
        }
    }

    pub fn stats(&self) -> ReconcileStats {
        ReconcileStats {
            added: self.added.len(),
            removed: self.removed.len(),
            unchanged: self.unchanged.len(),
            total: self.added.len() + self.unchanged.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromQueryResult)]
pub struct SectorSummary {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub sector_type: SectorType,
    pub stock_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectorMember {
    pub code: String,
    pub name: String,
}

pub async fn find_sector<C: ConnectionTrait>(db: &C, id: i32) -> Result<sectors::Model, AppError> {
    Sectors::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("sector {} not found", id)))
}

/// Member codes of a sector, sorted
pub async fn member_codes<C: ConnectionTrait>(db: &C, sector_id: i32) -> Result<Vec<String>, AppError> {
    let codes = SectorStocks::find()
        .select_only()
        .column(sector_stocks::Column::Code)
        .filter(sector_stocks::Column::SectorId.eq(sector_id))
        .order_by(sector_stocks::Column::Code, Order::Asc)
        .into_tuple::<String>()
        .all(db)
        .await?;
    Ok(codes)
}

/// Create a custom sector from a pasted stock list, or replace the
/// membership of the custom sector that already carries `name`.
///
/// The delete and re-insert run in one transaction.
pub async fn create_or_replace_sector(
    db: &DatabaseConnection,
    name: &str,
    stock_list: &str,
) -> Result<SectorSaveResult, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("sector name is required".to_string()));
    }

    let tokens = split_tokens(stock_list);
    if tokens.is_empty() {
        return Err(AppError::Validation("stock list is empty".to_string()));
    }

    let resolution = resolve_tokens(db, &tokens).await?;
    if resolution.codes.is_empty() {
        return Err(AppError::Validation(format!(
            "none of the {} stock entries matched a known instrument",
            tokens.len()
        )));
    }

    let existing = Sectors::find()
        .filter(sectors::Column::Name.eq(name))
        .one(db)
        .await?;

    if let Some(sector) = &existing {
        if sector.sector_type == SectorType::Index {
            return Err(AppError::Protected(format!(
                "'{}' is an index sector; its membership follows the published index",
                name
            )));
        }
    }

    let now = Utc::now().naive_utc();
    let txn = db.begin().await?;

    let (sector, created) = match existing {
        Some(sector) => {
            SectorStocks::delete_many()
                .filter(sector_stocks::Column::SectorId.eq(sector.id))
                .exec(&txn)
                .await?;
            let mut active: sectors::ActiveModel = sector.into();
            active.updated_at = Set(now);
            (active.update(&txn).await?, false)
        }
        None => {
            let code = format!("CUSTOM_{}", uuid::Uuid::new_v4().simple());
            let sector = sectors::ActiveModel {
                code: Set(code),
                name: Set(name.to_string()),
                sector_type: Set(SectorType::Custom),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            (sector, true)
        }
    };

    insert_members(&txn, sector.id, &resolution.codes).await?;
    txn.commit().await?;

    info!(
        sector_id = sector.id,
        name,
        resolved = resolution.codes.len(),
        unmatched = resolution.unmatched.len(),
        created,
        "Custom sector saved"
    );

    Ok(SectorSaveResult {
        sector_id: sector.id,
        code: sector.code,
        resolved_count: resolution.codes.len(),
        unmatched: resolution.unmatched,
        created,
    })
}

/// Bring an index sector in line with the provider's constituent list,
/// applying only the delta.
pub async fn reconcile_sector_membership(
    db: &DatabaseConnection,
    provider: &dyn MarketDataProvider,
    sector_code: &str,
) -> Result<ReconcileStats, AppError> {
    let sector = Sectors::find()
        .filter(sectors::Column::Code.eq(sector_code))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("sector {} not found", sector_code)))?;

    let index_code = index_code_for(&sector.code).ok_or_else(|| {
        AppError::Validation(format!(
            "sector {} has no external membership source",
            sector.code
        ))
    })?;

    let fetched = provider.fetch_index_constituents(index_code).await?;
    let target: HashSet<String> = fetched.iter().filter_map(|c| normalize_code(c)).collect();
    if target.is_empty() {
        // An empty answer would wipe the sector; treat it as an upstream gap
        return Err(AppError::Validation(format!(
            "no constituents returned for {}",
            index_code
        )));
    }

    apply_membership(db, &sector, &target).await
}

/// Replace a sector's membership with `target` by delta, in one transaction
pub async fn apply_membership(
    db: &DatabaseConnection,
    sector: &sectors::Model,
    target: &HashSet<String>,
) -> Result<ReconcileStats, AppError> {
    let txn = db.begin().await?;

    let current: HashSet<String> = member_codes(&txn, sector.id).await?.into_iter().collect();
    let delta = MembershipDelta::compute(&current, target);

    if !delta.removed.is_empty() {
        SectorStocks::delete_many()
            .filter(sector_stocks::Column::SectorId.eq(sector.id))
            .filter(sector_stocks::Column::Code.is_in(delta.removed.clone()))
            .exec(&txn)
            .await?;
    }
    insert_members(&txn, sector.id, &delta.added).await?;

    let mut active: sectors::ActiveModel = sector.clone().into();
    active.updated_at = Set(Utc::now().naive_utc());
    active.update(&txn).await?;

    txn.commit().await?;

    let stats = delta.stats();
    info!(
        sector = %sector.code,
        added = stats.added,
        removed = stats.removed,
        unchanged = stats.unchanged,
        "Sector membership reconciled"
    );
    Ok(stats)
}

/// Reconcile every index sector; one failure does not stop the rest
pub async fn reconcile_all_index_sectors(
    db: &DatabaseConnection,
    provider: &dyn MarketDataProvider,
) -> Result<Vec<(String, Result<ReconcileStats, AppError>)>, AppError> {
    let index_sectors = Sectors::find()
        .filter(sectors::Column::SectorType.eq(SectorType::Index))
        .order_by(sectors::Column::Code, Order::Asc)
        .all(db)
        .await?;

    let mut results = Vec::with_capacity(index_sectors.len());
    for sector in index_sectors {
        let outcome = reconcile_sector_membership(db, provider, &sector.code).await;
        if let Err(e) = &outcome {
            warn!(sector = %sector.code, error = %e, "Index sector reconcile failed");
        }
        results.push((sector.code, outcome));
    }
    Ok(results)
}

pub async fn rename_sector(
    db: &DatabaseConnection,
    id: i32,
    new_name: &str,
) -> Result<sectors::Model, AppError> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(AppError::Validation("sector name is required".to_string()));
    }

    let clash = Sectors::find()
        .filter(sectors::Column::Name.eq(new_name))
        .filter(sectors::Column::Id.ne(id))
        .one(db)
        .await?;
    if clash.is_some() {
        return Err(AppError::Conflict(format!(
            "a sector named '{}' already exists",
            new_name
        )));
    }

    let sector = find_sector(db, id).await?;
    let mut active: sectors::ActiveModel = sector.into();
    active.name = Set(new_name.to_string());
    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active.update(db).await?;

    info!(sector_id = id, name = new_name, "Sector renamed");
    Ok(updated)
}

pub async fn delete_sector(db: &DatabaseConnection, id: i32) -> Result<(), AppError> {
    let sector = find_sector(db, id).await?;
    if sector.sector_type == SectorType::Index {
        return Err(AppError::Protected(format!(
            "index sector '{}' cannot be deleted",
            sector.name
        )));
    }

    let txn = db.begin().await?;
    SectorStocks::delete_many()
        .filter(sector_stocks::Column::SectorId.eq(id))
        .exec(&txn)
        .await?;
    Sectors::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    info!(sector_id = id, name = %sector.name, "Sector deleted");
    Ok(())
}

/// All sectors with member counts, index sectors first
pub async fn list_sectors(db: &DatabaseConnection) -> Result<Vec<SectorSummary>, AppError> {
    let rows = Sectors::find()
        .select_only()
        .column(sectors::Column::Id)
        .column(sectors::Column::Code)
        .column(sectors::Column::Name)
        .column(sectors::Column::SectorType)
        .column_as(sector_stocks::Column::Id.count(), "stock_count")
        .join(JoinType::LeftJoin, sectors::Relation::SectorStocks.def())
        .group_by(sectors::Column::Id)
        .group_by(sectors::Column::Code)
        .group_by(sectors::Column::Name)
        .group_by(sectors::Column::SectorType)
        .order_by(sectors::Column::SectorType, Order::Desc)
        .order_by(sectors::Column::Name, Order::Asc)
        .into_model::<SectorSummary>()
        .all(db)
        .await?;
    Ok(rows)
}

/// Members with display names; unknown instruments fall back to the code
pub async fn get_sector_members(
    db: &DatabaseConnection,
    id: i32,
) -> Result<Vec<SectorMember>, AppError> {
    find_sector(db, id).await?;
    let codes = member_codes(db, id).await?;
    let names = names_for(db, &codes).await?;

    Ok(codes
        .into_iter()
        .map(|code| SectorMember {
            name: names.get(&code).cloned().unwrap_or_else(|| code.clone()),
            code,
        })
        .collect())
}

async fn insert_members<C: ConnectionTrait>(
    db: &C,
    sector_id: i32,
    codes: &[String],
) -> Result<(), AppError> {
    if codes.is_empty() {
        return Ok(());
    }

    let now = Utc::now().naive_utc();
    let rows: Vec<sector_stocks::ActiveModel> = codes
        .iter()
        .map(|code| sector_stocks::ActiveModel {
            sector_id: Set(sector_id),
            code: Set(code.clone()),
            updated_at: Set(now),
            ..Default::default()
        })
        .collect();

    for chunk in rows.chunks(500) {
        SectorStocks::insert_many(chunk.to_vec())
            .exec_without_returning(db)
            .await?;
    }
    Ok(())
}
