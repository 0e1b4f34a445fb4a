use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::error::AppError;
use crate::models::common::MessageResponse;
use crate::models::sector::{
    DailyChangesQuery, ReconcileResponse, RenameSectorRequest, RenameSectorResponse,
    SaveSectorRequest, SaveSectorResponse,
};
use crate::services::fundamentals::reporting_period;
use crate::services::sector_analytics::{self, SectorDailyChanges};
use crate::services::sector_fundamentals::{self, SectorFundamentals};
use crate::services::sector_membership::{self, SectorMember, SectorSummary};
use crate::AppState;

pub async fn list_sectors(
    State(state): State<AppState>,
) -> Result<Json<Vec<SectorSummary>>, AppError> {
    Ok(Json(sector_membership::list_sectors(&state.db).await?))
}

pub async fn save_sector(
    State(state): State<AppState>,
    Json(payload): Json<SaveSectorRequest>,
) -> Result<Json<SaveSectorResponse>, AppError> {
    let result =
        sector_membership::create_or_replace_sector(&state.db, &payload.name, &payload.stocks)
            .await?;

    let mut message = format!("saved {} stocks", result.resolved_count);
    if !result.unmatched.is_empty() {
        message.push_str(&format!(", unmatched: {}", result.unmatched.join(", ")));
    }

    Ok(Json(SaveSectorResponse {
        success: true,
        message,
        result,
    }))
}

pub async fn rename_sector(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<RenameSectorRequest>,
) -> Result<Json<RenameSectorResponse>, AppError> {
    let sector = sector_membership::rename_sector(&state.db, id, &payload.name).await?;
    Ok(Json(RenameSectorResponse {
        success: true,
        id: sector.id,
        name: sector.name,
    }))
}

pub async fn delete_sector(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, AppError> {
    sector_membership::delete_sector(&state.db, id).await?;
    Ok(Json(MessageResponse::ok(format!("sector {} deleted", id))))
}

pub async fn get_sector_members(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Vec<SectorMember>>, AppError> {
    Ok(Json(sector_membership::get_sector_members(&state.db, id).await?))
}

pub async fn get_sector_daily_changes(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<DailyChangesQuery>,
) -> Result<Json<SectorDailyChanges>, AppError> {
    let view = sector_analytics::get_sector_daily_changes(
        &state.db,
        id,
        query.convention,
        state.config.history_start,
    )
    .await?;
    Ok(Json(view))
}

pub async fn get_sector_snapshot(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SectorDailyChanges>, AppError> {
    let view =
        sector_analytics::get_sector_snapshot(&state.db, id, state.config.history_start).await?;
    Ok(Json(view))
}

pub async fn get_sector_fundamentals(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<SectorFundamentals>, AppError> {
    let period = reporting_period(chrono::Utc::now().date_naive());
    Ok(Json(
        sector_fundamentals::get_sector_fundamentals(&state.db, id, period).await?,
    ))
}

pub async fn reconcile_sector(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ReconcileResponse>, AppError> {
    let code = code.trim().to_uppercase();
    let stats =
        sector_membership::reconcile_sector_membership(&state.db, state.provider.as_ref(), &code)
            .await?;
    Ok(Json(ReconcileResponse {
        success: true,
        sector_code: code,
        stats,
    }))
}
