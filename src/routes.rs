use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{sector, stock, update};
use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/sectors",
            get(sector::list_sectors).post(sector::save_sector),
        )
        .route(
            "/api/sectors/{id}",
            put(sector::rename_sector).delete(sector::delete_sector),
        )
        .route("/api/sectors/{id}/stocks", get(sector::get_sector_members))
        .route(
            "/api/sectors/{id}/daily-changes",
            get(sector::get_sector_daily_changes),
        )
        .route("/api/sectors/{id}/snapshot", get(sector::get_sector_snapshot))
        .route(
            "/api/sectors/{id}/fundamentals",
            get(sector::get_sector_fundamentals),
        )
        .route("/api/sectors/{id}/reconcile", post(sector::reconcile_sector))
        .route("/api/stocks/{code}", get(stock::get_stock_series))
        .route(
            "/api/stocks/{code}/financials",
            get(stock::get_stock_financials),
        )
        .route(
            "/api/stocks/{code}/money-flow",
            get(stock::get_stock_money_flow),
        )
        .route("/api/update/instruments", post(update::refresh_instruments))
        .route("/api/update/historical", post(update::start_historical_update))
        .route(
            "/api/update/historical/{code}",
            post(update::update_single_stock),
        )
        .route("/api/update/stop", post(update::stop_update))
        .route("/api/update/progress", get(update::get_update_progress))
        .route("/api/update/status", get(update::get_update_status))
        .route("/api/update/fundamentals", post(update::update_fundamentals))
        .route(
            "/api/update/daily-indicators",
            post(update::update_daily_indicators),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
