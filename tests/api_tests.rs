mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

use sectorscope_backend::entities::{daily_bars, prelude::*};
use sectorscope_backend::jobs;
use sectorscope_backend::routes::build_router;
use sectorscope_backend::services::sync_status;

use crate::common::{instrument, seed_bar, seed_instrument, setup_test_db, test_state, FakeProvider};

async fn build_test_router() -> (Router, std::sync::Arc<FakeProvider>) {
    let (app, provider, _) = build_test_app().await;
    (app, provider)
}

async fn build_test_app() -> (Router, std::sync::Arc<FakeProvider>, DatabaseConnection) {
    let db = setup_test_db().await.expect("Failed to create test DB");
    seed_instrument(&db, "600000.SH", "Pudong Bank").await;
    seed_instrument(&db, "000001.SZ", "Ping An Bank").await;
    seed_bar(&db, "600000.SH", "20240920", 10.0, 10.5, 12_000.0).await;
    seed_bar(&db, "600000.SH", "20240923", 10.5, 11.0, 8_000.0).await;

    let provider = FakeProvider::new();
    let state = test_state(db.clone(), provider.clone());
    (build_router(state), provider, db)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = build_test_router().await;
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));
}

#[tokio::test]
async fn test_sector_lifecycle() {
    let (app, _) = build_test_router().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/sectors",
        Some(json!({"name": "Banks", "stocks": "600000, Ping An Bank, ZZZ"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["resolved_count"], 2);
    assert_eq!(body["unmatched"], json!(["ZZZ"]));
    let id = body["sector_id"].as_i64().unwrap();

    let (status, body) = send(&app, "GET", "/api/sectors", None).await;
    assert_eq!(status, StatusCode::OK);
    let banks = body
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["id"] == id)
        .unwrap()
        .clone();
    assert_eq!(banks["stock_count"], 2);
    assert_eq!(banks["sector_type"], "CUSTOM");

    let (status, body) = send(&app, "GET", &format!("/api/sectors/{}/stocks", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/sectors/{}", id),
        Some(json!({"name": "Lenders"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Lenders");

    let (status, _) = send(&app, "DELETE", &format!("/api/sectors/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", &format!("/api/sectors/{}/stocks", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_index_sector_is_protected() {
    let (app, _) = build_test_router().await;

    let (status, body) = send(&app, "DELETE", "/api/sectors/1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "PROTECTED_SECTOR");
}

#[tokio::test]
async fn test_daily_changes_and_snapshot() {
    let (app, _) = build_test_router().await;
    let (_, body) = send(
        &app,
        "POST",
        "/api/sectors",
        Some(json!({"name": "One", "stocks": "600000.SH"})),
    )
    .await;
    let id = body["sector_id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/sectors/{}/daily-changes?convention=b", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["convention"], "b");
    assert_eq!(body["dates"], json!(["2024-09-20", "2024-09-23"]));
    assert_eq!(body["daily"]["2024-09-23"]["stocks"][0]["change"], 10.0);
    assert!(body.get("latest_stocks").is_none());

    let (status, body) = send(&app, "GET", &format!("/api/sectors/{}/snapshot", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["convention"], "a");
    assert_eq!(body["latest_stocks"][0]["code"], "600000.SH");

    let (status, _) = send(
        &app,
        "GET",
        &format!("/api/sectors/{}/daily-changes?convention=z", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reconcile_endpoint() {
    let (app, provider) = build_test_router().await;
    provider.set_constituents("000016.SH", &["600000.SH", "000001.SZ"]);

    let (status, body) = send(&app, "POST", "/api/sectors/sz50/reconcile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sector_code"], "SZ50");
    assert_eq!(body["stats"]["added"], 2);
    assert_eq!(body["stats"]["total"], 2);
}

#[tokio::test]
async fn test_stock_endpoints() {
    let (app, _) = build_test_router().await;

    let (status, body) = send(&app, "GET", "/api/stocks/600000", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], "600000.SH");
    assert_eq!(body["changes"], json!([0.0, 4.76]));
    assert_eq!(body["money_flow"]["source"], "simulated");

    let (status, body) = send(&app, "GET", "/api/stocks/not-a-code", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app, "GET", "/api/stocks/601999.SH", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/api/stocks/600000.SH/money-flow", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "provider");
}

#[tokio::test]
async fn test_update_endpoints() {
    let (app, provider) = build_test_router().await;

    let (status, body) = send(&app, "GET", "/api/update/progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_running"], false);
    assert_eq!(body["status"], "idle");

    let (status, body) = send(&app, "POST", "/api/update/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);

    let (status, body) = send(
        &app,
        "POST",
        "/api/update/daily-indicators?trade_date=2024-09-23",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app,
        "POST",
        "/api/update/daily-indicators?trade_date=20240922",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = send(&app, "POST", "/api/update/instruments", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    *provider.instruments.lock() = vec![
        instrument("600000.SH", "Pudong Bank"),
        instrument("600519.SH", "Kweichow Moutai"),
    ];
    let (status, body) = send(&app, "POST", "/api/update/instruments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (status, body) = send(&app, "GET", "/api/update/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_single_stock_historical_update() {
    let (app, provider) = build_test_router().await;
    provider.set_bars(
        "000001.SZ",
        vec![common::bar("000001.SZ", "20240920", 11.0, 11.2, 900.0)],
    );

    let (status, body) = send(&app, "POST", "/api/update/historical/000001", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated_count"], 1);
    assert_eq!(body["error_count"], 0);
}

#[tokio::test]
async fn test_background_historical_update() {
    let (app, provider, db) = build_test_app().await;
    provider.set_bars(
        "000001.SZ",
        vec![
            common::bar("000001.SZ", "20240920", 11.0, 11.2, 900.0),
            common::bar("000001.SZ", "20240923", 11.2, 11.5, 700.0),
        ],
    );
    let gate = provider.hold_bar_fetch();

    let (status, body) = send(&app, "POST", "/api/update/historical", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);

    // The first run is parked on its first fetch
    let (status, body) = send(&app, "POST", "/api/update/historical", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CONFLICT");

    gate.notify_one();

    let mut progress = Value::Null;
    for _ in 0..200 {
        let (_, body) = send(&app, "GET", "/api/update/progress", None).await;
        if body["status"] == "completed" {
            progress = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(progress["status"], "completed");
    assert_eq!(progress["is_running"], false);
    assert_eq!(progress["total"], 2);
    assert_eq!(progress["updated_count"], 1);

    let stored = DailyBars::find()
        .filter(daily_bars::Column::Code.eq("000001.SZ"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(stored, 2);
}

#[tokio::test]
async fn test_background_jobs_record_runs() {
    let db = setup_test_db().await.unwrap();
    seed_instrument(&db, "000001.SZ", "Ping An Bank").await;
    let provider = FakeProvider::new();
    provider.set_bars(
        "000001.SZ",
        vec![common::bar("000001.SZ", "20240920", 11.0, 11.2, 900.0)],
    );
    let state = test_state(db.clone(), provider.clone());

    jobs::start_all(&state).await;

    // Historical prices succeed; index membership fails on empty constituents
    let mut historical = None;
    let mut membership = None;
    for _ in 0..200 {
        let rows = SyncStatus::find().all(&db).await.unwrap();
        historical = rows
            .iter()
            .find(|r| r.job_name == sync_status::jobs::HISTORICAL_PRICES)
            .cloned();
        membership = rows
            .iter()
            .find(|r| r.job_name == sync_status::jobs::INDEX_MEMBERSHIP)
            .cloned();
        if historical.as_ref().is_some_and(|r| r.last_success_at.is_some()) && membership.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(historical.is_some_and(|r| r.last_success_at.is_some()));
    assert!(membership.is_some_and(|r| r.last_success_at.is_none()));

    let stored = DailyBars::find()
        .filter(daily_bars::Column::Code.eq("000001.SZ"))
        .count(&db)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}
