mod common;

use sea_orm::{ActiveModelTrait, Set};

use sectorscope_backend::entities::daily_indicators;
use sectorscope_backend::error::AppError;
use sectorscope_backend::services::money_flow::SIMULATED_SOURCE;
use sectorscope_backend::services::sector_analytics::{
    get_sector_daily_changes, get_sector_snapshot, Convention,
};
use sectorscope_backend::services::sector_fundamentals::get_sector_fundamentals;
use sectorscope_backend::services::sector_membership::create_or_replace_sector;
use sectorscope_backend::services::stock_analytics::{get_stock_financials, get_stock_series};

use crate::common::{date, seed_bar, seed_instrument, setup_test_db, test_config, FakeProvider};

/// Two members: X trades all three days, Y only from the second day.
async fn seed_two_stock_sector(db: &sea_orm::DatabaseConnection) -> i32 {
    seed_instrument(db, "600000.SH", "Stock X").await;
    seed_instrument(db, "000001.SZ", "Stock Y").await;

    seed_bar(db, "600000.SH", "20240920", 10.0, 10.5, 12_000.0).await;
    seed_bar(db, "600000.SH", "20240923", 10.5, 11.0, 8_000.0).await;
    seed_bar(db, "600000.SH", "20240924", 11.0, 9.0, 5_000.0).await;
    seed_bar(db, "000001.SZ", "20240923", 20.0, 21.0, 30_000.0).await;
    seed_bar(db, "000001.SZ", "20240924", 21.0, 22.0, 10_000.0).await;
    // Before the window start; ignored
    seed_bar(db, "000001.SZ", "20240919", 5.0, 5.0, 1.0).await;

    create_or_replace_sector(db, "Pair", "600000.SH,000001.SZ")
        .await
        .unwrap()
        .sector_id
}

#[tokio::test]
async fn test_convention_a_rebases_to_own_first_open() {
    let db = setup_test_db().await.unwrap();
    let sector_id = seed_two_stock_sector(&db).await;

    let view = get_sector_daily_changes(&db, sector_id, Convention::A, date("20240920"))
        .await
        .unwrap();

    assert_eq!(view.sector_name, "Pair");
    assert_eq!(view.dates, vec!["2024-09-20", "2024-09-23", "2024-09-24"]);
    assert!(view.latest_stocks.is_none());

    let day1 = &view.daily["2024-09-20"];
    assert_eq!(day1.stocks.len(), 1);
    assert_eq!(day1.stocks[0].change, Some(5.0));

    let day2 = &view.daily["2024-09-23"];
    let x = day2.stocks.iter().find(|s| s.code == "600000.SH").unwrap();
    let y = day2.stocks.iter().find(|s| s.code == "000001.SZ").unwrap();
    assert_eq!(x.change, Some(10.0));
    assert_eq!(y.change, Some(5.0));
    assert_eq!(y.name, "Stock Y");
    // Ascending by change
    assert_eq!(day2.stocks[0].code, "000001.SZ");

    let day3 = &view.daily["2024-09-24"];
    assert_eq!(day3.stocks[0].code, "600000.SH");
    assert_eq!(day3.stocks[0].change, Some(-10.0));
    assert_eq!(day3.stocks[1].change, Some(10.0));

    // Amounts: thousands -> ten-thousands
    assert_eq!(day2.total_amount, 3800.0);
    assert_eq!(day2.total_amount_str, "3800.00万");
}

#[tokio::test]
async fn test_convention_b_leaves_late_listers_ungraded() {
    let db = setup_test_db().await.unwrap();
    let sector_id = seed_two_stock_sector(&db).await;

    let view = get_sector_daily_changes(&db, sector_id, Convention::B, date("20240920"))
        .await
        .unwrap();

    assert_eq!(view.convention, Convention::B);
    let day2 = &view.daily["2024-09-23"];
    // Y has no bar on the window's first date
    assert_eq!(day2.stocks[0].code, "000001.SZ");
    assert_eq!(day2.stocks[0].change, None);
    assert_eq!(day2.stocks[1].change, Some(10.0));

    let day3 = &view.daily["2024-09-24"];
    let x = day3.stocks.iter().find(|s| s.code == "600000.SH").unwrap();
    assert_eq!(x.change, Some(-10.0));
}

#[tokio::test]
async fn test_snapshot_includes_latest_table() {
    let db = setup_test_db().await.unwrap();
    let sector_id = seed_two_stock_sector(&db).await;

    let view = get_sector_snapshot(&db, sector_id, date("20240920"))
        .await
        .unwrap();

    let latest = view.latest_stocks.expect("snapshot has latest rows");
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].code, "600000.SH");
    assert_eq!(latest[0].change, Some(-10.0));
    assert_eq!(latest[0].close, Some(9.0));
    // 10_000 thousand yuan = 0.1 hundred-million
    assert_eq!(latest[1].latest_amount, 0.1);
}

#[tokio::test]
async fn test_sector_views_handle_missing_and_empty() {
    let db = setup_test_db().await.unwrap();

    let err = get_sector_daily_changes(&db, 999, Convention::A, date("20240920"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Seeded index sector without members
    let view = get_sector_daily_changes(&db, 1, Convention::A, date("20240920"))
        .await
        .unwrap();
    assert!(view.dates.is_empty());
    assert!(view.daily.is_empty());
}

#[tokio::test]
async fn test_stock_series_with_simulated_flow() {
    let db = setup_test_db().await.unwrap();
    let sector_id = seed_two_stock_sector(&db).await;

    let series = get_stock_series(&db, "sh.600000", date("20240920"))
        .await
        .unwrap();

    assert_eq!(series.code, "600000.SH");
    assert_eq!(series.dates.len(), 3);
    assert_eq!(series.changes, vec![0.0, 4.76, -18.18]);
    // Thousands -> yuan
    assert_eq!(series.volumes[0], 12_000_000.0);
    assert_eq!(series.sectors.len(), 1);
    assert_eq!(series.sectors[0].id, sector_id);

    assert_eq!(series.money_flow.source, SIMULATED_SOURCE);
    assert_eq!(series.money_flow.days.len(), 3);
    let first = &series.money_flow.days[0];
    // base = 1% of traded value; extra-large within [0.8, 1.2) x base
    assert!(first.extra_large_in >= 96_000.0 && first.extra_large_in <= 144_000.0);

    let err = get_stock_series(&db, "688888.SH", date("20240920"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = get_stock_series(&db, "garbage", date("20240920"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_stock_financials_fetch_on_demand() {
    let db = setup_test_db().await.unwrap();
    seed_instrument(&db, "600000.SH", "Pudong Bank").await;
    let config = test_config();
    let provider = FakeProvider::new();

    let period = sectorscope_backend::services::fundamentals::reporting_period(
        chrono::Utc::now().date_naive(),
    );
    provider.set_statements("600000.SH", period, 2.5e9);

    let financials = get_stock_financials(&db, Some(provider.as_ref()), &config, "600000")
        .await
        .unwrap();
    assert_eq!(financials.period, Some(period));
    assert_eq!(financials.revenue, Some(25.0));
    assert_eq!(financials.net_profit, Some(2.5));
    assert_eq!(financials.gross_margin, Some(30.46));

    // Without a provider and without stored rows there is nothing to show
    seed_instrument(&db, "600519.SH", "Kweichow Moutai").await;
    let err = get_stock_financials(&db, None, &config, "600519.SH")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_sector_fundamentals_sorted_by_market_value() {
    let db = setup_test_db().await.unwrap();
    let sector_id = seed_two_stock_sector(&db).await;

    for (code, trade_date, total_mv) in [
        ("600000.SH", "20240923", 1_000_000.0),
        ("600000.SH", "20240924", 1_500_000.0),
        ("000001.SZ", "20240924", 3_000_000.0),
    ] {
        daily_indicators::ActiveModel {
            code: Set(code.to_string()),
            trade_date: Set(date(trade_date)),
            total_mv: Set(Some(total_mv)),
            pe_ttm: Set(Some(8.0)),
            ..Default::default()
        }
        .insert(&db)
        .await
        .unwrap();
    }

    let view = get_sector_fundamentals(&db, sector_id, date("20240630"))
        .await
        .unwrap();

    assert_eq!(view.stocks.len(), 2);
    assert_eq!(view.stocks[0].code, "000001.SZ");
    // Latest indicator row wins; ten-thousands -> hundred-millions
    assert_eq!(view.stocks[1].market_value, Some(150.0));
    assert!(view.stocks[0].revenue.is_none());
}
