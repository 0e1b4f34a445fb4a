//! Sector performance engine.
//!
//! Every sector view is produced by `compute_daily_changes`, a pure function
//! over the sector's bars, parameterized by rebasing convention and by
//! whether the latest-date snapshot table is wanted.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    AccessMode, ColumnTrait, DatabaseConnection, EntityTrait, IsolationLevel, Order, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::entities::{daily_bars, prelude::*};
use crate::error::AppError;
use crate::services::instruments::names_for;
use crate::services::sector_membership::{find_sector, member_codes};
use crate::services::units::{
    format_wan, round2, thousands_to_wan, thousands_to_yi, wan_value,
};

/// How a constituent's daily change is rebased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Convention {
    /// Every date: (close - first_open) / first_open, where first_open is the
    /// instrument's own first open inside the window.
    #[default]
    A,
    /// The window's first date uses that day's (close - open) / open; later
    /// dates rebase to the open on the window's first date. Instruments with
    /// no bar on that first date stay ungraded.
    B,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockChange {
    pub code: String,
    pub name: String,
    /// Percent, two decimals; `None` when the instrument has no usable anchor
    pub change: Option<f64>,
    /// Ten-thousands
    pub amount: f64,
    pub amount_str: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyBreakdown {
    /// Ascending by change, ungraded first
    pub stocks: Vec<StockChange>,
    /// Ten-thousands
    pub total_amount: f64,
    pub total_amount_str: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestStock {
    pub code: String,
    pub name: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    /// Hundred-millions
    pub latest_amount: f64,
    /// Provider's stored day-over-day percent change
    pub latest_change: Option<f64>,
    /// Cumulative change under the view's convention
    pub change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorDailyChanges {
    pub sector_id: i32,
    pub sector_name: String,
    pub convention: Convention,
    /// `YYYY-MM-DD`, ascending
    pub dates: Vec<String>,
    pub daily: BTreeMap<String, DailyBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_stocks: Option<Vec<LatestStock>>,
}

/// Percent change of `close` against `base`, or `None` if either is unusable
fn pct_change(close: Option<f64>, base: Option<f64>) -> Option<f64> {
    let close = close?;
    let base = base.filter(|b| *b != 0.0 && b.is_finite())?;
    Some(round2((close - base) / base * 100.0))
}

/// Ungraded entries first, then ascending numeric change, then code
fn compare_changes(a: &StockChange, b: &StockChange) -> Ordering {
    match (a.change, b.change) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.total_cmp(&y),
    }
    .then_with(|| a.code.cmp(&b.code))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Build per-date breakdowns from a sector's bars.
///
/// `bars` must already be restricted to the analysis window; their order
/// does not matter. `names` supplies display names (code is the fallback).
pub fn compute_daily_changes(
    bars: &[daily_bars::Model],
    names: &HashMap<String, String>,
    convention: Convention,
    with_latest: bool,
) -> (Vec<String>, BTreeMap<String, DailyBreakdown>, Option<Vec<LatestStock>>) {
    let mut sorted: Vec<&daily_bars::Model> = bars.iter().collect();
    sorted.sort_by(|a, b| {
        a.trade_date
            .cmp(&b.trade_date)
            .then_with(|| a.code.cmp(&b.code))
    });

    let Some(window_first) = sorted.first().map(|b| b.trade_date) else {
        return (Vec::new(), BTreeMap::new(), with_latest.then(Vec::new));
    };
    let latest_date = sorted.last().map(|b| b.trade_date).unwrap_or(window_first);

    // Anchor open per instrument
    let mut anchors: HashMap<&str, Option<f64>> = HashMap::new();
    for bar in &sorted {
        match convention {
            Convention::A => {
                anchors.entry(bar.code.as_str()).or_insert(bar.open);
            }
            Convention::B => {
                if bar.trade_date == window_first {
                    anchors.entry(bar.code.as_str()).or_insert(bar.open);
                }
            }
        }
    }

    let display_name = |code: &str| names.get(code).cloned().unwrap_or_else(|| code.to_string());

    let mut grouped: BTreeMap<NaiveDate, (Vec<StockChange>, Decimal)> = BTreeMap::new();
    let mut latest_changes: HashMap<&str, Option<f64>> = HashMap::new();

    for bar in &sorted {
        let anchor = anchors.get(bar.code.as_str()).copied().flatten();
        let change = match convention {
            Convention::B if bar.trade_date == window_first => pct_change(bar.close, bar.open),
            _ => pct_change(bar.close, anchor),
        };

        let amount_wan = thousands_to_wan(bar.amount.unwrap_or(0.0));
        let entry = grouped
            .entry(bar.trade_date)
            .or_insert_with(|| (Vec::new(), Decimal::ZERO));
        entry.1 += amount_wan;
        entry.0.push(StockChange {
            code: bar.code.clone(),
            name: display_name(&bar.code),
            change,
            amount: wan_value(amount_wan),
            amount_str: format_wan(amount_wan),
        });

        if bar.trade_date == latest_date {
            latest_changes.insert(bar.code.as_str(), change);
        }
    }

    let mut dates = Vec::with_capacity(grouped.len());
    let mut daily = BTreeMap::new();
    for (date, (mut stocks, total)) in grouped {
        stocks.sort_by(compare_changes);
        let key = format_date(date);
        dates.push(key.clone());
        daily.insert(
            key,
            DailyBreakdown {
                stocks,
                total_amount: wan_value(total),
                total_amount_str: format_wan(total),
            },
        );
    }

    let latest = with_latest.then(|| {
        let mut rows: Vec<LatestStock> = sorted
            .iter()
            .filter(|b| b.trade_date == latest_date)
            .map(|b| LatestStock {
                code: b.code.clone(),
                name: display_name(&b.code),
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
                volume: b.vol,
                latest_amount: thousands_to_yi(b.amount.unwrap_or(0.0)),
                latest_change: b.pct_chg.map(round2),
                change: latest_changes.get(b.code.as_str()).copied().flatten(),
            })
            .collect();
        rows.sort_by(|a, b| {
            match (a.change, b.change) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => x.total_cmp(&y),
            }
            .then_with(|| a.code.cmp(&b.code))
        });
        rows
    });

    (dates, daily, latest)
}

/// Read a sector's members, bars and names inside one read-only transaction
/// so the view reflects a single snapshot.
async fn load_sector_view(
    db: &DatabaseConnection,
    sector_id: i32,
    cutoff: NaiveDate,
    convention: Convention,
    with_latest: bool,
) -> Result<SectorDailyChanges, AppError> {
    let txn = db
        .begin_with_config(Some(IsolationLevel::RepeatableRead), Some(AccessMode::ReadOnly))
        .await?;

    let sector = find_sector(&txn, sector_id).await?;
    let codes = member_codes(&txn, sector_id).await?;

    let (bars, names) = if codes.is_empty() {
        (Vec::new(), HashMap::new())
    } else {
        let bars = DailyBars::find()
            .filter(daily_bars::Column::Code.is_in(codes.clone()))
            .filter(daily_bars::Column::TradeDate.gte(cutoff))
            .order_by(daily_bars::Column::TradeDate, Order::Asc)
            .order_by(daily_bars::Column::Code, Order::Asc)
            .all(&txn)
            .await?;
        let names = names_for(&txn, &codes).await?;
        (bars, names)
    };

    txn.commit().await?;

    debug!(
        sector_id,
        members = codes.len(),
        bars = bars.len(),
        ?convention,
        "Computing sector view"
    );

    let (dates, daily, latest_stocks) = compute_daily_changes(&bars, &names, convention, with_latest);

    Ok(SectorDailyChanges {
        sector_id: sector.id,
        sector_name: sector.name,
        convention,
        dates,
        daily,
        latest_stocks,
    })
}

/// Day-by-day constituent changes for a sector under `convention`.
/// A sector without members yields empty `dates`.
pub async fn get_sector_daily_changes(
    db: &DatabaseConnection,
    sector_id: i32,
    convention: Convention,
    cutoff: NaiveDate,
) -> Result<SectorDailyChanges, AppError> {
    load_sector_view(db, sector_id, cutoff, convention, false).await
}

/// Convention A view plus the latest-date detail table
pub async fn get_sector_snapshot(
    db: &DatabaseConnection,
    sector_id: i32,
    cutoff: NaiveDate,
) -> Result<SectorDailyChanges, AppError> {
    load_sector_view(db, sector_id, cutoff, Convention::A, true).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, day).unwrap()
    }

    fn bar(code: &str, date: NaiveDate, open: f64, close: f64, amount: f64) -> daily_bars::Model {
        daily_bars::Model {
            id: 0,
            code: code.to_string(),
            trade_date: date,
            open: Some(open),
            high: Some(open.max(close)),
            low: Some(open.min(close)),
            close: Some(close),
            pre_close: None,
            change: None,
            pct_chg: Some(1.234),
            vol: Some(1000.0),
            amount: Some(amount),
        }
    }

    fn scenario() -> Vec<daily_bars::Model> {
        vec![
            bar("A.SH", d(23), 10.0, 10.0, 50_000.0),
            bar("A.SH", d(24), 10.5, 11.0, 60_000.0),
            bar("A.SH", d(25), 11.0, 9.0, 70_000.0),
            bar("B.SZ", d(23), 20.0, 22.0, 1_000_000.0),
            bar("B.SZ", d(24), 22.0, 22.0, 1_000_000.0),
            bar("B.SZ", d(25), 22.0, 22.0, 1_000_000.0),
        ]
    }

    fn changes_for(
        daily: &BTreeMap<String, DailyBreakdown>,
        code: &str,
    ) -> Vec<Option<f64>> {
        daily
            .values()
            .map(|day| {
                day.stocks
                    .iter()
                    .find(|s| s.code == code)
                    .and_then(|s| s.change)
            })
            .collect()
    }

    #[test]
    fn test_convention_a_scenario() {
        let (dates, daily, latest) =
            compute_daily_changes(&scenario(), &HashMap::new(), Convention::A, false);

        assert_eq!(dates, vec!["2024-09-23", "2024-09-24", "2024-09-25"]);
        assert!(latest.is_none());
        assert_eq!(changes_for(&daily, "A.SH"), vec![Some(0.0), Some(10.0), Some(-10.0)]);
        assert_eq!(changes_for(&daily, "B.SZ"), vec![Some(10.0), Some(10.0), Some(10.0)]);

        let first_day: Vec<&str> = daily["2024-09-23"]
            .stocks
            .iter()
            .map(|s| s.code.as_str())
            .collect();
        assert_eq!(first_day, vec!["A.SH", "B.SZ"]);
    }

    #[test]
    fn test_convention_a_last_day_matches_first_open() {
        let (_, daily, _) = compute_daily_changes(&scenario(), &HashMap::new(), Convention::A, false);
        let last = daily.values().last().unwrap();
        let a = last.stocks.iter().find(|s| s.code == "A.SH").unwrap();
        assert_eq!(a.change, Some(round2((9.0 - 10.0) / 10.0 * 100.0)));
    }

    #[test]
    fn test_convention_b_first_day_is_intraday() {
        let bars = vec![
            bar("X.SH", d(23), 10.0, 10.5, 1.0),
            bar("X.SH", d(24), 10.8, 11.0, 1.0),
        ];
        let (_, daily, _) = compute_daily_changes(&bars, &HashMap::new(), Convention::B, false);

        // (10.5 - 10) / 10 on the first day, then rebased to the first open
        assert_eq!(changes_for(&daily, "X.SH"), vec![Some(5.0), Some(10.0)]);
    }

    #[test]
    fn test_conventions_differ_for_late_listing() {
        let bars = vec![
            bar("OLD.SH", d(23), 10.0, 10.0, 1.0),
            bar("OLD.SH", d(24), 10.0, 10.0, 1.0),
            bar("NEW.SH", d(24), 5.0, 6.0, 1.0),
        ];

        let (_, a, _) = compute_daily_changes(&bars, &HashMap::new(), Convention::A, false);
        let (_, b, _) = compute_daily_changes(&bars, &HashMap::new(), Convention::B, false);

        assert_eq!(a["2024-09-24"].stocks.iter().find(|s| s.code == "NEW.SH").unwrap().change, Some(20.0));
        assert_eq!(b["2024-09-24"].stocks.iter().find(|s| s.code == "NEW.SH").unwrap().change, None);
    }

    #[test]
    fn test_missing_anchor_is_ungraded_but_counted() {
        let mut bars = vec![
            bar("Z.SH", d(23), 0.0, 8.0, 200_000.0),
            bar("Y.SH", d(23), 10.0, 9.0, 100_000.0),
            bar("W.SH", d(23), 10.0, 12.0, 100_000.0),
        ];
        bars[0].open = Some(0.0);

        let (_, daily, _) = compute_daily_changes(&bars, &HashMap::new(), Convention::A, false);
        let day = &daily["2024-09-23"];

        let order: Vec<(&str, Option<f64>)> =
            day.stocks.iter().map(|s| (s.code.as_str(), s.change)).collect();
        assert_eq!(
            order,
            vec![("Z.SH", None), ("Y.SH", Some(-10.0)), ("W.SH", Some(20.0))]
        );

        // 400,000 thousands = 40,000 ten-thousands
        assert_eq!(day.total_amount, 40000.0);
        assert_eq!(day.total_amount_str, "4.00亿");
    }

    #[test]
    fn test_sorting_is_non_decreasing() {
        let bars: Vec<daily_bars::Model> = (0..20)
            .map(|i| bar(&format!("{:06}.SZ", i), d(23), 10.0, 10.0 + ((i * 7) % 11) as f64 - 5.0, 1.0))
            .collect();
        let (_, daily, _) = compute_daily_changes(&bars, &HashMap::new(), Convention::A, false);

        let changes: Vec<f64> = daily["2024-09-23"]
            .stocks
            .iter()
            .map(|s| s.change.unwrap())
            .collect();
        assert!(changes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_small_totals_use_ten_thousand_label() {
        let bars = vec![bar("A.SH", d(23), 10.0, 10.0, 12_345.0)];
        let (_, daily, _) = compute_daily_changes(&bars, &HashMap::new(), Convention::A, false);
        let day = &daily["2024-09-23"];
        assert_eq!(day.total_amount, 1234.5);
        assert_eq!(day.total_amount_str, "1234.50万");
        assert_eq!(day.stocks[0].amount_str, "1234.50万");
    }

    #[test]
    fn test_snapshot_lists_latest_date_only() {
        let mut names = HashMap::new();
        names.insert("A.SH".to_string(), "Alpha".to_string());

        let (_, _, latest) = compute_daily_changes(&scenario(), &names, Convention::A, true);
        let latest = latest.unwrap();

        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].code, "A.SH");
        assert_eq!(latest[0].name, "Alpha");
        assert_eq!(latest[0].change, Some(-10.0));
        assert_eq!(latest[0].close, Some(9.0));
        assert_eq!(latest[0].latest_change, Some(1.23));
        // 70,000 thousands = 0.7 hundred-millions
        assert_eq!(latest[0].latest_amount, 0.7);
        assert_eq!(latest[1].name, "B.SZ");
    }

    #[test]
    fn test_empty_input() {
        let (dates, daily, latest) = compute_daily_changes(&[], &HashMap::new(), Convention::B, true);
        assert!(dates.is_empty());
        assert!(daily.is_empty());
        assert_eq!(latest, Some(Vec::new()));
    }
}
