//! Money-flow views for a single stock.
//!
//! `simulate_money_flow` is a PLACEHOLDER: it splits traded value into
//! buy/sell buckets with random jitter and carries no order-flow
//! information. Responses mark it with `source: "simulated"`. The real
//! tiered figures come from the provider via `fetch_money_flow`.

use chrono::{Duration as ChronoDuration, NaiveDate};
use rand::Rng;
use serde::Serialize;

use crate::error::AppError;
use crate::services::provider::{MarketDataProvider, MoneyFlowRecord};
use crate::services::units::round2;

pub const SIMULATED_SOURCE: &str = "simulated";
pub const PROVIDER_SOURCE: &str = "provider";

const BASE_FRACTION: f64 = 0.01;
/// Extra-large orders: base x [0.8, 1.2)
const EXTRA_LARGE_RANGE: (f64, f64) = (0.8, 0.4);
/// Large orders: base x [0.6, 1.0)
const LARGE_RANGE: (f64, f64) = (0.6, 0.4);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedFlowDay {
    pub date: String,
    pub extra_large_in: f64,
    pub extra_large_out: f64,
    pub extra_large_net: f64,
    pub large_in: f64,
    pub large_out: f64,
    pub large_net: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulatedMoneyFlow {
    /// Always "simulated"
    pub source: &'static str,
    pub note: &'static str,
    pub days: Vec<SimulatedFlowDay>,
}

fn jitter<R: Rng>(rng: &mut R, base: f64, (floor, spread): (f64, f64)) -> f64 {
    base * rng.gen_range(floor..floor + spread)
}

/// Synthetic buckets from (date, traded value in yuan) pairs
pub fn simulate_money_flow<R: Rng>(days: &[(String, f64)], rng: &mut R) -> SimulatedMoneyFlow {
    let days = days
        .iter()
        .map(|(date, amount)| {
            let base = amount * BASE_FRACTION;
            let extra_large_in = jitter(rng, base, EXTRA_LARGE_RANGE);
            let extra_large_out = jitter(rng, base, EXTRA_LARGE_RANGE);
            let large_in = jitter(rng, base, LARGE_RANGE);
            let large_out = jitter(rng, base, LARGE_RANGE);

            SimulatedFlowDay {
                date: date.clone(),
                extra_large_in: round2(extra_large_in),
                extra_large_out: round2(extra_large_out),
                extra_large_net: round2(extra_large_in - extra_large_out),
                large_in: round2(large_in),
                large_out: round2(large_out),
                large_net: round2(large_in - large_out),
            }
        })
        .collect();

    SimulatedMoneyFlow {
        source: SIMULATED_SOURCE,
        note: "randomly generated from traded value; not derived from order flow",
        days,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowTier {
    pub buy: f64,
    pub sell: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderFlowDay {
    pub date: String,
    pub small: FlowTier,
    pub medium: FlowTier,
    pub large: FlowTier,
    pub extra_large: FlowTier,
    pub net: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderMoneyFlow {
    pub code: String,
    pub source: &'static str,
    /// Ten-thousands
    pub unit: &'static str,
    pub days: Vec<ProviderFlowDay>,
}

fn tier(buy: Option<f64>, sell: Option<f64>) -> FlowTier {
    let buy = buy.unwrap_or(0.0);
    let sell = sell.unwrap_or(0.0);
    FlowTier {
        buy: round2(buy),
        sell: round2(sell),
        net: round2(buy - sell),
    }
}

pub fn to_flow_day(r: &MoneyFlowRecord) -> ProviderFlowDay {
    let small = tier(r.buy_sm_amount, r.sell_sm_amount);
    let medium = tier(r.buy_md_amount, r.sell_md_amount);
    let large = tier(r.buy_lg_amount, r.sell_lg_amount);
    let extra_large = tier(r.buy_elg_amount, r.sell_elg_amount);
    let net = r
        .net_mf_amount
        .unwrap_or(small.net + medium.net + large.net + extra_large.net);

    ProviderFlowDay {
        date: r.trade_date.format("%Y-%m-%d").to_string(),
        small,
        medium,
        large,
        extra_large,
        net: round2(net),
    }
}

/// Provider order-size tiers over the trailing `lookback_days`
pub async fn fetch_money_flow(
    provider: &dyn MarketDataProvider,
    code: &str,
    today: NaiveDate,
    lookback_days: i64,
) -> Result<ProviderMoneyFlow, AppError> {
    let start = today - ChronoDuration::days(lookback_days);
    let records = provider.fetch_money_flow(code, start, today).await?;

    Ok(ProviderMoneyFlow {
        code: code.to_string(),
        source: PROVIDER_SOURCE,
        unit: "wan",
        days: records.iter().map(to_flow_day).collect(),
    })
}
