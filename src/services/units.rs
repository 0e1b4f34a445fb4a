//! Display-unit conversions for monetary fields.
//!
//! Stored values keep the provider's native unit per field; each helper here
//! converts one field exactly once, at serialization time.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Traded value is stored in thousands; ten-thousands = thousands / 10
const THOUSANDS_PER_WAN: Decimal = dec!(10);
/// Switch the label to hundred-millions at this many ten-thousands
const WAN_PER_YI: Decimal = dec!(10000);
const THOUSANDS_PER_YI: Decimal = dec!(100000);
const YUAN_PER_YI: Decimal = dec!(100000000);

pub const WAN_SUFFIX: &str = "万";
pub const YI_SUFFIX: &str = "亿";

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

fn to_f64_2dp(value: Decimal) -> f64 {
    value.round_dp(2).to_f64().unwrap_or(0.0)
}

/// Round a percentage or ratio to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Traded value (thousands) to ten-thousands
pub fn thousands_to_wan(amount: f64) -> Decimal {
    to_decimal(amount) / THOUSANDS_PER_WAN
}

/// "1.23亿" at or above 10,000 ten-thousands, otherwise "456.78万"
pub fn format_wan(wan: Decimal) -> String {
    if wan >= WAN_PER_YI {
        format!("{:.2}{}", (wan / WAN_PER_YI).round_dp(2), YI_SUFFIX)
    } else {
        format!("{:.2}{}", wan.round_dp(2), WAN_SUFFIX)
    }
}

pub fn wan_value(wan: Decimal) -> f64 {
    to_f64_2dp(wan)
}

/// Traded value (thousands) to hundred-millions
pub fn thousands_to_yi(amount: f64) -> f64 {
    to_f64_2dp(to_decimal(amount) / THOUSANDS_PER_YI)
}

/// Traded value (thousands) to yuan
pub fn thousands_to_yuan(amount: f64) -> f64 {
    amount * 1000.0
}

/// Statement figures (yuan) to hundred-millions
pub fn yuan_to_yi(value: f64) -> f64 {
    to_f64_2dp(to_decimal(value) / YUAN_PER_YI)
}

/// Market value (ten-thousands) to hundred-millions
pub fn wan_to_yi(value: f64) -> f64 {
    to_f64_2dp(to_decimal(value) / WAN_PER_YI)
}
