//! Instrument reference data: code normalization, free-text resolution and
//! the wholesale basic-info refresh.

use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use crate::entities::{instruments, prelude::*};
use crate::error::AppError;
use crate::services::provider::MarketDataProvider;

lazy_static! {
    static ref CANONICAL_CODE: Regex = Regex::new(r"^(\d{6})\.(SH|SZ|BJ)$").unwrap();
    static ref PREFIXED_CODE: Regex = Regex::new(r"^(SH|SZ|BJ)\.(\d{6})$").unwrap();
    static ref BARE_CODE: Regex = Regex::new(r"^\d{6}$").unwrap();
}

/// Separators accepted in a pasted stock list
const TOKEN_SEPARATORS: &[char] = &[',', '，', '#', '\n', '\r', ';', '；'];

/// Bring a user- or provider-supplied code into `<digits>.<EX>` form.
///
/// Accepts `600000.SH`, `600000.sh`, `sh.600000` and bare `600000`
/// (exchange inferred from the leading digit). Returns `None` for anything
/// that is not a six-digit code.
pub fn normalize_code(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();

    if CANONICAL_CODE.is_match(&upper) {
        return Some(upper);
    }

    if let Some(caps) = PREFIXED_CODE.captures(&upper) {
        return Some(format!("{}.{}", &caps[2], &caps[1]));
    }

    if BARE_CODE.is_match(&upper) {
        let exchange = match upper.as_bytes()[0] {
            b'6' => "SH",
            b'0' | b'3' => "SZ",
            b'4' | b'8' | b'9' => "BJ",
            _ => return None,
        };
        return Some(format!("{}.{}", upper, exchange));
    }

    None
}

/// Codes whose first digit marks a non-equity or delisting-board class
pub fn is_excluded_class(code: &str) -> bool {
    matches!(code.as_bytes().first(), Some(b'4' | b'8' | b'9'))
}

/// Split a pasted stock list into trimmed, non-empty tokens
pub fn split_tokens(input: &str) -> Vec<String> {
    input
        .split(TOKEN_SEPARATORS)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Outcome of resolving free-text tokens against the instrument table
#[derive(Debug, Default, Clone, Serialize)]
pub struct Resolution {
    /// Canonical codes in input order, duplicates collapsed
    pub codes: Vec<String>,
    pub unmatched: Vec<String>,
}

/// Resolve tokens by exact code, normalized code, then exact display name.
/// Unmatched tokens are reported but never fail the call.
pub async fn resolve_tokens<C: ConnectionTrait>(
    db: &C,
    tokens: &[String],
) -> Result<Resolution, AppError> {
    if tokens.is_empty() {
        return Ok(Resolution::default());
    }

    let mut candidates: HashSet<String> = tokens.iter().cloned().collect();
    candidates.extend(tokens.iter().filter_map(|t| normalize_code(t)));
    let candidates: Vec<String> = candidates.into_iter().collect();

    let rows = Instruments::find()
        .filter(
            instruments::Column::Code
                .is_in(candidates.clone())
                .or(instruments::Column::Name.is_in(candidates)),
        )
        .all(db)
        .await?;

    let by_code: HashSet<&str> = rows.iter().map(|r| r.code.as_str()).collect();
    let by_name: HashMap<&str, &str> = rows
        .iter()
        .map(|r| (r.name.as_str(), r.code.as_str()))
        .collect();

    let mut resolution = Resolution::default();
    let mut seen = HashSet::new();

    for token in tokens {
        let resolved = if by_code.contains(token.as_str()) {
            Some(token.clone())
        } else if let Some(code) = normalize_code(token).filter(|c| by_code.contains(c.as_str())) {
            Some(code)
        } else {
            by_name.get(token.as_str()).map(|c| c.to_string())
        };

        match resolved {
            Some(code) => {
                if seen.insert(code.clone()) {
                    resolution.codes.push(code);
                }
            }
            None => {
                warn!(token = %token, "Unmatched stock token dropped");
                resolution.unmatched.push(token.clone());
            }
        }
    }

    Ok(resolution)
}

/// Display names for a set of codes; missing codes are simply absent
pub async fn names_for<C: ConnectionTrait>(
    db: &C,
    codes: &[String],
) -> Result<HashMap<String, String>, AppError> {
    if codes.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = Instruments::find()
        .filter(instruments::Column::Code.is_in(codes.to_vec()))
        .all(db)
        .await?;

    Ok(rows.into_iter().map(|r| (r.code, r.name)).collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentRefreshReport {
    pub count: usize,
}

/// Replace the instrument table wholesale with the provider's current list.
pub async fn refresh_instruments(
    db: &DatabaseConnection,
    provider: &dyn MarketDataProvider,
) -> Result<InstrumentRefreshReport, AppError> {
    let records = provider.fetch_instruments().await?;

    if records.is_empty() {
        // Never wipe reference data on an empty upstream answer
        return Err(AppError::Validation(
            "provider returned no instruments; keeping existing list".to_string(),
        ));
    }

    let now = Utc::now().naive_utc();
    let mut seen = HashSet::new();
    let models: Vec<instruments::ActiveModel> = records
        .into_iter()
        .filter_map(|r| {
            let code = normalize_code(&r.ts_code)?;
            seen.insert(code.clone()).then(|| instruments::ActiveModel {
                code: Set(code),
                name: Set(r.name),
                list_status: Set(r.list_status),
                list_date: Set(r.list_date),
                updated_at: Set(now),
            })
        })
        .collect();
    let count = models.len();

    let txn = db.begin().await?;
    Instruments::delete_many().exec(&txn).await?;
    for chunk in models.chunks(500) {
        Instruments::insert_many(chunk.to_vec()).exec_without_returning(&txn).await?;
    }
    txn.commit().await?;

    info!(count, "Instrument list refreshed");
    Ok(InstrumentRefreshReport { count })
}

/// Look up one instrument by any accepted code form
pub async fn find_instrument<C: ConnectionTrait>(
    db: &C,
    raw_code: &str,
) -> Result<instruments::Model, AppError> {
    let code = normalize_code(raw_code)
        .ok_or_else(|| AppError::Validation(format!("invalid stock code: {}", raw_code)))?;

    Instruments::find_by_id(code.clone())
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("stock {} not found", code)))
}

/// Insert or rename a single instrument (used by repair tooling and tests)
pub async fn upsert_instrument<C: ConnectionTrait>(
    db: &C,
    code: &str,
    name: &str,
) -> Result<instruments::Model, AppError> {
    let now = Utc::now().naive_utc();
    let model = match Instruments::find_by_id(code.to_string()).one(db).await? {
        Some(existing) => {
            let mut active: instruments::ActiveModel = existing.into();
            active.name = Set(name.to_string());
            active.updated_at = Set(now);
            active.update(db).await?
        }
        None => {
            instruments::ActiveModel {
                code: Set(code.to_string()),
                name: Set(name.to_string()),
                list_status: Set(Some("L".to_string())),
                list_date: Set(None),
                updated_at: Set(now),
            }
            .insert(db)
            .await?
        }
    };
    Ok(model)
}
