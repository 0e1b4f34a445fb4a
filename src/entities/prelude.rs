//! `SeaORM` Entity prelude

pub use super::balance_sheets::Entity as BalanceSheets;
pub use super::daily_bars::Entity as DailyBars;
pub use super::daily_indicators::Entity as DailyIndicators;
pub use super::financial_indicators::Entity as FinancialIndicators;
pub use super::income_statements::Entity as IncomeStatements;
pub use super::instruments::Entity as Instruments;
pub use super::sector_stocks::Entity as SectorStocks;
pub use super::sectors::Entity as Sectors;
pub use super::sync_status::Entity as SyncStatus;
