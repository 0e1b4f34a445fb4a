pub use sea_orm_migration::prelude::*;

mod m20240901_000001_create_instruments;
mod m20240901_000002_create_daily_bars;
mod m20240901_000003_create_daily_indicators;
mod m20240901_000004_create_financial_statements;
mod m20240901_000005_create_sectors;
mod m20240901_000006_create_sync_status;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240901_000001_create_instruments::Migration),
            Box::new(m20240901_000002_create_daily_bars::Migration),
            Box::new(m20240901_000003_create_daily_indicators::Migration),
            Box::new(m20240901_000004_create_financial_statements::Migration),
            Box::new(m20240901_000005_create_sectors::Migration),
            Box::new(m20240901_000006_create_sync_status::Migration),
        ]
    }
}
