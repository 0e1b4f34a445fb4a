use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DailyBars::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DailyBars::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DailyBars::Code).string_len(16).not_null())
                    .col(ColumnDef::new(DailyBars::TradeDate).date().not_null())
                    .col(ColumnDef::new(DailyBars::Open).double().null())
                    .col(ColumnDef::new(DailyBars::High).double().null())
                    .col(ColumnDef::new(DailyBars::Low).double().null())
                    .col(ColumnDef::new(DailyBars::Close).double().null())
                    .col(ColumnDef::new(DailyBars::PreClose).double().null())
                    .col(ColumnDef::new(DailyBars::Change).double().null())
                    .col(ColumnDef::new(DailyBars::PctChg).double().null())
                    .col(ColumnDef::new(DailyBars::Vol).double().null())
                    // Provider minor unit (thousands)
                    .col(ColumnDef::new(DailyBars::Amount).double().null())
                    .to_owned(),
            )
            .await?;

        // Upsert key
        manager
            .create_index(
                Index::create()
                    .name("idx_daily_bars_code_date")
                    .table(DailyBars::Table)
                    .col(DailyBars::Code)
                    .col(DailyBars::TradeDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_daily_bars_date")
                    .table(DailyBars::Table)
                    .col(DailyBars::TradeDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DailyBars::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DailyBars {
    Table,
    Id,
    Code,
    TradeDate,
    Open,
    High,
    Low,
    Close,
    PreClose,
    Change,
    PctChg,
    Vol,
    Amount,
}
