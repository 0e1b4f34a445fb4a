use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DailyIndicators::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DailyIndicators::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DailyIndicators::Code).string_len(16).not_null())
                    .col(ColumnDef::new(DailyIndicators::TradeDate).date().not_null())
                    .col(ColumnDef::new(DailyIndicators::Close).double().null())
                    .col(ColumnDef::new(DailyIndicators::TurnoverRate).double().null())
                    .col(ColumnDef::new(DailyIndicators::TurnoverRateF).double().null())
                    .col(ColumnDef::new(DailyIndicators::VolumeRatio).double().null())
                    .col(ColumnDef::new(DailyIndicators::Pe).double().null())
                    .col(ColumnDef::new(DailyIndicators::PeTtm).double().null())
                    .col(ColumnDef::new(DailyIndicators::Pb).double().null())
                    .col(ColumnDef::new(DailyIndicators::Ps).double().null())
                    .col(ColumnDef::new(DailyIndicators::PsTtm).double().null())
                    .col(ColumnDef::new(DailyIndicators::DvRatio).double().null())
                    .col(ColumnDef::new(DailyIndicators::DvTtm).double().null())
                    .col(ColumnDef::new(DailyIndicators::TotalShare).double().null())
                    .col(ColumnDef::new(DailyIndicators::FloatShare).double().null())
                    .col(ColumnDef::new(DailyIndicators::FreeShare).double().null())
                    .col(ColumnDef::new(DailyIndicators::TotalMv).double().null())
                    .col(ColumnDef::new(DailyIndicators::CircMv).double().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_daily_indicators_code_date")
                    .table(DailyIndicators::Table)
                    .col(DailyIndicators::Code)
                    .col(DailyIndicators::TradeDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_daily_indicators_date")
                    .table(DailyIndicators::Table)
                    .col(DailyIndicators::TradeDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DailyIndicators::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DailyIndicators {
    Table,
    Id,
    Code,
    TradeDate,
    Close,
    TurnoverRate,
    TurnoverRateF,
    VolumeRatio,
    Pe,
    PeTtm,
    Pb,
    Ps,
    PsTtm,
    DvRatio,
    DvTtm,
    TotalShare,
    FloatShare,
    FreeShare,
    TotalMv,
    CircMv,
}
