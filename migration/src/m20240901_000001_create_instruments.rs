use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reference data, replaced wholesale on every basic-info refresh
        manager
            .create_table(
                Table::create()
                    .table(Instruments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Instruments::Code)
                            .string_len(16)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Instruments::Name).string().not_null())
                    .col(ColumnDef::new(Instruments::ListStatus).string_len(4).null())
                    .col(ColumnDef::new(Instruments::ListDate).date().null())
                    .col(
                        ColumnDef::new(Instruments::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_instruments_name")
                    .table(Instruments::Table)
                    .col(Instruments::Name)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Instruments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Instruments {
    Table,
    Code,
    Name,
    ListStatus,
    ListDate,
    UpdatedAt,
}
