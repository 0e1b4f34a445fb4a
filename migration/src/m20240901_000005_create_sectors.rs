use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Built-in index sectors: (code, name)
const INDEX_SECTORS: [(&str, &str); 3] = [
    ("SZ50", "SSE 50"),
    ("HS300", "CSI 300"),
    ("ZZ500", "CSI 500"),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sectors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sectors::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Sectors::Code)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Sectors::Name).string().not_null())
                    .col(
                        ColumnDef::new(Sectors::SectorType)
                            .string_len(16)
                            .not_null()
                            .default("CUSTOM"),
                    )
                    .col(
                        ColumnDef::new(Sectors::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SectorStocks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SectorStocks::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SectorStocks::SectorId).integer().not_null())
                    .col(ColumnDef::new(SectorStocks::Code).string_len(16).not_null())
                    .col(
                        ColumnDef::new(SectorStocks::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sector_stocks_sector")
                            .from(SectorStocks::Table, SectorStocks::SectorId)
                            .to(Sectors::Table, Sectors::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sector_stocks_unique")
                    .table(SectorStocks::Table)
                    .col(SectorStocks::SectorId)
                    .col(SectorStocks::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sector_stocks_code")
                    .table(SectorStocks::Table)
                    .col(SectorStocks::Code)
                    .to_owned(),
            )
            .await?;

        let mut seed = Query::insert();
        seed.into_table(Sectors::Table)
            .columns([Sectors::Code, Sectors::Name, Sectors::SectorType]);
        for (code, name) in INDEX_SECTORS {
            seed.values_panic([code.into(), name.into(), "INDEX".into()]);
        }
        manager.exec_stmt(seed).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SectorStocks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sectors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Sectors {
    Table,
    Id,
    Code,
    Name,
    SectorType,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum SectorStocks {
    Table,
    Id,
    SectorId,
    Code,
    UpdatedAt,
}
