use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BalanceSheets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BalanceSheets::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BalanceSheets::Code).string_len(16).not_null())
                    .col(ColumnDef::new(BalanceSheets::AnnDate).date().null())
                    .col(ColumnDef::new(BalanceSheets::EndDate).date().not_null())
                    .col(ColumnDef::new(BalanceSheets::TotalAssets).double().null())
                    .col(ColumnDef::new(BalanceSheets::TotalLiab).double().null())
                    .col(ColumnDef::new(BalanceSheets::TotalEquity).double().null())
                    .col(
                        ColumnDef::new(BalanceSheets::UpdatedAt)
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
                    .name("idx_balance_sheets_code_period")
                    .table(BalanceSheets::Table)
                    .col(BalanceSheets::Code)
                    .col(BalanceSheets::EndDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IncomeStatements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IncomeStatements::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IncomeStatements::Code).string_len(16).not_null())
                    .col(ColumnDef::new(IncomeStatements::AnnDate).date().null())
                    .col(ColumnDef::new(IncomeStatements::EndDate).date().not_null())
                    .col(ColumnDef::new(IncomeStatements::TotalRevenue).double().null())
                    .col(ColumnDef::new(IncomeStatements::OperateProfit).double().null())
                    .col(ColumnDef::new(IncomeStatements::NetIncome).double().null())
                    .col(
                        ColumnDef::new(IncomeStatements::UpdatedAt)
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
                    .name("idx_income_statements_code_period")
                    .table(IncomeStatements::Table)
                    .col(IncomeStatements::Code)
                    .col(IncomeStatements::EndDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FinancialIndicators::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FinancialIndicators::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FinancialIndicators::Code).string_len(16).not_null())
                    .col(ColumnDef::new(FinancialIndicators::AnnDate).date().null())
                    .col(ColumnDef::new(FinancialIndicators::EndDate).date().not_null())
                    .col(ColumnDef::new(FinancialIndicators::GrossMargin).double().null())
                    .col(ColumnDef::new(FinancialIndicators::DebtToAssets).double().null())
                    .col(
                        ColumnDef::new(FinancialIndicators::UpdatedAt)
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
                    .name("idx_financial_indicators_code_period")
                    .table(FinancialIndicators::Table)
                    .col(FinancialIndicators::Code)
                    .col(FinancialIndicators::EndDate)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FinancialIndicators::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IncomeStatements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BalanceSheets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BalanceSheets {
    Table,
    Id,
    Code,
    AnnDate,
    EndDate,
    TotalAssets,
    TotalLiab,
    TotalEquity,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum IncomeStatements {
    Table,
    Id,
    Code,
    AnnDate,
    EndDate,
    TotalRevenue,
    OperateProfit,
    NetIncome,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum FinancialIndicators {
    Table,
    Id,
    Code,
    AnnDate,
    EndDate,
    GrossMargin,
    DebtToAssets,
    UpdatedAt,
}
