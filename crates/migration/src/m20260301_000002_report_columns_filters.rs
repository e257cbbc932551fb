use sea_orm_migration::prelude::*;

use crate::m20260301_000001_report_definitions::ReportDefinitions;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum ReportColumns {
    Table,
    Id,
    ReportId,
    FieldName,
    DisplayName,
    DataType,
    Alignment,
    Width,
    SortOrder,
    IsActive,
}

#[derive(Iden)]
enum ReportFilters {
    Table,
    Id,
    ReportId,
    FieldName,
    Label,
    FilterType,
    Condition,
    OptionsSource,
    Options,
    SortOrder,
    IsActive,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReportColumns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReportColumns::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReportColumns::ReportId).integer().not_null())
                    .col(ColumnDef::new(ReportColumns::FieldName).string().not_null())
                    .col(ColumnDef::new(ReportColumns::DisplayName).string().not_null())
                    .col(
                        ColumnDef::new(ReportColumns::DataType)
                            .string()
                            .not_null()
                            .default("string"),
                    )
                    .col(
                        ColumnDef::new(ReportColumns::Alignment)
                            .string()
                            .not_null()
                            .default("left"),
                    )
                    .col(
                        ColumnDef::new(ReportColumns::Width)
                            .integer()
                            .not_null()
                            .default(100),
                    )
                    .col(
                        ColumnDef::new(ReportColumns::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ReportColumns::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-report_columns-report_id")
                            .from(ReportColumns::Table, ReportColumns::ReportId)
                            .to(ReportDefinitions::Table, ReportDefinitions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-report_columns-report_id-sort_order")
                    .table(ReportColumns::Table)
                    .col(ReportColumns::ReportId)
                    .col(ReportColumns::SortOrder)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReportFilters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReportFilters::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReportFilters::ReportId).integer().not_null())
                    .col(ColumnDef::new(ReportFilters::FieldName).string().not_null())
                    .col(
                        ColumnDef::new(ReportFilters::Label)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(ReportFilters::FilterType).string().not_null())
                    .col(ColumnDef::new(ReportFilters::Condition).text().not_null())
                    .col(
                        ColumnDef::new(ReportFilters::OptionsSource)
                            .string()
                            .not_null()
                            .default("none"),
                    )
                    .col(ColumnDef::new(ReportFilters::Options).text())
                    .col(
                        ColumnDef::new(ReportFilters::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ReportFilters::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-report_filters-report_id")
                            .from(ReportFilters::Table, ReportFilters::ReportId)
                            .to(ReportDefinitions::Table, ReportDefinitions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-report_filters-report_id-sort_order")
                    .table(ReportFilters::Table)
                    .col(ReportFilters::ReportId)
                    .col(ReportFilters::SortOrder)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReportFilters::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ReportColumns::Table).to_owned())
            .await?;
        Ok(())
    }
}
