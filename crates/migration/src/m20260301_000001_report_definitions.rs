use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
pub(crate) enum ReportDefinitions {
    Table,
    Id,
    Code,
    Name,
    Description,
    BaseQuery,
    Calculation,
    SheetName,
    Category,
    SortOrder,
    IsActive,
    IsPublic,
    RequiredPermission,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReportDefinitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReportDefinitions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReportDefinitions::Code).string().not_null())
                    .col(ColumnDef::new(ReportDefinitions::Name).string().not_null())
                    .col(ColumnDef::new(ReportDefinitions::Description).text())
                    .col(ColumnDef::new(ReportDefinitions::BaseQuery).text().not_null())
                    .col(ColumnDef::new(ReportDefinitions::Calculation).text())
                    .col(ColumnDef::new(ReportDefinitions::SheetName).string())
                    .col(ColumnDef::new(ReportDefinitions::Category).string())
                    .col(
                        ColumnDef::new(ReportDefinitions::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ReportDefinitions::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ReportDefinitions::IsPublic)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(ReportDefinitions::RequiredPermission).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-report_definitions-code-unique")
                    .table(ReportDefinitions::Table)
                    .col(ReportDefinitions::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReportDefinitions::Table).to_owned())
            .await
    }
}
