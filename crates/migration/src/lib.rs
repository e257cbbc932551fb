pub use sea_orm_migration::prelude::*;

mod m20260301_000001_report_definitions;
mod m20260301_000002_report_columns_filters;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_report_definitions::Migration),
            Box::new(m20260301_000002_report_columns_filters::Migration),
        ]
    }
}
