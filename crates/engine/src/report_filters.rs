//! Storage model of a report filter (`report_filters` table).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "report_filters")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub report_id: i32,
    pub field_name: String,
    pub label: String,
    pub filter_type: String,
    pub condition: String,
    pub options_source: String,
    pub options: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::report_definitions::Entity",
        from = "Column::ReportId",
        to = "super::report_definitions::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Report,
}

impl Related<super::report_definitions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Report.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
