//! Storage model of a report definition (`report_definitions` table).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "report_definitions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub base_query: String,
    pub calculation: Option<String>,
    pub sheet_name: Option<String>,
    pub category: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub is_public: bool,
    pub required_permission: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::report_columns::Entity")]
    Columns,
    #[sea_orm(has_many = "super::report_filters::Entity")]
    Filters,
}

impl Related<super::report_columns::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Columns.def()
    }
}

impl Related<super::report_filters::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Filters.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
