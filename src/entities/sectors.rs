//! `SeaORM` Entity for sectors table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "UPPERCASE")]
pub enum SectorType {
    /// Membership mirrors a published index; never deleted
    #[sea_orm(string_value = "INDEX")]
    Index,
    #[sea_orm(string_value = "CUSTOM")]
    Custom,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "sectors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub sector_type: SectorType,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sector_stocks::Entity")]
    SectorStocks,
}

impl Related<super::sector_stocks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SectorStocks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
