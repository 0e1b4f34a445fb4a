//! `SeaORM` Entity for sector_stocks table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "sector_stocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub sector_id: i32,
    pub code: String,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sectors::Entity",
        from = "Column::SectorId",
        to = "super::sectors::Column::Id",
        on_delete = "Cascade"
    )]
    Sectors,
}

impl Related<super::sectors::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sectors.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
