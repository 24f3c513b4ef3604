//! `SeaORM` Entity for tenants table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    #[sea_orm(unique)]
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::upload_destinations::Entity")]
    UploadDestinations,
}

impl Related<super::upload_destinations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UploadDestinations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
