use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "watches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub query: String,
    /// Feed filter wire code ("0".."2"), absent for the feed default.
    pub filter: Option<String>,
    /// Feed category wire code ("0_0".."6_2"), absent for all categories.
    pub category: Option<String>,
    pub uploader: Option<String>,
    /// JSON array of already-reported info-hashes.
    #[sea_orm(column_type = "Text")]
    pub seen_hashes: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
