//! `code_blocks` table. Uniqueness on
//! `(repo_id, canonical_file_path, block_name, signature, block_type)` —
//! the composite key that disambiguates overloads.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "code_blocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub repo_id: i64,
    pub canonical_file_path: String,
    pub block_name: String,
    pub signature: String,
    pub block_type: String,
    pub historical_block_names: Json,
    pub risk_score: f64,
    pub incident_count: i32,
    pub churn: i32,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::repository::Entity",
        from = "Column::RepoId",
        to = "super::repository::Column::Id"
    )]
    Repository,
}

impl Related<super::repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repository.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
