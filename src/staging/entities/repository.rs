//! `repositories` table: one row per tracked repository, holding
//! the force-push detection hash and the path of the local clone.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub owner: String,
    pub name: String,
    pub absolute_path: String,
    pub raw_data: Json,
    pub fetched_at: DateTimeUtc,
    pub parent_shas_hash: Option<String>,
    /// Set by the Consistency validator: `true` means the last sync's
    /// entity-count variance fell below the pass threshold.
    pub needs_sync: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::commit::Entity")]
    Commits,
    #[sea_orm(has_many = "super::issue::Entity")]
    Issues,
    #[sea_orm(has_many = "super::pull_request::Entity")]
    PullRequests,
    #[sea_orm(has_many = "super::file_identity::Entity")]
    FileIdentities,
    #[sea_orm(has_many = "super::code_block::Entity")]
    CodeBlocks,
}

impl Related<super::commit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Commits.def()
    }
}

impl Related<super::issue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Issues.def()
    }
}

impl Related<super::pull_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PullRequests.def()
    }
}

impl Related<super::file_identity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileIdentities.def()
    }
}

impl Related<super::code_block::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CodeBlocks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
