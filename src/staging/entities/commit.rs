//! `commits` table. Uniqueness on `(repo_id, sha)`. `processed_at`
//! is set by the graph builder in the same transaction as the
//! corresponding graph write; resets to `null` when `parent_shas_hash`
//! changes, so a detected force-push reprocesses the commit.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "commits")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub repo_id: i64,
    #[sea_orm(unique)]
    pub sha: String,
    pub author_email: String,
    pub author_date: DateTimeUtc,
    pub message: String,
    pub additions: i32,
    pub deletions: i32,
    pub files_changed: i32,
    pub parent_shas: Json,
    pub topological_index: Option<i64>,
    pub raw_data: Json,
    pub fetched_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
    pub diff_chunks_processed: i32,
    pub diff_chunks_skipped: i32,
    pub diff_truncation_reason: Option<String>,
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
