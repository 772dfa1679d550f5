pub mod code_block;
pub mod commit;
pub mod developer;
pub mod file_identity;
pub mod issue;
pub mod pull_request;
pub mod repository;
pub mod timeline_event;

pub mod prelude {
    pub use super::code_block::Entity as CodeBlock;
    pub use super::commit::Entity as Commit;
    pub use super::developer::Entity as Developer;
    pub use super::file_identity::Entity as FileIdentity;
    pub use super::issue::Entity as Issue;
    pub use super::pull_request::Entity as PullRequest;
    pub use super::repository::Entity as Repository;
    pub use super::timeline_event::Entity as TimelineEvent;
}
