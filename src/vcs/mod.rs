use async_trait::async_trait;

use crate::error::VcsError;

pub mod git;
pub use git::GitCli;

/// Operations the publish workflow needs from the version-control tool.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Cheap probe that the tool runs and the working tree exists.
    async fn check(&self) -> Result<(), VcsError>;

    async fn fetch_latest(&self) -> Result<(), VcsError>;

    /// Whether the working tree has uncommitted changes.
    async fn is_dirty(&self) -> Result<bool, VcsError>;

    /// Stage `paths`, or every change when `paths` is empty.
    async fn stage(&self, paths: &[String]) -> Result<(), VcsError>;

    async fn commit(&self, message: &str) -> Result<(), VcsError>;

    async fn publish(&self) -> Result<(), VcsError>;

    /// Undo the last local commit, keeping its changes in the tree.
    async fn revert_last(&self) -> Result<(), VcsError>;
}
