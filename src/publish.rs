//! Publishes a changed record through the version-control tool.
//!
//! fetch-latest → dirty check → stage → commit → publish, with the whole
//! sequence retried as a unit. A commit that was made but never published
//! is remembered across attempts so a retry does not try to commit twice,
//! and is soft-reverted once if every attempt fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use crate::error::VcsError;
use crate::types::{PublishOutcome, RollbackStatus};
use crate::util::{retry_with_backoff, sanitize_commit_message, RetryPolicy};
use crate::vcs::VersionControl;

pub struct PersistenceWorkflow {
    vcs: Option<Arc<dyn VersionControl>>,
    targets: Vec<String>,
    retry: RetryPolicy,
    max_message_len: usize,
}

enum Attempt {
    Published,
    NothingToCommit,
}

impl PersistenceWorkflow {
    pub fn new(
        vcs: Arc<dyn VersionControl>,
        targets: Vec<String>,
        retry: RetryPolicy,
        max_message_len: usize,
    ) -> Self {
        Self {
            vcs: Some(vcs),
            targets,
            retry,
            max_message_len,
        }
    }

    /// A workflow that only reports success; used when version control is
    /// turned off.
    pub fn disabled() -> Self {
        Self {
            vcs: None,
            targets: Vec::new(),
            retry: RetryPolicy::new(1, std::time::Duration::ZERO),
            max_message_len: 0,
        }
    }

    pub async fn check(&self) -> Result<(), VcsError> {
        match &self.vcs {
            Some(vcs) => vcs.check().await,
            None => Ok(()),
        }
    }

    pub fn commit_message(&self, new_address: &str, old_address: Option<&str>) -> String {
        let raw = format!(
            "Update public address from {} to {}",
            old_address.unwrap_or("none"),
            new_address
        );
        sanitize_commit_message(&raw, self.max_message_len)
    }

    pub async fn publish(&self, new_address: &str, old_address: Option<&str>) -> PublishOutcome {
        let Some(vcs) = &self.vcs else {
            return PublishOutcome::ok("version control disabled");
        };
        let vcs = vcs.as_ref();
        let message = self.commit_message(new_address, old_address);
        let committed = AtomicBool::new(false);

        let result = retry_with_backoff(&self.retry, "publish workflow", || {
            self.attempt(vcs, &message, &committed)
        })
        .await;

        match result {
            Ok(Attempt::Published) => {
                info!("Published address change: {}", message);
                PublishOutcome::ok(message)
            }
            Ok(Attempt::NothingToCommit) => {
                info!("Working tree clean, nothing to publish");
                PublishOutcome::ok("nothing to commit")
            }
            Err(e) if committed.load(Ordering::SeqCst) => {
                error!("Publish failed after commit: {}", e);
                let rollback = match vcs.revert_last().await {
                    Ok(()) => {
                        warn!("Rolled back unpublished commit");
                        RollbackStatus::Attempted
                    }
                    Err(re) => {
                        error!("Rollback failed: {}", re);
                        RollbackStatus::Failed(re.to_string())
                    }
                };
                PublishOutcome::failed(e.to_string(), Some(rollback))
            }
            Err(e) => {
                error!("Publish workflow failed: {}", e);
                PublishOutcome::failed(e.to_string(), None)
            }
        }
    }

    async fn attempt(
        &self,
        vcs: &dyn VersionControl,
        message: &str,
        committed: &AtomicBool,
    ) -> Result<Attempt, VcsError> {
        vcs.fetch_latest().await?;

        if !committed.load(Ordering::SeqCst) {
            if !vcs.is_dirty().await? && self.targets.is_empty() {
                return Ok(Attempt::NothingToCommit);
            }
            vcs.stage(&self.targets).await?;
            vcs.commit(message).await?;
            committed.store(true, Ordering::SeqCst);
        }

        vcs.publish().await?;
        Ok(Attempt::Published)
    }
}
