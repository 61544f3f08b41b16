//! [`VersionControl`] backed by the `git` command line.
//!
//! Every operation is a separate subprocess bounded by the configured
//! per-call timeout. The child is killed if the timeout fires.
//!
//! The record in the working tree is authoritative. When pulling would merge
//! upstream edits into it, the local version is put back and the pull is
//! reported as failed so the caller retries on top of the new upstream.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::Command;
use tokio::time::timeout;

use super::VersionControl;
use crate::error::{VcsError, VcsStep};

pub struct GitCli {
    binary: String,
    repo_dir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(binary: impl Into<String>, repo_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            repo_dir: repo_dir.into(),
            timeout,
        }
    }

    async fn run(&self, step: VcsStep, args: &[&str]) -> Result<String, VcsError> {
        debug!("{} {}", self.binary, args.join(" "));
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-C")
            .arg(&self.repo_dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| VcsError::new(step, format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| VcsError::new(step, format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = match stderr.trim() {
                "" => String::from_utf8_lossy(&output.stdout).trim().to_string(),
                s => s.to_string(),
            };
            return Err(VcsError::new(
                step,
                format!("exited with {}: {}", output.status, detail),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Current `refs/stash`, `None` when the stash is empty.
    async fn stash_head(&self) -> Option<String> {
        self.run(
            VcsStep::FetchLatest,
            &["rev-parse", "-q", "--verify", "refs/stash"],
        )
        .await
        .ok()
        .map(|out| out.trim().to_string())
    }

    /// Checks out the files held by the top stash entry, then drops it.
    /// Returns the restored paths.
    async fn restore_autostash(&self) -> Result<Vec<String>, VcsError> {
        let listed = self
            .run(
                VcsStep::FetchLatest,
                &["stash", "show", "--name-only", "stash@{0}"],
            )
            .await?;
        let paths: Vec<String> = listed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if !paths.is_empty() {
            // stash paths are relative to the top of the work tree
            let specs: Vec<String> = paths.iter().map(|p| format!(":(top){}", p)).collect();
            let mut args = vec!["checkout", "stash@{0}", "--"];
            args.extend(specs.iter().map(String::as_str));
            self.run(VcsStep::FetchLatest, &args).await?;
        }
        self.run(VcsStep::FetchLatest, &["stash", "drop", "-q", "stash@{0}"])
            .await?;
        Ok(paths)
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn check(&self) -> Result<(), VcsError> {
        let out = self
            .run(VcsStep::Check, &["rev-parse", "--is-inside-work-tree"])
            .await?;
        if out.trim() == "true" {
            Ok(())
        } else {
            Err(VcsError::new(
                VcsStep::Check,
                format!("{} is not a work tree", self.repo_dir.display()),
            ))
        }
    }

    async fn fetch_latest(&self) -> Result<(), VcsError> {
        let stash_before = self.stash_head().await;

        let pulled = self
            .run(VcsStep::FetchLatest, &["pull", "--rebase", "--autostash"])
            .await;
        if let Err(e) = pulled {
            // a rebase stopped on conflicts leaves the tree mid-rebase
            if self
                .run(VcsStep::FetchLatest, &["rebase", "--abort"])
                .await
                .is_ok()
            {
                warn!("Aborted conflicting rebase in {}", self.repo_dir.display());
            }
            return Err(e);
        }

        // git keeps the autostash in refs/stash only when reapplying it conflicted
        let stash_after = self.stash_head().await;
        if stash_after.is_some() && stash_after != stash_before {
            let paths = self.restore_autostash().await?;
            warn!(
                "Upstream changes conflicted with {}, restored local version",
                paths.join(", ")
            );
            return Err(VcsError::new(
                VcsStep::FetchLatest,
                format!(
                    "local changes conflicted with upstream in {}",
                    paths.join(", ")
                ),
            ));
        }
        Ok(())
    }

    async fn is_dirty(&self) -> Result<bool, VcsError> {
        let out = self.run(VcsStep::Status, &["status", "--porcelain"]).await?;
        Ok(!out.trim().is_empty())
    }

    async fn stage(&self, paths: &[String]) -> Result<(), VcsError> {
        let mut args = vec!["add"];
        if paths.is_empty() {
            args.push("-A");
        } else {
            args.push("--");
            args.extend(paths.iter().map(String::as_str));
        }
        self.run(VcsStep::Stage, &args).await.map(drop)
    }

    async fn commit(&self, message: &str) -> Result<(), VcsError> {
        self.run(VcsStep::Commit, &["commit", "-m", message])
            .await
            .map(drop)
    }

    async fn publish(&self) -> Result<(), VcsError> {
        self.run(VcsStep::Publish, &["push"]).await.map(drop)
    }

    async fn revert_last(&self) -> Result<(), VcsError> {
        self.run(VcsStep::RevertLast, &["reset", "--soft", "HEAD~1"])
            .await
            .map(drop)
    }
}
