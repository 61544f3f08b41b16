//! Error taxonomy shared by the cycle components.
//!
//! Detection and remote failures are absorbed where they happen; store and
//! version-control failures end the current cycle; startup failures keep the
//! daemon from running at all.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a single detection strategy gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub method: String,
    pub reason: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.method, self.reason)
    }
}

#[derive(Debug, Clone, Error)]
pub enum StrategyError {
    #[error("invalid address format: {0:?}")]
    InvalidAddressFormat(String),
    #[error("lookup failed: {0}")]
    Lookup(String),
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("all detection methods exhausted: [{}]", join(.0))]
    AllMethodsExhausted(Vec<StrategyFailure>),
}

fn join(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed record in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no remote reference configured")]
    NotConfigured,
    #[error("remote request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote reference malformed: {0}")]
    Malformed(String),
}

/// One of the external version-control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsStep {
    Check,
    FetchLatest,
    Status,
    Stage,
    Commit,
    Publish,
    RevertLast,
}

impl fmt::Display for VcsStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VcsStep::Check => "check",
            VcsStep::FetchLatest => "fetch-latest",
            VcsStep::Status => "status",
            VcsStep::Stage => "stage",
            VcsStep::Commit => "commit",
            VcsStep::Publish => "publish",
            VcsStep::RevertLast => "revert-last",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
#[error("version control step `{step}` failed: {cause}")]
pub struct VcsError {
    pub step: VcsStep,
    pub cause: String,
}

impl VcsError {
    pub fn new(step: VcsStep, cause: impl Into<String>) -> Self {
        Self {
            step,
            cause: cause.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("orchestrator already started")]
    AlreadyStarted,
    #[error("detection is not operable: {0}")]
    Detection(#[from] DetectionError),
    #[error("persistence is not operable: {0}")]
    Persistence(#[from] VcsError),
    #[error("failed to seed local record: {0}")]
    Seed(#[from] StoreError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("too many manual triggers, try again later")]
    RateLimited,
}
