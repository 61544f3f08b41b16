//! Data structures passed between the components of the daemon.
//!
//! The persisted record and the remote reference share the same JSON shape;
//! everything else here lives for one cycle or for the process lifetime.
//! Serialised forms use camelCase so the status file and change events
//! match the record file's `lastUpdated`/`updatedBy` keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The address this process considers authoritative.
///
/// Stored on disk as a JSON object whose address key is configurable
/// (`record_key`), so (de)serialisation goes through [`crate::store`]
/// rather than a derive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub address: String,
    pub last_updated: DateTime<Utc>,
    pub updated_by: String,
}

impl AddressRecord {
    pub fn new(address: impl Into<String>, updated_by: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            last_updated: Utc::now(),
            updated_by: updated_by.into(),
        }
    }
}

/// One validated public address, tagged with the strategy that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub address: String,
    pub method: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationDecision {
    pub needs_update: bool,
    pub local_address: String,
    pub public_address: String,
    pub remote_address: String,
    /// The remote was unavailable and `local_address` stood in for it.
    pub degraded: bool,
}

/// Payload handed to the notifier when the address changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub old_address: Option<String>,
    pub new_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "reason")]
pub enum RollbackStatus {
    /// The unpublished commit was reverted.
    Attempted,
    Failed(String),
}

/// Result of one run of the publish workflow. Never an error: failures
/// are reported through `success = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackStatus>,
}

impl PublishOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            rollback: None,
        }
    }

    pub fn failed(message: impl Into<String>, rollback: Option<RollbackStatus>) -> Self {
        Self {
            success: false,
            message: message.into(),
            rollback,
        }
    }
}

/// What a single trigger of the orchestrator ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoChange,
    Updated { published: bool },
    /// Another cycle was in flight, or the orchestrator is not running.
    Skipped,
    Failed(String),
}
