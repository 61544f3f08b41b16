//! Outcome history and the healthy/unhealthy state reported to monitors.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressChange {
    pub old: Option<String>,
    pub new: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthState {
    pub healthy: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_change: Option<AddressChange>,
    pub recent_errors: VecDeque<ErrorEntry>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: true,
            last_check_at: None,
            last_success_at: None,
            consecutive_failures: 0,
            last_change: None,
            recent_errors: VecDeque::new(),
        }
    }
}

#[derive(Debug)]
pub struct HealthTracker {
    threshold: u32,
    max_errors: usize,
    state: Mutex<HealthState>,
}

impl HealthTracker {
    pub fn new(threshold: u32, max_errors: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            max_errors: max_errors.max(1),
            state: Mutex::new(HealthState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HealthState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_check(&self, success: bool, error: Option<String>) {
        let now = Utc::now();
        let mut state = self.lock();
        state.last_check_at = Some(now);

        if success {
            state.last_success_at = Some(now);
            state.consecutive_failures = 0;
            state.recent_errors.clear();
            state.healthy = true;
            return;
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if let Some(message) = error {
            if state.recent_errors.len() >= self.max_errors {
                state.recent_errors.pop_front();
            }
            state.recent_errors.push_back(ErrorEntry { at: now, message });
        }
        if state.healthy && state.consecutive_failures >= self.threshold {
            warn!(
                "Marking unhealthy after {} consecutive failures",
                state.consecutive_failures
            );
            state.healthy = false;
        }
    }

    pub fn record_change(&self, old: Option<String>, new: String) {
        self.lock().last_change = Some(AddressChange {
            old,
            new,
            at: Utc::now(),
        });
    }

    pub fn snapshot(&self) -> HealthState {
        self.lock().clone()
    }
}
