//! The polling loop.
//!
//! Each cycle reads the local record, detects the public address, fetches
//! the remote reference, reconciles the three and, when they disagree,
//! rewrites the record and publishes it. A [`DebounceGuard`] keeps cycles
//! from overlapping: a trigger that arrives while one is running is dropped.
//! Nothing a cycle does can fail the process; outcomes go to the
//! [`HealthTracker`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::Config;
use crate::detection::DetectionChain;
use crate::error::{RemoteError, StartupError, TriggerError};
use crate::health::{HealthState, HealthTracker};
use crate::notify::Notifier;
use crate::publish::PersistenceWorkflow;
use crate::reconcile::reconcile;
use crate::scheduler::{ScheduledTask, Scheduler, Tick};
use crate::store::{LocalStore, RemoteSource};
use crate::types::{AddressRecord, ChangeEvent, CycleOutcome, DetectionResult};
use crate::util::{DebounceGuard, RateLimiter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Validating,
    Running,
    Stopping,
    Stopped,
}

pub struct Orchestrator {
    detection: DetectionChain,
    store: LocalStore,
    remote: Arc<dyn RemoteSource>,
    workflow: PersistenceWorkflow,
    notifier: Arc<dyn Notifier>,
    scheduler: Arc<dyn Scheduler>,
    health: HealthTracker,
    guard: DebounceGuard,
    manual_limiter: RateLimiter,
    interval: Duration,
    updated_by: String,
    status_file: Option<PathBuf>,
    state: Mutex<OrchestratorState>,
    schedule: tokio::sync::Mutex<Option<ScheduledTask>>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        detection: DetectionChain,
        remote: Arc<dyn RemoteSource>,
        workflow: PersistenceWorkflow,
        notifier: Arc<dyn Notifier>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            detection,
            store: LocalStore::new(config.record_path(), config.record_key.clone()),
            remote,
            workflow,
            notifier,
            scheduler,
            health: HealthTracker::new(config.health_threshold, config.max_recent_errors),
            guard: DebounceGuard::new(),
            manual_limiter: RateLimiter::new(
                config.manual_trigger_limit,
                config.manual_trigger_window(),
            ),
            interval: config.check_interval(),
            updated_by: config.updated_by.clone(),
            status_file: config.status_file.clone(),
            state: Mutex::new(OrchestratorState::Idle),
            schedule: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: OrchestratorState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!("Orchestrator {:?} -> {:?}", *state, next);
        *state = next;
    }

    pub fn health(&self) -> HealthState {
        self.health.snapshot()
    }

    /// Validates the collaborators, seeds the local record if needed, runs
    /// one cycle and schedules the rest.
    pub async fn start(self: &Arc<Self>) -> Result<(), StartupError> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != OrchestratorState::Idle {
                return Err(StartupError::AlreadyStarted);
            }
            *state = OrchestratorState::Validating;
        }

        let detected = match self.validate().await {
            Ok(detected) => detected,
            Err(e) => {
                error!("Startup validation failed: {}", e);
                self.set_state(OrchestratorState::Stopped);
                return Err(e);
            }
        };

        // the first cycle reuses the address found while validating
        let outcome = self.run_guarded(Some(detected)).await;
        info!("Initial cycle finished: {:?}", outcome);

        self.set_state(OrchestratorState::Running);
        let tick: Tick = {
            let this = Arc::clone(self);
            Arc::new(move || {
                let this = Arc::clone(&this);
                tokio::spawn(async move {
                    this.trigger().await;
                });
            })
        };
        *self.schedule.lock().await = Some(self.scheduler.schedule(self.interval, tick));
        info!("Checking every {:?}", self.interval);
        Ok(())
    }

    async fn validate(&self) -> Result<DetectionResult, StartupError> {
        let detected = self.detection.detect().await?;
        self.workflow.check().await?;

        if self.store.load().await?.is_none() {
            info!(
                "Seeding {} with {}",
                self.store.path().display(),
                detected.address
            );
            self.store
                .save(&AddressRecord::new(
                    detected.address.clone(),
                    self.updated_by.clone(),
                ))
                .await?;
        }
        Ok(detected)
    }

    /// Stops scheduling new cycles and waits for an in-flight one to end.
    pub async fn stop(&self, reason: &str) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                OrchestratorState::Stopping | OrchestratorState::Stopped => return,
                _ => *state = OrchestratorState::Stopping,
            }
        }
        info!("Stopping: {}", reason);

        if let Some(task) = self.schedule.lock().await.take() {
            task.cancel().await;
        }
        if self.guard.is_busy() {
            info!("Waiting for the current cycle to finish...");
        }
        self.guard.wait_idle().await;
        self.set_state(OrchestratorState::Stopped);
        info!("Stopped");
    }

    /// Runs one cycle unless another is in flight or the orchestrator is
    /// not running.
    pub async fn trigger(&self) -> CycleOutcome {
        self.run_guarded(None).await
    }

    async fn run_guarded(&self, detected: Option<DetectionResult>) -> CycleOutcome {
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("Cycle already in flight, dropping trigger");
            return CycleOutcome::Skipped;
        };
        match self.state() {
            OrchestratorState::Validating | OrchestratorState::Running => {}
            other => {
                debug!("Ignoring trigger while {:?}", other);
                return CycleOutcome::Skipped;
            }
        }

        let outcome = self.run_cycle(detected).await;
        match &outcome {
            CycleOutcome::Failed(reason) => warn!("Cycle failed: {}", reason),
            other => debug!("Cycle finished: {:?}", other),
        }
        self.write_status().await;
        outcome
    }

    /// On-demand trigger for external surfaces, bounded by a rate limit.
    pub async fn trigger_now(&self) -> Result<CycleOutcome, TriggerError> {
        if !self.manual_limiter.try_acquire() {
            return Err(TriggerError::RateLimited);
        }
        Ok(self.trigger().await)
    }

    fn fail(&self, reason: String) -> CycleOutcome {
        self.health.record_check(false, Some(reason.clone()));
        CycleOutcome::Failed(reason)
    }

    async fn run_cycle(&self, detected: Option<DetectionResult>) -> CycleOutcome {
        let local = match self.store.load().await {
            Ok(record) => record.map(|r| r.address),
            Err(e) => return self.fail(e.to_string()),
        };

        let detected = match detected {
            Some(d) => d,
            None => match self.detection.detect().await {
                Ok(d) => d,
                Err(e) => return self.fail(e.to_string()),
            },
        };

        let remote = match self.remote.fetch().await {
            Ok(address) => Some(address),
            Err(RemoteError::NotConfigured) => None,
            Err(e) => {
                warn!(
                    "Remote reference unavailable ({}), comparing local and public only",
                    e
                );
                None
            }
        };

        let decision = reconcile(
            local.as_deref().unwrap_or_default(),
            &detected.address,
            remote.as_deref(),
        );
        debug!("Reconciliation: {:?}", decision);

        if !decision.needs_update {
            self.health.record_check(true, None);
            return CycleOutcome::NoChange;
        }

        info!(
            "Update needed: local={} public={} remote={}{}",
            decision.local_address,
            decision.public_address,
            decision.remote_address,
            if decision.degraded { " (degraded)" } else { "" }
        );

        let record = AddressRecord::new(detected.address.clone(), self.updated_by.clone());
        if let Err(e) = self.store.save(&record).await {
            return self.fail(e.to_string());
        }

        let outcome = self.workflow.publish(&detected.address, local.as_deref()).await;

        if local.as_deref() != Some(detected.address.as_str()) {
            self.health
                .record_change(local.clone(), detected.address.clone());
            if outcome.success {
                self.notifier
                    .notify(ChangeEvent {
                        old_address: local,
                        new_address: detected.address,
                    })
                    .await;
            }
        }

        if outcome.success {
            self.health.record_check(true, None);
        } else {
            self.health
                .record_check(false, Some(format!("publish failed: {}", outcome.message)));
        }
        CycleOutcome::Updated {
            published: outcome.success,
        }
    }

    async fn write_status(&self) {
        let Some(ref path) = self.status_file else {
            return;
        };
        let body = match serde_json::to_string_pretty(&self.health.snapshot()) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize health snapshot: {}", e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(path, body).await {
            warn!("Failed to write status file {}: {}", path.display(), e);
        }
    }
}
