//! SIGUSR1 requests an immediate check.
//!
//! `kill -USR1 <pid>` is the on-demand trigger surface. Requests beyond the
//! manual rate limit are refused and logged.

use std::sync::Arc;

use log::{info, warn};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::orchestrator::Orchestrator;

pub fn spawn_manual_trigger_handler(orchestrator: Arc<Orchestrator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigusr1 = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to register SIGUSR1 handler: {}", e);
                return;
            }
        };
        info!("SIGUSR1 handler registered - send it to force a check");

        while sigusr1.recv().await.is_some() {
            // the cycle must outlive this listener
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                match orchestrator.trigger_now().await {
                    Ok(outcome) => {
                        let health = orchestrator.health();
                        info!(
                            "Manual check: {:?} (healthy={}, consecutive_failures={})",
                            outcome, health.healthy, health.consecutive_failures
                        );
                    }
                    Err(e) => warn!("Manual check refused: {}", e),
                }
            });
        }
    })
}
