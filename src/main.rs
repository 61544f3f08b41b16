//! addrwatch daemon entry point.
//!
//! Watches the host's public address and keeps a version-controlled record
//! of it up to date.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{error, info, warn};
use tokio::signal;
use tokio::sync::mpsc;

mod config;
mod detection;
mod error;
mod health;
mod notify;
mod orchestrator;
mod publish;
mod reconcile;
mod scheduler;
#[cfg(unix)]
mod signals;
mod store;
mod types;
mod util;
mod vcs;

use config::Config;
use detection::{AddressStrategy, DetectionChain, DnsStrategy, HttpEchoStrategy};
use notify::{run_notifier, ChannelNotifier};
use orchestrator::Orchestrator;
use publish::PersistenceWorkflow;
use scheduler::IntervalScheduler;
use store::HttpRemote;
use vcs::GitCli;

fn build_strategies(cfg: &Config) -> anyhow::Result<Vec<Box<dyn AddressStrategy>>> {
    let mut strategies: Vec<Box<dyn AddressStrategy>> = Vec::new();
    if cfg.dns_enabled {
        let resolver: IpAddr = cfg.dns_resolver.parse()?;
        strategies.push(Box::new(DnsStrategy::new(
            resolver,
            cfg.dns_query.clone(),
            cfg.request_timeout(),
        )));
    }
    for url in &cfg.http_endpoints {
        strategies.push(Box::new(HttpEchoStrategy::new(
            url.clone(),
            cfg.request_timeout(),
        )?));
    }
    Ok(strategies)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting addrwatch with config: {:?}", cfg);
    if cfg.remote_url.is_none() {
        warn!("No remote_url configured, reconciliation will compare local and public only");
    }

    let detection = DetectionChain::new(build_strategies(&cfg)?, cfg.detection_retry());
    info!("Detection order: {}", detection.method_names().join(", "));

    let remote = Arc::new(HttpRemote::new(
        cfg.remote_url.clone(),
        cfg.record_key.clone(),
        cfg.request_timeout(),
    )?);

    let workflow = if cfg.vcs_enabled {
        let git = GitCli::new(cfg.git_binary.clone(), cfg.repo_dir.clone(), cfg.request_timeout());
        PersistenceWorkflow::new(
            Arc::new(git),
            cfg.commit_targets(),
            cfg.vcs_retry(),
            cfg.commit_message_max_len,
        )
    } else {
        info!("Version control disabled, changes are only written locally");
        PersistenceWorkflow::disabled()
    };

    // Notification channel
    let (notify_tx, notify_rx) = mpsc::channel(32);
    let webhook = cfg.notify_webhook.clone();
    let timeout = cfg.request_timeout();
    let notifier_handle = tokio::spawn(async move {
        if let Err(e) = run_notifier(notify_rx, webhook, timeout).await {
            error!("Notifier failed: {}", e);
        }
    });

    let orchestrator = Arc::new(Orchestrator::new(
        &cfg,
        detection,
        remote,
        workflow,
        Arc::new(ChannelNotifier::new(notify_tx)),
        Arc::new(IntervalScheduler),
    ));
    orchestrator
        .start()
        .await
        .context("addrwatch could not start")?;

    #[cfg(unix)]
    let manual_handle = signals::spawn_manual_trigger_handler(Arc::clone(&orchestrator));

    // Graceful Shutdown
    let reason = match signal::ctrl_c().await {
        Ok(()) => "received Ctrl+C".to_string(),
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            format!("signal handler failed: {}", err)
        }
    };
    #[cfg(unix)]
    manual_handle.abort();
    orchestrator.stop(&reason).await;

    let health = orchestrator.health();
    info!(
        "Final health: healthy={} consecutive_failures={}",
        health.healthy, health.consecutive_failures
    );

    // Dropping the orchestrator closes the notification channel
    drop(orchestrator);
    match tokio::time::timeout(Duration::from_secs(5), notifier_handle).await {
        Ok(Err(e)) => error!("Notifier task panicked: {}", e),
        Err(_) => warn!("Notifier did not drain in time"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete.");
    Ok(())
}
