//! Change notification.
//!
//! The orchestrator only sees the [`Notifier`] trait. In the daemon the
//! notifier is a channel whose receiving end is drained by
//! [`run_notifier`], which logs every change and optionally POSTs it as
//! JSON to a webhook. Delivery problems are logged and never reach the
//! cycle.

use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::Client;
use tokio::sync::mpsc;

use crate::types::ChangeEvent;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: ChangeEvent);
}

pub struct ChannelNotifier {
    tx: mpsc::Sender<ChangeEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<ChangeEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: ChangeEvent) {
        // never block a cycle on a slow consumer
        if let Err(e) = self.tx.try_send(event) {
            warn!("Dropping change notification: {}", e);
        }
    }
}

/// Drains change events until the channel closes.
pub async fn run_notifier(
    mut rx: mpsc::Receiver<ChangeEvent>,
    webhook: Option<String>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let client = Client::builder().timeout(timeout).build()?;

    while let Some(event) = rx.recv().await {
        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize change event: {}", e);
                continue;
            }
        };
        info!("Address changed: {}", payload);

        if let Some(ref url) = webhook {
            let result = client
                .post(url)
                .json(&event)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                error!("Failed to deliver change notification: {}", e);
            }
        }
    }
    info!("Notification channel closed, shutting down");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<ChangeEvent>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, event: ChangeEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn change() -> ChangeEvent {
        ChangeEvent {
            old_address: Some("203.0.113.5".into()),
            new_address: "203.0.113.9".into(),
        }
    }

    #[tokio::test]
    async fn channel_notifier_forwards_events() {
        let (tx, mut rx) = mpsc::channel(4);
        ChannelNotifier::new(tx).notify(change()).await;
        assert_eq!(rx.recv().await, Some(change()));
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let notifier = ChannelNotifier::new(tx);
        notifier.notify(change()).await;
        tokio::time::timeout(Duration::from_secs(1), notifier.notify(change()))
            .await
            .expect("notify must not block");
    }

    #[tokio::test]
    async fn webhook_receives_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(serde_json::json!({
                "oldAddress": "203.0.113.5",
                "newAddress": "203.0.113.9"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (tx, rx) = mpsc::channel(4);
        tx.send(change()).await.unwrap();
        drop(tx);
        run_notifier(rx, Some(format!("{}/hook", server.uri())), Duration::from_secs(2))
            .await
            .unwrap();
        server.verify().await;
    }
}
