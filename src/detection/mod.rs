//! Public address detection.
//!
//! A [`DetectionChain`] walks an ordered list of [`AddressStrategy`]
//! implementations. Each strategy gets a bounded number of retries; the
//! first one that yields a syntactically valid address wins and no further
//! strategies are consulted. If all of them fail the chain reports one
//! failure reason per strategy, in order.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};

use crate::error::{DetectionError, StrategyError, StrategyFailure};
use crate::types::DetectionResult;
use crate::util::{is_valid_address, retry_with_backoff, RetryPolicy};

pub mod dns;
pub mod http;

pub use dns::DnsStrategy;
pub use http::HttpEchoStrategy;

#[async_trait]
pub trait AddressStrategy: Send + Sync {
    /// Name reported as the `method` of a successful detection.
    fn name(&self) -> &str;

    /// Perform one lookup and return the raw address token.
    async fn lookup(&self) -> Result<String, StrategyError>;
}

pub struct DetectionChain {
    strategies: Vec<Box<dyn AddressStrategy>>,
    retry: RetryPolicy,
}

impl DetectionChain {
    pub fn new(strategies: Vec<Box<dyn AddressStrategy>>, retry: RetryPolicy) -> Self {
        Self { strategies, retry }
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn detect(&self) -> Result<DetectionResult, DetectionError> {
        let mut failures = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let name = strategy.name();
            debug!("Trying detection method {}", name);
            let attempt = retry_with_backoff(&self.retry, name, || async move {
                let token = strategy.lookup().await?;
                let token = token.trim();
                if is_valid_address(token) {
                    Ok(token.to_string())
                } else {
                    Err(StrategyError::InvalidAddressFormat(token.to_string()))
                }
            })
            .await;

            match attempt {
                Ok(address) => {
                    info!("Detected public address {} via {}", address, name);
                    return Ok(DetectionResult {
                        address,
                        method: name.to_string(),
                        observed_at: Utc::now(),
                    });
                }
                Err(e) => {
                    warn!("Detection method {} exhausted: {}", name, e);
                    failures.push(StrategyFailure {
                        method: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(DetectionError::AllMethodsExhausted(failures))
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    use super::testing::{ScriptedStrategy, Shared};
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn first_valid_strategy_wins() {
        let first = Arc::new(ScriptedStrategy::ok("dns", "198.51.100.7"));
        let second = Arc::new(ScriptedStrategy::ok("http:api.ipify.org", "198.51.100.8"));
        let chain = DetectionChain::new(
            vec![Box::new(Shared(first.clone())), Box::new(Shared(second.clone()))],
            policy(),
        );

        let result = chain.detect().await.unwrap();
        assert_eq!(result.address, "198.51.100.7");
        assert_eq!(result.method, "dns");
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_through_to_next_strategy() {
        let first = Arc::new(ScriptedStrategy::failing("dns"));
        let chain = DetectionChain::new(
            vec![
                Box::new(Shared(first.clone())),
                Box::new(ScriptedStrategy::ok("http:icanhazip.com", "203.0.113.9")),
            ],
            policy(),
        );

        let result = chain.detect().await.unwrap();
        assert_eq!(result.method, "http:icanhazip.com");
        assert_eq!(result.address, "203.0.113.9");
        assert_eq!(first.calls.load(Ordering::SeqCst), 3, "retried up to the limit");
    }

    #[tokio::test]
    async fn invalid_token_counts_as_strategy_failure() {
        let chain = DetectionChain::new(
            vec![
                Box::new(ScriptedStrategy::ok("garbage", "<html>oops</html>")),
                Box::new(ScriptedStrategy::ok("good", "2001:db8::1")),
            ],
            policy(),
        );

        let result = chain.detect().await.unwrap();
        assert_eq!(result.method, "good");
        assert_eq!(result.address, "2001:db8::1");
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_retries() {
        let flaky = ScriptedStrategy::new(
            "flaky",
            vec![
                Err(StrategyError::Lookup("reset".into())),
                Ok(" 192.0.2.44\n"),
            ],
        );
        let chain = DetectionChain::new(vec![Box::new(flaky)], policy());

        let result = chain.detect().await.unwrap();
        assert_eq!(result.address, "192.0.2.44");
        assert_eq!(result.method, "flaky");
    }

    #[tokio::test]
    async fn exhaustion_reports_one_reason_per_strategy() {
        let chain = DetectionChain::new(
            vec![
                Box::new(ScriptedStrategy::failing("a")),
                Box::new(ScriptedStrategy::ok("b", "999.1.1.1")),
                Box::new(ScriptedStrategy::failing("c")),
            ],
            policy(),
        );

        let DetectionError::AllMethodsExhausted(failures) = chain.detect().await.unwrap_err();
        assert_eq!(failures.len(), 3);
        let methods: Vec<_> = failures.iter().map(|f| f.method.as_str()).collect();
        assert_eq!(methods, ["a", "b", "c"]);
        assert!(failures[1].reason.contains("invalid address format"));
    }
}
