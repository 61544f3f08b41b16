use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::AddressStrategy;
use crate::error::StrategyError;

/// Plain-text "what is my IP" echo service.
pub struct HttpEchoStrategy {
    name: String,
    url: String,
    client: Client,
}

impl HttpEchoStrategy {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(url, client))
    }

    pub fn with_client(url: impl Into<String>, client: Client) -> Self {
        let url = url.into();
        let host = reqwest::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.clone());
        Self {
            name: format!("http:{}", host),
            url,
            client,
        }
    }
}

#[async_trait]
impl AddressStrategy for HttpEchoStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self) -> Result<String, StrategyError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/plain")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StrategyError::Lookup(e.to_string()))?;
        let body = response
            .text()
            .await
            .map_err(|e| StrategyError::Lookup(e.to_string()))?;
        Ok(body.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn strategy_for(server: &MockServer) -> HttpEchoStrategy {
        HttpEchoStrategy::new(format!("{}/ip", server.uri()), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn name_uses_host() {
        let s = HttpEchoStrategy::new("https://api.ipify.org", Duration::from_secs(1)).unwrap();
        assert_eq!(s.name(), "http:api.ipify.org");
    }

    #[tokio::test]
    async fn returns_trimmed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("203.0.113.9\n"))
            .mount(&server)
            .await;

        let token = strategy_for(&server).await.lookup().await.unwrap();
        assert_eq!(token, "203.0.113.9");
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = strategy_for(&server).await.lookup().await.unwrap_err();
        assert!(matches!(err, StrategyError::Lookup(_)));
    }
}
