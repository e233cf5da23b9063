use crate::providers::{FetchError, Transport};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

/// Must stay below the schedule's maximum reception delay.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }

    #[cfg(test)]
    fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn classify(target: &Url, source: reqwest::Error) -> FetchError {
        if source.is_builder() {
            return FetchError::Other(
                anyhow::Error::new(source).context(format!("Could not build request for {target}")),
            );
        }

        FetchError::Request {
            target: target.to_string(),
            source,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, target: &Url) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(|e| Self::classify(target, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%status, body = %body, "Non-success response");
            return Err(FetchError::Status {
                target: target.to_string(),
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(target, e))?;

        let payload = serde_json::from_slice(&body)
            .with_context(|| format!("Response from {target} is not valid JSON"))?;

        Ok(payload)
    }
}
