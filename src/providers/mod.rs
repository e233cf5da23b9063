mod http;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::Value;

pub use http::HttpTransport;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {target} failed: {source}")]
    Request {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{target} answered with HTTP {status}")]
    Status { target: String, status: StatusCode },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    /// Network, timeout and HTTP-level failures. These still count as a
    /// sent message for rate limiting and never stop the poll loop.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Request { .. } | FetchError::Status { .. })
    }

    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            FetchError::Other(e) => e,
            e => anyhow::Error::new(e),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one GET request and returns the decoded JSON body.
    async fn send(&self, target: &Url) -> Result<Value, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_errors_are_transport_class() {
        let err = FetchError::Status {
            target: "https://api.example.com".to_string(),
            status: StatusCode::TOO_MANY_REQUESTS,
        };
        assert!(err.is_transport());
        assert_eq!(
            err.to_string(),
            "https://api.example.com answered with HTTP 429 Too Many Requests"
        );
    }

    #[test]
    fn test_other_errors_are_not_transport_class() {
        let err = FetchError::from(anyhow::anyhow!("payload is not JSON"));
        assert!(!err.is_transport());
        assert_eq!(err.into_anyhow().to_string(), "payload is not JSON");
    }
}
