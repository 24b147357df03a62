//! Upstream HTTP client for the remote backend.
//!
//! Thin wrapper over `reqwest` that maps every response into the retry
//! taxonomy: transport failures and 5xx are retryable, 429 carries an
//! explicit retry-after, and other 4xx are permanent rejections that must
//! never be buffered.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::storage::types::{MetricsIngest, PrinterCreate, PrinterSummary, UploadPayload};

/// User-Agent header sent with every request.
const USER_AGENT: &str = concat!("printwatch-agent/", env!("CARGO_PKG_VERSION"));

/// Maximum length of a rejection detail kept for logging.
const MAX_DETAIL_LEN: usize = 256;

/// Delivery failure, classified for the retry policy.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Connection, DNS, or timeout failure. Retryable.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream 5xx. Retryable.
    #[error("upstream error: status {0}")]
    Upstream(u16),

    /// Upstream 429; the server-specified delay overrides computed backoff.
    #[error("rate limited by upstream")]
    RateLimited {
        /// Parsed Retry-After value, if the server sent one.
        retry_after: Option<Duration>,
    },

    /// Upstream 4xx validation rejection. Not retryable: the same request
    /// would fail the same way forever.
    #[error("rejected by upstream: status {status}: {detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Truncated response body for the log.
        detail: String,
    },
}

impl DeliveryError {
    /// Whether a later retry of the same request can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Server-directed retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// HTTP client for the upstream delivery API.
#[derive(Clone)]
pub struct RemoteClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RemoteClient {
    /// Create a client from the remote configuration.
    pub fn new(config: &RemoteConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Register or update a printer identity upstream.
    pub async fn register_printer(&self, req: &PrinterCreate) -> Result<(), DeliveryError> {
        self.post_json("/api/v1/printers", req).await
    }

    /// Submit one metric sample upstream.
    pub async fn submit_metrics(&self, req: &MetricsIngest) -> Result<(), DeliveryError> {
        self.post_json("/api/v1/metrics", req).await
    }

    /// Deliver one buffered upload.
    pub async fn deliver(&self, payload: &UploadPayload) -> Result<(), DeliveryError> {
        match payload {
            UploadPayload::RegisterPrinter(req) => self.register_printer(req).await,
            UploadPayload::SubmitMetrics(req) => self.submit_metrics(req).await,
        }
    }

    /// Fetch the upstream printer list (remote-mode target enumeration).
    pub async fn list_printers(&self) -> Result<Vec<PrinterSummary>, DeliveryError> {
        let url = format!("{}/api/v1/printers", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Probe upstream availability.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Upstream health probe failed");
                false
            }
        }
    }

    async fn post_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(), DeliveryError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        check_status(resp).await?;
        Ok(())
    }
}

/// Map a response status into the retry taxonomy.
async fn check_status(resp: Response) -> Result<Response, DeliveryError> {
    let status = resp.status();

    if status.is_success() {
        return Ok(resp);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(DeliveryError::RateLimited { retry_after });
    }

    if status.is_client_error() {
        let detail = resp.text().await.unwrap_or_default();
        let detail = detail.chars().take(MAX_DETAIL_LEN).collect();
        return Err(DeliveryError::Rejected {
            status: status.as_u16(),
            detail,
        });
    }

    Err(DeliveryError::Upstream(status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DeliveryError::Upstream(503).is_retryable());
        assert!(DeliveryError::RateLimited { retry_after: None }.is_retryable());
        assert!(!DeliveryError::Rejected {
            status: 422,
            detail: "bad printer_id".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_retry_after_only_from_rate_limit() {
        let limited = DeliveryError::RateLimited {
            retry_after: Some(Duration::from_secs(120)),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(120)));
        assert_eq!(DeliveryError::Upstream(500).retry_after(), None);
    }
}
