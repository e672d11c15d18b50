use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::error::LlmError;
use super::types::{MessagesRequest, MessagesResponse};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Anything that can answer a messages request. The HTTP client implements it;
/// tests swap in canned replies.
pub trait MessageSender: Send + Sync {
    fn send_message(
        &self,
        req: &MessagesRequest,
    ) -> impl Future<Output = Result<MessagesResponse, LlmError>> + Send;
}

/// HTTP client for the messages endpoint.
///
/// One instance is shared by every worker of a batch; `reqwest::Client`
/// pools connections internally.
#[derive(Debug, Clone)]
pub struct LlmClient {
    api_key: String,
    model: String,
    client: Client,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        Self::with_base_url(api_key, model, DEFAULT_API_URL)
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, LlmError> {
        // The per-attempt deadline is enforced by the executor; this one only
        // stops a wedged connection from outliving every retry.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            client,
            base_url: base_url.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post(&self, req: &MessagesRequest) -> Result<MessagesResponse, LlmError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await
            .map_err(LlmError::from_transport)?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            debug!(retry_after_ms = retry_after, "remote rate limit");
            return Err(LlmError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(LlmError::from_transport)
    }
}

impl MessageSender for LlmClient {
    fn send_message(
        &self,
        req: &MessagesRequest,
    ) -> impl Future<Output = Result<MessagesResponse, LlmError>> + Send {
        self.post(req)
    }
}
