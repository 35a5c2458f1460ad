//! Shared HTTP plumbing for the hosted and local providers.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TabulaError};

use super::provider::LlmConfig;

/// One turn of a chat-style conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

/// Client honouring the configured request timeout.
pub(super) fn client(config: &LlmConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| TabulaError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Send `body` as JSON and decode the answer, mapping failures onto the
/// error kinds callers branch on.
pub(super) async fn post_json<B, R>(provider: &str, request: RequestBuilder, body: &B) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        warn!(provider, %status, "LLM request rejected");
        return Err(status_error(provider, status, &text));
    }
    debug!(provider, %status, "LLM response received");

    response
        .json()
        .await
        .map_err(|e| TabulaError::Generation(format!("Unreadable {} response: {}", provider, e)))
}

/// Timeouts and unreachable hosts are connection errors.
pub(super) fn transport_error(provider: &str, error: reqwest::Error) -> TabulaError {
    let detail = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("could not connect: {}", error)
    } else {
        format!("request failed: {}", error)
    };
    TabulaError::Connection(format!("{} {}", provider, detail))
}

pub(super) fn status_error(provider: &str, status: StatusCode, body: &str) -> TabulaError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TabulaError::Authentication(format!("{} rejected the API key ({})", provider, status))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            TabulaError::Connection(format!("{} timed out ({})", provider, status))
        }
        _ => TabulaError::Generation(format!("{} answered {}: {}", provider, status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error("OpenAI", StatusCode::UNAUTHORIZED, ""),
            TabulaError::Authentication(_)
        ));
        assert!(matches!(
            status_error("OpenAI", StatusCode::FORBIDDEN, ""),
            TabulaError::Authentication(_)
        ));
        assert!(matches!(
            status_error("OpenAI", StatusCode::GATEWAY_TIMEOUT, ""),
            TabulaError::Connection(_)
        ));
        assert!(matches!(
            status_error("OpenAI", StatusCode::INTERNAL_SERVER_ERROR, "oops"),
            TabulaError::Generation(_)
        ));
    }

    #[test]
    fn test_chat_message_roles() {
        let json = serde_json::to_value([ChatMessage::system("s"), ChatMessage::user("u")]).unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[1]["content"], "u");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let client = client(&LlmConfig { timeout_secs: 2, ..LlmConfig::default() }).unwrap();
        let request = client.post("http://127.0.0.1:9/api/chat");
        let err = post_json::<_, serde_json::Value>("Local", request, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TabulaError::Connection(_)));
    }
}
