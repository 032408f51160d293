use futures::StreamExt as _;
use tracing::{debug, warn};

use crate::config::ChatClientConfig;
use crate::conversation::ChatRequest;
use crate::errors::StreamError;
use crate::transport::{ByteStream, ChatTransport};

const FALLBACK_UPSTREAM_MESSAGE: &str = "failed to reach the chat service";

/// HTTP transport for the hosted chat function.
pub struct ChatClient {
    client: reqwest::Client,
    config: ChatClientConfig,
}

impl ChatClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ChatClientConfig) -> Result<Self, StreamError> {
        if config.base_url.trim().is_empty() {
            return Err(StreamError::Config(
                "chat client base_url must not be empty".into(),
            ));
        }
        if config.api_key.trim().is_empty() {
            return Err(StreamError::Config(
                "chat client api_key must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build chat client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a client from `SUPABASE_URL` / `SUPABASE_PUBLISHABLE_KEY`.
    pub fn from_env() -> Result<Self, StreamError> {
        Self::new(ChatClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ChatClientConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl ChatTransport for ChatClient {
    fn name(&self) -> &str {
        &self.config.function
    }

    async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, StreamError> {
        let url = self.config.chat_url();
        debug!(url = %url, messages = request.messages.len(), "opening chat stream");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StreamError::Request(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = upstream_message(&body);
            warn!(status = status.as_u16(), message = %message, "chat service rejected request");
            return Err(StreamError::upstream(status.as_u16(), message));
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| StreamError::read(format!("chat stream read failed: {e}")))
        });
        Ok(Box::pin(stream))
    }
}

/// Picks a readable message out of an error response body.
///
/// Prefers the JSON `error` field the chat function returns, then the raw
/// body, then a generic message.
pub(crate) fn upstream_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(message) = value
            .get("error")
            .and_then(|e| e.as_str().or_else(|| e.get("message")?.as_str()))
            .filter(|m| !m.trim().is_empty())
    {
        return message.to_string();
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        FALLBACK_UPSTREAM_MESSAGE.to_string()
    } else {
        trimmed.to_string()
    }
}
