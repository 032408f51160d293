use std::time::Duration;

use crate::errors::StreamError;

const DEFAULT_FUNCTION: &str = "cinema-chat";

/// Configuration for the HTTP chat client.
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Project base URL of the hosted backend (for example
    /// `https://xyz.supabase.co`).
    pub base_url: String,
    /// Publishable key sent as bearer auth.
    pub api_key: String,
    /// Name of the chat function under `/functions/v1/`.
    pub function: String,
    /// Connect timeout. Streaming replies are bounded per request instead,
    /// see `ChatRequest::timeout`.
    pub connect_timeout: Duration,
}

impl ChatClientConfig {
    /// Creates a config with the default function name and timeouts.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            function: DEFAULT_FUNCTION.to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Builds a config from the environment.
    ///
    /// - `SUPABASE_URL` (required)
    /// - `SUPABASE_PUBLISHABLE_KEY`, falling back to `SUPABASE_ANON_KEY` (required)
    /// - `CINEMA_CHAT_FUNCTION` (optional, defaults to `cinema-chat`)
    pub fn from_env() -> Result<Self, StreamError> {
        let base_url = non_empty_env("SUPABASE_URL")
            .ok_or_else(|| StreamError::Config("missing SUPABASE_URL for chat client".into()))?;
        let api_key = non_empty_env("SUPABASE_PUBLISHABLE_KEY")
            .or_else(|| non_empty_env("SUPABASE_ANON_KEY"))
            .ok_or_else(|| {
                StreamError::Config(
                    "missing SUPABASE_PUBLISHABLE_KEY (or SUPABASE_ANON_KEY) for chat client".into(),
                )
            })?;
        let mut config = Self::new(base_url, api_key);
        if let Some(function) = non_empty_env("CINEMA_CHAT_FUNCTION") {
            config.function = function;
        }
        Ok(config)
    }

    /// Overrides the chat function name.
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub(crate) fn chat_url(&self) -> String {
        format!(
            "{}/functions/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.function.trim_matches('/')
        )
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_joins_without_double_slashes() {
        let config = ChatClientConfig::new("https://example.supabase.co/", "key");
        assert_eq!(
            config.chat_url(),
            "https://example.supabase.co/functions/v1/cinema-chat"
        );
        let config = config.function("/film-chat/");
        assert_eq!(
            config.chat_url(),
            "https://example.supabase.co/functions/v1/film-chat"
        );
    }
}
