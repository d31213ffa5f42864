//! Hosted completion API backend (Anthropic Messages wire format).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{prompt_for, GeneratedPlan, GenerationMethod, PlanGenerator, SYSTEM_PROMPT};
use crate::config::GeneratorConfig;
use crate::error::{AideError, Result};
use crate::item::ActionItem;

const API_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<RequestMessage>,
}

#[derive(Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct HostedApiGenerator {
    client: Client,
    url: String,
    model: String,
    max_tokens: u32,
    api_key: Option<String>,
    api_key_env: String,
    timeout: Duration,
}

impl HostedApiGenerator {
    /// Reads the API key from the environment variable named in `config`.
    pub fn from_config(config: &GeneratorConfig, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: config.api_url.clone(),
            model: config.api_model.clone(),
            max_tokens: config.max_tokens,
            api_key: std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty()),
            api_key_env: config.api_key_env.clone(),
            timeout,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl PlanGenerator for HostedApiGenerator {
    fn method(&self) -> GenerationMethod {
        GenerationMethod::Api
    }

    async fn generate(&self, item: &ActionItem) -> Result<GeneratedPlan> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AideError::Generation(format!("{} is not set", self.api_key_env)))?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt_for(item),
            }],
        };

        debug!(item = %item.name, model = %self.model, "requesting plan from hosted API");

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AideError::Timeout {
                        what: format!("hosted API for {}", item.name),
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    AideError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(status = %status, item = %item.name, "hosted API error");
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    AideError::Transient(format!("rate limited: {text}"))
                }
                s if s.is_server_error() => AideError::Transient(format!("{s}: {text}")),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AideError::Generation(format!("authentication failed: {text}"))
                }
                s => AideError::Generation(format!("{s}: {text}")),
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Err(AideError::Generation("hosted API returned no text".into()));
        }
        Ok(GeneratedPlan {
            body: text.trim().to_string(),
            method: GenerationMethod::Api,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
