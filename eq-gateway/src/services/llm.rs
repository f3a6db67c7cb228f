//! Schema-constrained LLM client
//!
//! Thin adapter over the provider's chat-completions API: every call is
//! bound to a JSON schema (strict structured output) and deserialized
//! into the caller's type, with a bounded number of retries when the
//! response fails to validate. Model swap is config-only.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// LLM call errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider did not answer within the time budget
    #[error("LLM call timed out")]
    Timeout,

    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Provider returned an error response
    #[error("Provider error {0}: {1}")]
    Provider(u16, String),

    /// Output failed schema validation after all retries
    #[error("Invalid structured output: {0}")]
    InvalidOutput(String),
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Chat-completions client bound to one model
pub struct LlmClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: String) -> Self {
        let http_client = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http_client,
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One schema-constrained call, deserialized into `T`, retried up to
    /// `max_retries` times on provider errors or validation failure.
    pub async fn structured<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_content: &str,
        schema_name: &str,
        schema: Value,
        temperature: f32,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<T, LlmError> {
        let mut last_error = LlmError::InvalidOutput("no attempts made".to_string());

        for attempt in 0..=max_retries {
            match self
                .attempt::<T>(system_prompt, user_content, schema_name, &schema, temperature, timeout)
                .await
            {
                Ok(value) => return Ok(value),
                Err(err @ LlmError::Timeout) => return Err(err),
                Err(err) => {
                    warn!(
                        attempt = attempt + 1,
                        error = %err,
                        "Structured LLM call failed"
                    );
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_content: &str,
        schema_name: &str,
        schema: &Value,
        temperature: f32,
        timeout: Duration,
    ) -> Result<T, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_content },
            ],
            "temperature": temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": schema_name,
                    "strict": true,
                    "schema": schema,
                }
            }
        });

        let response = self
            .http_client
            .post(CHAT_COMPLETIONS_URL)
            .timeout(timeout)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::Network(err.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidOutput("empty completion".to_string()))?;

        serde_json::from_str(&content).map_err(|err| LlmError::InvalidOutput(err.to_string()))
    }
}
