pub mod intents;

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use serenity::async_trait;
use tracing::debug;

use crate::error::CompletionError;

pub use intents::{Intent, IntentClassifier};

const MAX_OUTPUT_TOKENS: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub user_content: String,
    pub temperature: f32,
}

/// Text-in/text-out completion endpoint.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Groq's OpenAI-compatible chat completions API.
pub struct GroqClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    timeout: Duration,
}

impl GroqClient {
    pub fn new(api_key: String, api_url: String, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url,
            model,
            timeout,
        }
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_instruction },
                { "role": "user", "content": request.user_content },
            ],
            "temperature": request.temperature,
            "max_tokens": MAX_OUTPUT_TOKENS,
        })
    }
}

#[async_trait]
impl CompletionService for GroqClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(&request))
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }

        let json: Value = response.json().await?;
        let text = message_content(&json).ok_or(CompletionError::EmptyEnvelope)?;
        debug!(model = %self.model, chars = text.len(), "Completion received");
        Ok(text)
    }
}

fn message_content(envelope: &Value) -> Option<String> {
    envelope["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}
