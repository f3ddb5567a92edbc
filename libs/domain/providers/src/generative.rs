//! A generic OpenAI-compatible chat-completion adapter (§4.D, §6.4
//! `type: generative`). Vendor-neutral: any provider exposing a
//! `{ model, messages: [{role, content}] }` → `{ choices: [...] }`
//! contract can be configured through `base_url`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::completion::Completion;
use crate::error::ProviderError;
use crate::provider_trait::AiProvider;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct GenerativeAdapter {
    id: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl GenerativeAdapter {
    pub fn new(id: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent("refnorm-engine/0.1")
            .build()
            .expect("failed to build provider HTTP client");
        Self { id: id.into(), model: model.into(), base_url: base_url.into(), api_key, http }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl AiProvider for GenerativeAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<Completion, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
            temperature: 0.0,
        };

        let mut builder = self.http.post(format!("{}/chat/completions", self.base_url)).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus(status.as_u16()));
        }

        let decoded: ChatResponse = response.json().await?;
        let content = decoded
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ProviderError::EmptyResponse)?;
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(Completion::new(content))
    }
}
