//! Chat Client - OpenAI-compatible chat-completion API
//!
//! Both providers the assistant talks to (Groq for routing, OpenAI for the
//! rest) speak the same `/chat/completions` dialect.

use crate::config::LlmConfig;
use crate::error::{AssistantError, AssistantResult};
use crate::llm::prompts::ChatPrompt;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Anything that turns a system + human prompt into text
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &ChatPrompt) -> AssistantResult<String>;

    /// Model identifier, for logs
    fn name(&self) -> &str;
}

pub struct OpenAiChatClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: Option<u32>,
    client: Client,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: Client::new(),
        }
    }

    fn request_body<'a>(&'a self, prompt: &'a ChatPrompt) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.human,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn complete(&self, prompt: &ChatPrompt) -> AssistantResult<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self.client.post(&url).json(&self.request_body(prompt));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            AssistantError::llm(format!("Failed to send request to {}: {}", self.base_url, e)).with_context(&self.model)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::llm_with_status(
                format!("Chat completion failed: {}", truncate(&body, 500)),
                &self.model,
                status.as_u16(),
            ));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            AssistantError::llm(format!("Failed to parse chat completion response: {}", e)).with_context(&self.model)
        })?;

        parse_first_choice(parsed).ok_or_else(|| {
            AssistantError::llm("Chat completion returned no message content").with_context(&self.model)
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn parse_first_choice(response: ChatCompletionResponse) -> Option<String> {
    response.choices.into_iter().next().and_then(|c| c.message.content)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}... (truncated)", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
