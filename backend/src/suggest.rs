//! Client for the language-model endpoint behind `GET /suggestions`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_TOKENS: u32 = 100;

#[derive(Debug, Clone, Error)]
pub enum SuggestionError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("json error: {0}")]
    Serde(String),
    #[error("empty completion")]
    Empty,
}

/// Proposes one new task given the names of the existing ones.
#[async_trait]
pub trait Suggester: Send + Sync {
    async fn suggest(&self, task_names: &[String]) -> Result<String, SuggestionError>;
}

pub fn build_prompt(task_names: &[String]) -> String {
    if task_names.is_empty() {
        return "My to-do list is empty. Suggest one new task I could add to it. \
                Reply with the task only."
            .to_string();
    }
    format!(
        "Here is my current to-do list: {}. Suggest one new task that fits alongside these. \
         Reply with the task only.",
        task_names.join(", ")
    )
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }
}

/// OpenAI-compatible chat-completions client. One request per call, no retry.
pub struct OpenAiSuggester {
    http: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiSuggester {
    pub fn new(
        api_key: SecretString,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, SuggestionError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tasklist-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SuggestionError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model,
            base_url,
        })
    }
}

#[async_trait]
impl Suggester for OpenAiSuggester {
    async fn suggest(&self, task_names: &[String]) -> Result<String, SuggestionError> {
        let prompt = build_prompt(task_names);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: MAX_TOKENS,
        };

        let res = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res
                .json::<ChatResponse>()
                .await
                .map_err(|e| SuggestionError::Serde(e.to_string()))?
                .into_text()
                .ok_or(SuggestionError::Empty),
            StatusCode::UNAUTHORIZED => Err(SuggestionError::InvalidApiKey),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(SuggestionError::Http { status, body })
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SuggestionError {
    if e.is_timeout() {
        SuggestionError::Timeout
    } else {
        SuggestionError::Transport(e.to_string())
    }
}
