//! The execution capability: role + prompt in, text out.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::roles::{Phase, Role};

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const MODEL_ENV: &str = "OPENAI_MODEL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("execution timed out")]
    Timeout,

    #[error("rate limited by the execution backend")]
    RateLimited,

    #[error("execution returned an empty response")]
    EmptyResponse,

    #[error("missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// One call to the execution capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInvocation {
    pub role: Role,
    pub phase: Phase,
    /// The instance description the role acts as.
    pub persona: String,
    pub prompt: String,
}

/// Token counts reported by the backend, when it reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    pub text: String,
    pub usage: Option<ReportedUsage>,
}

impl ExecutionOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

#[async_trait]
pub trait RoleExecutor: Send + Sync {
    /// Model tag used for pricing and tokenization.
    fn model(&self) -> &str;

    async fn execute(&self, invocation: &RoleInvocation) -> ExecutionResult<ExecutionOutput>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiExecutor {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for OpenAiExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiExecutor")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiExecutor {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> ExecutionResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("taskcrew/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ExecutionError::Transport(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            http,
        })
    }

    /// Configure from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    /// `default_model` applies when `OPENAI_MODEL` is unset.
    pub fn from_env(default_model: &str) -> ExecutionResult<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ExecutionError::MissingCredentials(API_KEY_ENV))?;
        let model = std::env::var(MODEL_ENV).unwrap_or_else(|_| default_model.to_string());
        let mut executor = Self::new(api_key, model)?;
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            executor = executor.with_base_url(url);
        }
        Ok(executor)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl RoleExecutor for OpenAiExecutor {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(
        skip(self, invocation),
        fields(role = %invocation.role, phase = %invocation.phase)
    )]
    async fn execute(&self, invocation: &RoleInvocation) -> ExecutionResult<ExecutionOutput> {
        let messages = [
            ChatMessage {
                role: "system",
                content: &invocation.persona,
            },
            ChatMessage {
                role: "user",
                content: &invocation.prompt,
            },
        ];
        let body = serde_json::json!({
            "model": &self.model,
            "messages": messages,
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExecutionError::RateLimited);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ExecutionError::Transport(format!("{status}: {text}")));
        }

        let parsed: ChatResponse = resp.json().await.map_err(map_transport)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ExecutionError::EmptyResponse)?;
        debug!(chars = text.len(), "completion received");

        Ok(ExecutionOutput {
            text,
            usage: parsed.usage.map(|u| ReportedUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

fn map_transport(e: reqwest::Error) -> ExecutionError {
    if e.is_timeout() {
        ExecutionError::Timeout
    } else {
        ExecutionError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let exec = OpenAiExecutor::new("k", "gpt-4")
            .unwrap()
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(exec.base_url, "http://localhost:8080/v1");
        assert_eq!(exec.model(), "gpt-4");
    }

    #[test]
    fn test_response_without_choices_parses() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"usage":null}"#).unwrap();
        assert!(parsed.choices.is_empty());
    }

    #[test]
    fn test_response_with_usage_parses() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"hi"}}],"usage":{"prompt_tokens":3,"completion_tokens":1}}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));
        assert_eq!(parsed.usage.map(|u| u.prompt_tokens), Some(3));
    }
}
