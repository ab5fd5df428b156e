use crate::config::SummarizerConfig;
use crate::error::{Result, SummarizerError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One chat-completion call, independent of the wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// HTTP 429.
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },
    /// Timeouts, connection failures, 5xx, unreadable bodies.
    Transient(String),
    /// Bad credentials or a request the upstream will never accept.
    Permanent { status: u16, message: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { message, .. } => write!(f, "rate limited: {message}"),
            Self::Transient(message) => write!(f, "transient failure: {message}"),
            Self::Permanent { status, message } => write!(f, "HTTP {status}: {message}"),
        }
    }
}

/// Seam between the summarization client and whatever serves completions.
#[async_trait]
pub trait CompletionTransport: Send + Sync + fmt::Debug {
    /// Returns the assistant message content.
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, TransportError>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorBodyInner,
}

#[derive(Deserialize)]
struct ErrorBodyInner {
    #[serde(default)]
    message: String,
}

/// OpenAI-compatible `POST {base_url}/chat/completions` with bearer auth.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                SummarizerError::NotConfigured(
                    "no API key (set OPENROUTER_API_KEY or summarizer.api_key)".to_string(),
                )
            })?
            .to_string();
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| SummarizerError::Client(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> TransportError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());
    match status.as_u16() {
        429 => TransportError::RateLimited {
            retry_after,
            message,
        },
        408 | 500..=599 => TransportError::Transient(format!("HTTP {}: {message}", status.as_u16())),
        code => TransportError::Permanent {
            status: code,
            message,
        },
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, TransportError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TransportError::Transient(format!("timed out: {err}"))
                } else {
                    TransportError::Transient(format!("request failed: {err}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| TransportError::Transient(format!("unreadable response: {err}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransportError::Transient("response carried no choices".to_string()))
    }
}
