//! Client for a local Ollama server.
//!
//! All inference stays on the machine: the client only talks to the
//! configured host, which defaults to the loopback address.

use crate::ai::{intent_prompt, parse_verdict, INTENT_SYSTEM_PROMPT};
use crate::config::AiConfig;
use crate::core::intent::{IntentJudge, Verdict};
use crate::error::JudgeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Ollama client error types.
#[derive(Debug)]
pub enum AiError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// Response could not be decoded
    Serialization(String),
    /// The model answered with nothing
    EmptyResponse,
}

impl std::fmt::Display for AiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiError::Config(msg) => write!(f, "Ollama config error: {msg}"),
            AiError::Network(msg) => write!(f, "Ollama network error: {msg}"),
            AiError::Server { status, message } => {
                write!(f, "Ollama server error ({status}): {message}")
            }
            AiError::Serialization(msg) => write!(f, "Ollama serialization error: {msg}"),
            AiError::EmptyResponse => write!(f, "Ollama returned an empty response"),
        }
    }
}

impl std::error::Error for AiError {}

impl From<AiError> for JudgeError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::Config(_) | AiError::Network(_) => JudgeError::Unavailable(err.to_string()),
            _ => JudgeError::Request(err.to_string()),
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images for vision models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            images: None,
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

/// Non-streaming response of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

/// Response of `GET /api/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

/// One locally installed model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelTag {
    pub name: String,
}

fn build_messages(prompt: &str, system: Option<&str>, image: &[u8]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(ChatMessage::new("system", system));
    }
    let mut user = ChatMessage::new("user", prompt);
    user.images = Some(vec![STANDARD.encode(image)]);
    messages.push(user);
    messages
}

/// Async Ollama client.
pub struct OllamaClient {
    config: AiConfig,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new client.
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AiError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.host.trim_end_matches('/')
    }

    /// Get the chat endpoint URL.
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url())
    }

    /// Get the model listing endpoint URL.
    pub fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    /// Whether the server is reachable and has the vision model installed.
    pub async fn is_available(&self) -> Result<bool, AiError> {
        let response = self
            .client
            .get(self.tags_url())
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| AiError::Serialization(e.to_string()))?;

        let available = tags
            .models
            .iter()
            .any(|m| m.name.contains(&self.config.vision_model));
        if !available {
            tracing::warn!(
                vision_model = %self.config.vision_model,
                "Configured Ollama vision model not installed"
            );
        }
        Ok(available)
    }

    async fn send_chat(
        &self,
        request: &ChatRequest,
        timeout: std::time::Duration,
    ) -> Result<String, AiError> {
        let response = self
            .client
            .post(self.chat_url())
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AiError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::Serialization(e.to_string()))?;

        if chat.message.content.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        Ok(chat.message.content)
    }

    /// Ask the vision model about an image. Gets twice the normal timeout.
    pub async fn analyze_image(
        &self,
        image: &[u8],
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, AiError> {
        let request = ChatRequest {
            model: self.config.vision_model.clone(),
            messages: build_messages(prompt, system, image),
            stream: false,
        };
        self.send_chat(&request, self.config.timeout * 2).await
    }

    /// Judge whether a screenshot matches the declared intent.
    pub async fn check_intent_match(&self, intent: &str, image: &[u8]) -> Result<Verdict, AiError> {
        let answer = self
            .analyze_image(image, &intent_prompt(intent), Some(INTENT_SYSTEM_PROMPT))
            .await?;
        Ok(parse_verdict(&answer))
    }
}

/// Blocking Ollama client for use from worker threads.
pub struct BlockingOllamaClient {
    inner: OllamaClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingOllamaClient {
    /// Create a new blocking client.
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AiError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: OllamaClient::new(config)?,
            runtime,
        })
    }

    pub fn is_available(&self) -> Result<bool, AiError> {
        self.runtime.block_on(self.inner.is_available())
    }

    pub fn check_intent_match(&self, intent: &str, image: &[u8]) -> Result<Verdict, AiError> {
        self.runtime
            .block_on(self.inner.check_intent_match(intent, image))
    }
}

impl IntentJudge for BlockingOllamaClient {
    fn judge(&self, intent: &str, visual_context: &[u8]) -> Result<Verdict, JudgeError> {
        self.check_intent_match(intent, visual_context)
            .map_err(JudgeError::from)
    }
}
