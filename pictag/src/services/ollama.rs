//! Ollama inference client
//!
//! Non-streaming chat against `/api/chat` with optional base64 image
//! attachments and a JSON-schema `format` for structured output, plus
//! `/api/embeddings` for the similarity heuristic.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("pictag/", env!("CARGO_PKG_VERSION"));

/// Inference transport and protocol errors
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One message in a chat exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded image attachments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: None,
        }
    }

    pub fn user_with_image(content: impl Into<String>, jpeg_bytes: &[u8]) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: Some(vec![general_purpose::STANDARD.encode(jpeg_bytes)]),
        }
    }
}

/// Chat request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    /// JSON schema for structured output, omitted for free text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            format: None,
        }
    }

    pub fn with_format(mut self, schema: Value) -> Self {
        self.format = Some(schema);
        self
    }
}

/// Chat response body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    /// Prompt token count reported by the server
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    /// Completion token count reported by the server
    #[serde(default)]
    pub eval_count: Option<u64>,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

/// Multimodal inference seam
///
/// # Example
/// ```rust,ignore
/// use pictag::services::{ChatRequest, ChatResponse, InferenceClient, InferenceError};
///
/// pub struct CannedClient;
///
/// #[async_trait::async_trait]
/// impl InferenceClient for CannedClient {
///     async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, InferenceError> {
///         todo!()
///     }
///
///     async fn embeddings(&self, _model: &str, _prompt: &str) -> Result<Vec<f32>, InferenceError> {
///         todo!()
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait InferenceClient: Send + Sync {
    /// Submit a chat exchange, non-streaming
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, InferenceError>;

    /// Embed a prompt into a vector
    async fn embeddings(&self, model: &str, prompt: &str) -> Result<Vec<f32>, InferenceError>;
}

/// HTTP client for a local Ollama server
pub struct OllamaClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl InferenceClient for OllamaClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, InferenceError> {
        let url = format!("{}/api/chat", self.base_url);

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            structured = request.format.is_some(),
            "Sending chat request"
        );

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api(status.as_u16(), error_text));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;

        tracing::debug!(
            prompt_tokens = ?chat_response.prompt_eval_count,
            completion_tokens = ?chat_response.eval_count,
            "Chat response received"
        );

        Ok(chat_response)
    }

    async fn embeddings(&self, model: &str, prompt: &str) -> Result<Vec<f32>, InferenceError> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .json(&EmbeddingsRequest { model, prompt })
            .send()
            .await
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api(status.as_u16(), error_text));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;

        Ok(body.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::new("http://localhost:11434/", Duration::from_secs(120));
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url, "http://localhost:11434");
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let request = ChatRequest::new(
            "gemma3:4b",
            vec![ChatMessage::user_with_image("describe", &[0xFF, 0xD8])],
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gemma3:4b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["images"][0], "/9g=");
        // format is omitted entirely for free-text requests
        assert!(json.get("format").is_none());
    }

    #[test]
    fn test_format_schema_included_when_set() {
        let schema = serde_json::json!({"type": "object"});
        let request =
            ChatRequest::new("gemma3:4b", vec![ChatMessage::user("extract")]).with_format(schema);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["format"]["type"], "object");
        assert!(json["messages"][0].get("images").is_none());
    }

    #[test]
    fn test_chat_response_parses_token_counts() {
        let body = r#"{
            "model": "gemma3:4b",
            "message": {"role": "assistant", "content": "{\"tags\":[]}"},
            "done": true,
            "prompt_eval_count": 432,
            "eval_count": 101
        }"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.message.content, "{\"tags\":[]}");
        assert_eq!(response.prompt_eval_count, Some(432));
        assert_eq!(response.eval_count, Some(101));
    }

    #[test]
    fn test_chat_response_tolerates_missing_counts() {
        let body = r#"{"message": {"role": "assistant", "content": "hi"}}"#;
        let response: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.prompt_eval_count, None);
    }

    #[test]
    fn test_embeddings_response_shape() {
        let body = r#"{"embedding": [0.25, -0.5, 1.0]}"#;
        let parsed: EmbeddingsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.embedding, vec![0.25, -0.5, 1.0]);
    }
}
