//! LLM Connector interface: the uniform `generate`/`stream`/`health`
//! contract every provider binding exposes.
//!
//! This connector returns a single priced response per call — the Analyzer,
//! Specialist Verifier, and Presenter all issue one-shot structured-output
//! requests, not multi-turn tool-calling conversations, so there is no
//! intermediate event-stream model to thread through.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Other,
}

/// Token counts for a single `generate` call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenCount {
    pub input: u64,
    pub output: u64,
}

/// A single priced, non-streaming generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
    pub token_count: TokenCount,
    pub cost: f64,
    pub model_used: String,
    pub finish_reason: FinishReason,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Request-level generation parameters.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub temperature: f64,
    pub max_tokens: u32,
    /// Advisory only: callers must still defensively parse the response.
    pub json_mode: bool,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            json_mode: false,
        }
    }
}

impl GenerateParams {
    pub fn new(temperature: f64, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
            json_mode: false,
        }
    }

    pub fn json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// A transport/rate-limit/schema error from a connector call.
///
/// The orchestration core never retries internally (§4.2) — it treats a
/// failed specialist call as a structural verification failure. Retrying is
/// left to higher layers, if any.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectorError {
    #[error("[TRANSPORT_ERROR] {0}")]
    Transport(String),
    #[error("[RATE_LIMITED] {0}")]
    RateLimited(String),
    #[error("[SCHEMA_ERROR] {0}")]
    Schema(String),
}

impl ConnectorError {
    /// Transport and rate-limit errors are retriable by a higher layer;
    /// schema errors are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Schema(_))
    }
}

pub type ChunkStream = BoxStream<'static, Result<String, ConnectorError>>;

/// Uniform interface over LLM providers.
#[async_trait]
pub trait LlmConnector: Send + Sync {
    /// Provider/model label, used for cost records and tracing.
    fn model_id(&self) -> &str;

    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerateParams,
    ) -> Result<GenerateResponse, ConnectorError>;

    /// A lazy, finite, non-restartable sequence of content chunks.
    async fn stream(
        &self,
        messages: &[Message],
        params: &GenerateParams,
    ) -> Result<ChunkStream, ConnectorError>;

    /// Lightweight liveness probe.
    async fn health(&self) -> bool;
}
