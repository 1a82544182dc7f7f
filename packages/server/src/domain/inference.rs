//! Inference provider interface.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{AiChatEntry, ApiRecord, EngineMode, InferenceError};

/// Receives generated text fragments while a streamed call is in flight
pub type TokenSink = mpsc::UnboundedSender<String>;

/// Everything a provider needs to produce the next AI turn.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub api: ApiRecord,
    pub engine_mode: EngineMode,
    pub model: String,
    pub character_name: String,
    /// Display name of the client that triggered the request
    pub user_name: String,
    /// Active session history, oldest first
    pub history: Vec<AiChatEntry>,
    pub d1jb: String,
    pub instruct_sequences: Value,
    pub samplers: Value,
    pub response_length: u32,
    pub context_size: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Non-streamed call returning the complete response text
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError>;

    /// Streamed call. Every fragment is sent to `tokens`, which is dropped
    /// when the call returns.
    ///
    /// Returns `Ok(None)` when the provider closed the stream without a
    /// final response object, `Ok(Some(text))` when it delivered one.
    async fn stream(
        &self,
        request: &InferenceRequest,
        tokens: TokenSink,
    ) -> Result<Option<String>, InferenceError>;

    async fn list_models(&self, api: &ApiRecord) -> Result<Vec<String>, InferenceError>;

    /// Issue a minimal request to check that `api` is reachable
    async fn test_api(&self, api: &ApiRecord) -> Result<String, InferenceError>;
}
