//! OpenAI-compatible completion endpoints over HTTP.
//!
//! Text completion posts to `/v1/completions`, chat completion to
//! `/v1/chat/completions`. Streamed calls read server-sent events line by
//! line until `data: [DONE]` or the end of the body.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Map, Value, json};

use super::prompt::{build_chat_messages, build_text_prompt, stop_sequences};
use crate::domain::{
    ApiRecord, EngineMode, InferenceError, InferenceProvider, InferenceRequest, TokenSink,
};

pub struct HttpCompletionProvider {
    client: reqwest::Client,
}

impl HttpCompletionProvider {
    pub fn new(request_timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| InferenceError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    async fn post(
        &self,
        api: &ApiRecord,
        path: &str,
        body: &Value,
    ) -> Result<reqwest::Response, InferenceError> {
        let url = format!("{}{}", base_url(&api.endpoint), path);
        tracing::debug!("POST {}", url);
        let mut builder = self.client.post(&url).json(body);
        if !api.key.is_empty() {
            builder = builder.bearer_auth(&api.key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(InferenceError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Normalize a stored endpoint (`localhost:5000`, `http://host/v1/`) to a base URL
pub fn base_url(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    with_scheme
        .strip_suffix("/v1")
        .map(str::to_string)
        .unwrap_or(with_scheme)
}

fn ensure_supported(mode: EngineMode, api: &ApiRecord) -> Result<(), InferenceError> {
    if api.claude {
        return Err(InferenceError::Unsupported("claude".to_string()));
    }
    match mode {
        EngineMode::TextCompletion | EngineMode::ChatCompletion => Ok(()),
        EngineMode::Horde => Err(InferenceError::Unsupported("horde".to_string())),
    }
}

fn endpoint_path(mode: EngineMode) -> &'static str {
    match mode {
        EngineMode::ChatCompletion => "/v1/chat/completions",
        _ => "/v1/completions",
    }
}

/// Request body: sampler preset fields overlaid with the prompt and limits
fn request_body(request: &InferenceRequest, stream: bool) -> Value {
    let mut body = match &request.samplers {
        Value::Object(samplers) => samplers.clone(),
        _ => Map::new(),
    };
    match request.engine_mode {
        EngineMode::ChatCompletion => {
            body.insert(
                "messages".to_string(),
                Value::Array(build_chat_messages(request)),
            );
        }
        _ => {
            body.insert("prompt".to_string(), json!(build_text_prompt(request)));
            body.insert("stop".to_string(), json!(stop_sequences(request)));
        }
    }
    body.insert("max_tokens".to_string(), json!(request.response_length));
    body.insert("stream".to_string(), json!(stream));
    if !request.model.is_empty() {
        body.insert("model".to_string(), json!(request.model));
    }
    Value::Object(body)
}

/// Text of a non-streamed response
fn response_text(mode: EngineMode, value: &Value) -> Option<String> {
    let choice = value.get("choices")?.get(0)?;
    let text = match mode {
        EngineMode::ChatCompletion => choice.get("message")?.get("content")?,
        _ => choice.get("text")?,
    };
    text.as_str().map(str::to_string)
}

/// Fragment carried by one streamed event
fn delta_text(mode: EngineMode, value: &Value) -> Option<&str> {
    let choice = value.get("choices")?.get(0)?;
    match mode {
        EngineMode::ChatCompletion => choice.get("delta")?.get("content")?.as_str(),
        _ => choice.get("text")?.as_str(),
    }
}

#[async_trait]
impl InferenceProvider for HttpCompletionProvider {
    async fn complete(&self, request: &InferenceRequest) -> Result<String, InferenceError> {
        ensure_supported(request.engine_mode, &request.api)?;
        let body = request_body(request, false);
        let response = self
            .post(&request.api, endpoint_path(request.engine_mode), &body)
            .await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        response_text(request.engine_mode, &value)
            .ok_or_else(|| InferenceError::InvalidResponse(value.to_string()))
    }

    async fn stream(
        &self,
        request: &InferenceRequest,
        tokens: TokenSink,
    ) -> Result<Option<String>, InferenceError> {
        ensure_supported(request.engine_mode, &request.api)?;
        let body = request_body(request, true);
        let response = self
            .post(&request.api, endpoint_path(request.engine_mode), &body)
            .await?;

        let mut byte_stream = response.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| InferenceError::Request(e.to_string()))?;
            buf.extend_from_slice(&chunk);

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line = String::from_utf8_lossy(&buf[..pos]).trim().to_string();
                buf.drain(..=pos);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    return Ok(None);
                }
                match serde_json::from_str::<Value>(data) {
                    Ok(event) => {
                        if let Some(fragment) = delta_text(request.engine_mode, &event) {
                            if !fragment.is_empty() && tokens.send(fragment.to_string()).is_err() {
                                tracing::debug!("Token receiver dropped, discarding fragment");
                            }
                        }
                    }
                    Err(e) => tracing::debug!("Skipping unparsable stream event: {}", e),
                }
            }
        }
        Ok(None)
    }

    async fn list_models(&self, api: &ApiRecord) -> Result<Vec<String>, InferenceError> {
        ensure_supported(api.endpoint_type, api)?;
        let url = format!("{}/v1/models", base_url(&api.endpoint));
        let mut builder = self.client.get(&url);
        if !api.key.is_empty() {
            builder = builder.bearer_auth(&api.key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;
        let value: Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        let models = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| InferenceError::InvalidResponse(value.to_string()))?
            .iter()
            .filter_map(|m| m.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        Ok(models)
    }

    async fn test_api(&self, api: &ApiRecord) -> Result<String, InferenceError> {
        ensure_supported(api.endpoint_type, api)?;
        let body = match api.endpoint_type {
            EngineMode::ChatCompletion => json!({
                "messages": [{"role": "user", "content": "Hello"}],
                "max_tokens": 5,
            }),
            _ => json!({"prompt": "Hello", "max_tokens": 5}),
        };
        let response = self
            .post(api, endpoint_path(api.endpoint_type), &body)
            .await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;
        response_text(api.endpoint_type, &value)
            .ok_or_else(|| InferenceError::InvalidResponse(value.to_string()))
    }
}
