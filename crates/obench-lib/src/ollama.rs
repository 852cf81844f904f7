//! Client for the local Ollama HTTP daemon.

use std::time::Duration;

use async_trait::async_trait;
use obench_types::{ModelSummary, RuntimeInfo, Stats};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::model::{parse_param_size, runtime_info, runtime_usage};

/// Text and stats returned by one chat call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub stats: Stats,
}

/// Memory placement of a loaded model as listed by the process endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEntry {
    pub size: u64,
    pub size_vram: u64,
    pub context_length: Option<u64>,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The daemon answered with an `error` field
    #[error("{0}")]
    Daemon(String),

    #[error("Empty response (hit token limit at num_predict={num_predict})")]
    TokenLimit { num_predict: u32 },

    #[error("Empty response")]
    EmptyResponse,
}

/// The inference operations the runner depends on.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Send one user message and return the reply text and stats.
    async fn chat(&self, model: &str, prompt: &str) -> Result<ChatReply, InferenceError>;

    /// Models available on the daemon.
    async fn list_models(&self) -> Result<Vec<ModelSummary>, InferenceError>;

    /// Process-list entry for a loaded model, `None` when it is not loaded.
    async fn process_entry(&self, model: &str) -> Result<Option<ProcessEntry>, InferenceError>;

    /// Architecture metadata for a model, `None` when the daemon returns none.
    async fn model_info(&self, model: &str) -> Result<Option<Map<String, Value>>, InferenceError>;

    /// Where a loaded model lives, with its context estimate when metadata is available.
    ///
    /// `None` when the model is not loaded or reports no memory. Metadata failures only
    /// drop the estimate.
    async fn runtime_info(&self, model: &str) -> Result<Option<RuntimeInfo>, InferenceError> {
        let Some(process) = self.process_entry(model).await? else {
            return Ok(None);
        };
        let info = match self.model_info(model).await {
            Ok(info) => info,
            Err(err) => {
                debug!(model, error = %err, "Model metadata unavailable");
                None
            }
        };
        Ok(runtime_info(&process, info.as_ref()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<Value>,
    #[serde(default)]
    eval_count: Option<Value>,
    #[serde(default)]
    prompt_eval_duration: Option<Value>,
    #[serde(default)]
    eval_duration: Option<Value>,
    #[serde(default)]
    total_duration: Option<Value>,
    #[serde(default)]
    load_duration: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    #[serde(default)]
    size: Option<Value>,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct TagDetails {
    #[serde(default)]
    parameter_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PsResponse {
    #[serde(default)]
    models: Vec<PsEntry>,
}

#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    size: Option<Value>,
    #[serde(default)]
    size_vram: Option<Value>,
    #[serde(default)]
    context_length: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ShowResponse {
    #[serde(default)]
    model_info: Option<Map<String, Value>>,
}

/// Non-negative integer from a JSON number, rounding floats.
fn as_count(value: Option<&Value>) -> Option<u64> {
    let value = value?;
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0)
        .map(|f| f.round() as u64)
}

impl ChatResponse {
    fn stats(&self) -> Stats {
        Stats {
            prompt_eval_count: as_count(self.prompt_eval_count.as_ref()),
            eval_count: as_count(self.eval_count.as_ref()),
            prompt_eval_duration: as_count(self.prompt_eval_duration.as_ref()),
            eval_duration: as_count(self.eval_duration.as_ref()),
            total_duration: as_count(self.total_duration.as_ref()),
            load_duration: as_count(self.load_duration.as_ref()),
        }
    }

    /// Turns a decoded reply into text, or the reason there is none.
    fn into_reply(self, num_predict: u32) -> Result<ChatReply, InferenceError> {
        if let Some(error) = self.error.as_ref().filter(|e| !e.is_empty()) {
            return Err(InferenceError::Daemon(error.clone()));
        }
        let stats = self.stats();
        let (content, thinking) = match self.message {
            Some(message) => (
                message.content.unwrap_or_default(),
                message.thinking.unwrap_or_default(),
            ),
            None => (String::new(), String::new()),
        };
        if content.trim().is_empty() {
            if !thinking.is_empty() && self.done_reason.as_deref() == Some("length") {
                return Err(InferenceError::TokenLimit { num_predict });
            }
            return Err(InferenceError::EmptyResponse);
        }
        Ok(ChatReply {
            text: content,
            stats,
        })
    }
}

/// HTTP client for one Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    num_predict: u32,
}

impl OllamaClient {
    /// `base_url` is scheme, host and port, e.g. `http://127.0.0.1:11434`.
    pub fn new(
        base_url: impl Into<String>,
        num_predict: u32,
        timeout: Duration,
    ) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(InferenceError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            num_predict,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn num_predict(&self) -> u32 {
        self.num_predict
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, InferenceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let body = if body.trim().is_empty() {
            "Failed to call Ollama".to_string()
        } else {
            body
        };
        Err(InferenceError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, InferenceError> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| InferenceError::Transport {
                url: url.clone(),
                source,
            })?;
        Self::check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|source| InferenceError::Decode { url, source })
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, InferenceError> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| InferenceError::Transport {
                url: url.clone(),
                source,
            })?;
        Self::check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|source| InferenceError::Decode { url, source })
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    #[instrument(skip(self, prompt), fields(num_predict = self.num_predict))]
    async fn chat(&self, model: &str, prompt: &str) -> Result<ChatReply, InferenceError> {
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: ChatOptions {
                temperature: 0.0,
                num_predict: self.num_predict,
            },
        };
        let response: ChatResponse = self.post_json("/api/chat", &request).await?;
        let reply = response.into_reply(self.num_predict)?;
        debug!(
            chars = reply.text.len(),
            eval_count = ?reply.stats.eval_count,
            "Received chat reply"
        );
        Ok(reply)
    }

    async fn list_models(&self) -> Result<Vec<ModelSummary>, InferenceError> {
        let tags: TagsResponse = self.get_json("/api/tags").await?;
        let models = tags
            .models
            .into_iter()
            .map(|entry| {
                let parameter_size_text = entry
                    .details
                    .and_then(|d| d.parameter_size)
                    .unwrap_or_default();
                ModelSummary {
                    size_b: parse_param_size(&parameter_size_text),
                    size_bytes: as_count(entry.size.as_ref()),
                    name: entry.name,
                    parameter_size_text,
                }
            })
            .collect::<Vec<_>>();
        debug!(count = models.len(), "Listed models");
        Ok(models)
    }

    async fn process_entry(&self, model: &str) -> Result<Option<ProcessEntry>, InferenceError> {
        let ps: PsResponse = self.get_json("/api/ps").await?;
        let entry = ps
            .models
            .iter()
            .find(|entry| entry.name.as_deref() == Some(model))
            .or_else(|| {
                ps.models
                    .iter()
                    .find(|entry| entry.model.as_deref() == Some(model))
            });
        let Some(entry) = entry else {
            debug!(model, "Model not present in process list");
            return Ok(None);
        };
        let process = ProcessEntry {
            size: as_count(entry.size.as_ref()).unwrap_or(0),
            size_vram: as_count(entry.size_vram.as_ref()).unwrap_or(0),
            context_length: as_count(entry.context_length.as_ref()),
        };
        if runtime_usage(&process).is_none() {
            warn!(model, size = process.size, "Process entry reports no memory usage");
        }
        Ok(Some(process))
    }

    async fn model_info(&self, model: &str) -> Result<Option<Map<String, Value>>, InferenceError> {
        let show: ShowResponse = self.post_json("/api/show", &json!({ "name": model })).await?;
        Ok(show.model_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(value: Value) -> ChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_reply_carries_stats() {
        let reply = response(json!({
            "message": {"role": "assistant", "content": "5"},
            "prompt_eval_count": 12,
            "eval_count": 3,
            "eval_duration": 1.5e9,
        }))
        .into_reply(100)
        .unwrap();
        assert_eq!(reply.text, "5");
        assert_eq!(reply.stats.prompt_eval_count, Some(12));
        assert_eq!(reply.stats.eval_duration, Some(1_500_000_000));
        assert_eq!(reply.stats.total_duration, None);
    }

    #[test]
    fn test_error_field_wins() {
        let err = response(json!({"error": "model not found"}))
            .into_reply(100)
            .unwrap_err();
        assert_eq!(err.to_string(), "model not found");
    }

    #[test]
    fn test_empty_reply_reports_token_limit_only_when_thinking_ran_out() {
        let err = response(json!({
            "message": {"content": "", "thinking": "Let me think..."},
            "done_reason": "length",
        }))
        .into_reply(20000)
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Empty response (hit token limit at num_predict=20000)"
        );

        let err = response(json!({
            "message": {"content": ""},
            "done_reason": "length",
        }))
        .into_reply(20000)
        .unwrap_err();
        assert_eq!(err.to_string(), "Empty response");

        let err = response(json!({})).into_reply(1).unwrap_err();
        assert!(matches!(err, InferenceError::EmptyResponse));
    }

    #[test]
    fn test_whitespace_only_reply_is_empty() {
        let err = response(json!({"message": {"content": "  \n\t "}}))
            .into_reply(100)
            .unwrap_err();
        assert!(matches!(err, InferenceError::EmptyResponse));
    }

    #[test]
    fn test_request_payload_shape() {
        let request = ChatRequest {
            model: "llama3",
            messages: [ChatMessage {
                role: "user",
                content: "Compute: 1+1.",
            }],
            stream: false,
            options: ChatOptions {
                temperature: 0.0,
                num_predict: 20000,
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "llama3",
                "messages": [{"role": "user", "content": "Compute: 1+1."}],
                "stream": false,
                "options": {"temperature": 0.0, "num_predict": 20000}
            })
        );
    }
}
