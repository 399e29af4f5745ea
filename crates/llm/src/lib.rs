use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;

// ── Chat message types for structured tool calling ───────────────────────────

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a chat conversation, compatible with the
/// `/chat/completions` wire format used by OpenAI-style providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    /// Tool calls requested by the assistant (only present on assistant messages).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// When role == Tool, identifies which tool call this result is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: ChatRole::Tool, content: Some(content.into()), tool_calls: vec![], tool_call_id: Some(tool_call_id.into()) }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call (used to correlate tool results).
    #[serde(default)]
    pub id: String,
    /// Always "function" for OpenAI-compatible APIs.
    #[serde(default = "default_tool_call_type")]
    pub r#type: String,
    pub function: ToolCallFunction,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Arguments as a JSON string on the wire; normalized to a parsed value
    /// for downstream consumers.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Response from a chat-completion call.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Text content of the assistant's response (may be empty if tool_calls present).
    pub content: String,
    /// Tool calls the assistant wants to make (empty if a normal text response).
    pub tool_calls: Vec<ToolCall>,
    /// Finish reason: "stop", "tool_calls", "length", etc.
    pub finish_reason: String,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),
    #[error("llm request timed out")]
    Timeout,
    #[error("llm returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Generation knobs for a single call.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self { max_tokens: 1024, temperature: 0.7 }
    }
}

/// Chat-completion provider contract.  The runtime holds this behind an
/// `Arc<dyn ChatProvider>` so workers and the hot path share one client.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError>;

    async fn chat_completion_with_tools(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &serde_json::Value,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError>;

    /// Streaming variant: text tokens are sent over `tx` as they arrive and
    /// the full response is returned once the stream ends.
    async fn chat_completion_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<ChatResponse, LlmError>;
}

// ── OpenAI-compatible HTTP client ─────────────────────────────────────────────

/// Client for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenRouter, LM Studio, vLLM, Ollama's compat layer).
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn payload(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
        options: ChatOptions,
        stream: bool,
    ) -> serde_json::Value {
        let mut payload = json!({
            "model": model,
            "messages": messages_to_wire(messages),
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        if let Some(tools_val) = tools {
            payload["tools"] = tools_val.clone();
        }
        if stream {
            payload["stream"] = json!(true);
        }
        payload
    }

    async fn send(&self, payload: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let mut request = self.client.post(self.endpoint()).json(payload);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Request(err.to_string())
            }
        })?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| LlmError::Request(err.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let payload = self.payload(model, messages, None, options, false);
        let body = self.send(&payload).await?;
        Ok(parse_chat_response(&body))
    }

    async fn chat_completion_with_tools(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &serde_json::Value,
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let payload = self.payload(model, messages, Some(tools), options, false);
        let body = self.send(&payload).await?;
        Ok(parse_chat_response(&body))
    }

    async fn chat_completion_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<ChatResponse, LlmError> {
        let payload = self.payload(model, messages, None, options, true);

        let mut request = self.client.post(self.endpoint()).json(&payload);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let mut response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Request(err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut full_response = String::new();
        let mut finish_reason = "stop".to_string();
        // Accumulate tool call deltas by index: (id, name, arguments).
        let mut tool_call_map: HashMap<usize, (String, String, String)> = HashMap::new();
        let mut carry = String::new();

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| LlmError::Request(err.to_string()))?
        {
            carry.push_str(&String::from_utf8_lossy(&chunk));
            // SSE frames are newline-delimited; keep a partial trailing line
            // in `carry` for the next chunk.
            while let Some(newline) = carry.find('\n') {
                let line = carry[..newline].trim().to_string();
                carry.drain(..=newline);
                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else { continue };
                let Ok(frame) = serde_json::from_str::<serde_json::Value>(data) else { continue };
                let Some(choice) = frame.get("choices").and_then(|c| c.get(0)) else { continue };

                if let Some(fr) = choice.get("finish_reason").and_then(|v| v.as_str()) {
                    finish_reason = fr.to_string();
                }
                let Some(delta) = choice.get("delta") else { continue };

                if let Some(content) = delta.get("content").and_then(|v| v.as_str()) {
                    if !content.is_empty() {
                        full_response.push_str(content);
                        let _ = tx.send(content.to_string()).await;
                    }
                }

                if let Some(tcs) = delta.get("tool_calls").and_then(|v| v.as_array()) {
                    for tc in tcs {
                        let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                        let entry = tool_call_map.entry(idx).or_default();
                        if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                            entry.0 = id.to_string();
                        }
                        if let Some(func) = tc.get("function") {
                            if let Some(name) = func.get("name").and_then(|v| v.as_str()) {
                                // Name arrives once in the first delta, not
                                // incrementally — assign rather than append.
                                entry.1 = name.to_string();
                            }
                            if let Some(args) = func.get("arguments").and_then(|v| v.as_str()) {
                                entry.2.push_str(args);
                            }
                        }
                    }
                }
            }
        }

        let mut tool_calls: Vec<ToolCall> = Vec::new();
        if !tool_call_map.is_empty() {
            let mut indices: Vec<usize> = tool_call_map.keys().copied().collect();
            indices.sort();
            for idx in indices {
                let (id, name, args_str) = &tool_call_map[&idx];
                let arguments = serde_json::from_str(args_str).unwrap_or(json!({}));
                tool_calls.push(ToolCall {
                    id: if id.is_empty() { format!("call_{idx}") } else { id.clone() },
                    r#type: "function".to_string(),
                    function: ToolCallFunction { name: name.clone(), arguments },
                });
            }
            if finish_reason == "stop" {
                finish_reason = "tool_calls".to_string();
            }
        }

        Ok(ChatResponse {
            content: full_response,
            tool_calls,
            finish_reason,
        })
    }
}

/// Convert a `ChatMessage` array to the OpenAI-compatible wire format.
fn messages_to_wire(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages.iter().map(|m| {
        let role = match m.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        };
        let mut msg = json!({ "role": role });
        match &m.content {
            Some(content) => msg["content"] = json!(content),
            None => msg["content"] = json!(null),
        }
        if !m.tool_calls.is_empty() {
            let calls: Vec<serde_json::Value> = m.tool_calls.iter().map(|tc| {
                json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.function.name,
                        "arguments": if tc.function.arguments.is_string() {
                            tc.function.arguments.clone()
                        } else {
                            json!(tc.function.arguments.to_string())
                        }
                    }
                })
            }).collect();
            msg["tool_calls"] = json!(calls);
        }
        if let Some(ref id) = m.tool_call_id {
            msg["tool_call_id"] = json!(id);
        }
        msg
    }).collect()
}

/// Parse an OpenAI-compatible `/chat/completions` non-streaming response.
fn parse_chat_response(body: &serde_json::Value) -> ChatResponse {
    let choice = body.get("choices").and_then(|c| c.get(0));
    let message = choice.and_then(|c| c.get("message"));

    let content = message
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|v| v.as_str())
        .unwrap_or("stop")
        .to_string();

    let tool_calls = message
        .and_then(|m| m.get("tool_calls"))
        .and_then(|v| v.as_array())
        .map(|calls| {
            calls.iter().enumerate().filter_map(|(i, tc)| {
                let id = tc.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let func = tc.get("function")?;
                let name = func.get("name")?.as_str()?.to_string();
                let arguments = func.get("arguments")
                    .map(|v| {
                        if let Some(s) = v.as_str() {
                            serde_json::from_str(s).unwrap_or(json!({}))
                        } else {
                            v.clone()
                        }
                    })
                    .unwrap_or(json!({}));
                Some(ToolCall {
                    id: if id.is_empty() { format!("call_{i}") } else { id },
                    r#type: "function".to_string(),
                    function: ToolCallFunction { name, arguments },
                })
            }).collect::<Vec<_>>()
        })
        .unwrap_or_default();

    ChatResponse { content, tool_calls, finish_reason }
}

// ── Structured output extraction ──────────────────────────────────────────────

/// Extract the first valid JSON payload from an LLM response.
///
/// Strategy 1 looks for fenced ` ```json ... ``` ` blocks; strategy 2 falls
/// back to the span between the first `{` and the last `}`.  Returns `None`
/// when neither parses — callers abort that specific action rather than act
/// on a broken payload.
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    let trimmed = response.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                let candidate = &trimmed[start..=end];
                if let Ok(val) = serde_json::from_str(candidate) {
                    return Some(val);
                }
            }
        }
    }

    None
}

// ── Tests ────────────────────────────────────────────────────────────────────
