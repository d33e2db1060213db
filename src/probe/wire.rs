//! OpenAI-compatible wire types.
//!
//! Request structs serialize exactly the fields the probes send.
//! Response structs deserialize leniently: every field an endpoint may
//! omit is optional, unknown fields are ignored, and tool-call arguments
//! arrive either as a native JSON object or as a JSON-encoded string.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The fixed two-operand invocation the conformance probe requests.
#[derive(Debug, Clone)]
pub struct ToolCallCheck {
    pub tool_name: String,
    pub a: i64,
    pub b: i64,
}

impl Default for ToolCallCheck {
    fn default() -> Self {
        Self {
            tool_name: "add".to_string(),
            a: 2,
            b: 3,
        }
    }
}

/// Chat request instructing the model to call `tool_name(a, b)`.
///
/// Temperature is pinned to zero for determinism; tool choice stays
/// automatic so noncompliant models reveal themselves instead of being
/// forced into the call.
pub fn tool_call_request(model: &str, check: &ToolCallCheck) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user(format!(
            "Call tool {} with a={} and b={}.",
            check.tool_name, check.a, check.b
        ))],
        tools: Some(vec![ToolSpec {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: check.tool_name.clone(),
                description: "Add two integers".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                    "required": ["a", "b"],
                }),
            },
        }]),
        tool_choice: Some("auto".to_string()),
        temperature: Some(0.0),
        max_tokens: None,
    }
}

/// Plain completion request used by the latency probe.
pub fn completion_request(model: &str, prompt: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage::user(prompt)],
        tools: None,
        tool_choice: None,
        temperature: None,
        max_tokens: Some(64),
    }
}

// ── Responses ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// First choice's message, or an empty one when the endpoint sent
    /// no choices; validation then reports the missing tool call.
    pub fn first_message(&self) -> ResponseMessage {
        self.choices
            .first()
            .map(|choice| choice.message.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub function: Option<FunctionCall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<RawArguments>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub completion_tokens: Option<u64>,
}

// ── Tool-call arguments ──────────────────────────────────────────

/// Tool-call arguments as they appear on the wire.
///
/// Runtimes disagree on whether `function.arguments` is a JSON object or
/// a JSON-encoded string; both are compliant and normalize to the same
/// mapping. Anything else is rejected with a reason naming its type.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawArguments {
    Object(Map<String, Value>),
    Text(String),
    Other(Value),
}

impl RawArguments {
    /// Normalize to one key/value mapping, or explain why that failed.
    pub fn normalize(&self) -> Result<Map<String, Value>, String> {
        match self {
            RawArguments::Object(map) => Ok(map.clone()),
            RawArguments::Text(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err("arguments JSON is not an object".to_string()),
                Err(err) => Err(format!("arguments not valid JSON ({err})")),
            },
            RawArguments::Other(value) => {
                Err(format!("unsupported arguments type: {}", json_kind(value)))
            }
        }
    }
}

/// Human name for a JSON value's type, used in diagnostics.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ────────────────────────────────────────────────────────
