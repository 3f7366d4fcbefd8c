//! Wire types for the research backend protocol.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Serialize)]
pub struct StartRequest<'a> {
    pub message: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResumeRequest<'a> {
    pub thread_id: &'a str,
    pub choice: &'a str,
    pub user_input: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ContinueRequest<'a> {
    pub thread_id: &'a str,
    pub message: &'a str,
}

/// Workflow state values as reported by the backend.
///
/// Only the fields the client acts on are typed; everything else the backend
/// tracks (plan, findings, analysis, ...) is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub final_response: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response shared by `start`, `resume`, `continue`, and `get_state`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    /// Present on `start`; other calls may omit it.
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub state: Option<WorkflowState>,
    /// Graph nodes still pending execution.
    #[serde(default, deserialize_with = "deserialize_nullable_list")]
    pub next: Vec<String>,
    /// `None` when the field is missing, which makes the response malformed.
    #[serde(default, deserialize_with = "deserialize_truthy")]
    pub requires_input: Option<bool>,
    #[serde(default)]
    pub interrupt_message: Option<String>,
    /// Top-level mirror of `state.current_step` (not sent by `start`).
    #[serde(default)]
    pub current_step: Option<String>,
}

impl WorkflowResponse {
    /// Returns the authoritative step, preferring `state.current_step`.
    pub fn current_step(&self) -> Option<&str> {
        self.state
            .as_ref()
            .and_then(|state| state.current_step.as_deref())
            .or(self.current_step.as_deref())
            .map(str::trim)
            .filter(|step| !step.is_empty())
    }

    /// Returns the completed textual output, if any.
    pub fn final_response(&self) -> Option<&str> {
        self.state
            .as_ref()
            .and_then(|state| state.final_response.as_deref())
            .filter(|text| !text.trim().is_empty())
    }

    /// Returns the interrupt prompt when it is present and non-blank.
    pub fn interrupt_message(&self) -> Option<&str> {
        self.interrupt_message
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }
}

/// Response of `conversation_history/{thread_id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_nullable_list")]
    pub conversation_history: Vec<Value>,
}

/// Raw `data:` payload of a stream event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamPayload {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub done: bool,
    /// Optional monotonically increasing sequence number.
    #[serde(default)]
    pub seq: Option<u64>,
    /// Graph node that produced the content.
    #[serde(default)]
    pub node: Option<String>,
}

/// Normalized stream item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Incremental assistant content.
    Delta { text: String, seq: Option<u64> },
    /// Server signalled the end of the stream.
    Done,
    /// Server reported a failure in-band.
    Error { message: String },
}

/// Interprets a JSON value the way the backend's truthiness checks do.
///
/// The backend computes `requires_input` as `next and len(next) > 0`, which
/// serializes as `[]` when nothing is pending.
fn deserialize_truthy<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let truthy = match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(flag) => flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    };
    Ok(Some(truthy))
}

fn deserialize_nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
