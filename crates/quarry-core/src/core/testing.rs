//! Scripted in-memory backend for session tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures_util::StreamExt;
use serde_json::Map;

use crate::backend::{
    BackendError, BackendErrorKind, BackendResult, ChunkStream, HistoryResponse, ResearchBackend,
    StreamChunk, WorkflowResponse, WorkflowState,
};

pub const PLAN_PROMPT: &str = "## Research Query Analysis\n\nI've analyzed your question: \
    **\"Explain quantum computing\"**\n\nPlease choose how you'd like me to proceed:";
pub const DIRECTION_PROMPT: &str = "## Research Direction Refinement\n\nWould you like me to \
    explore any specific angle further?";
pub const FORMAT_PROMPT: &str = "## Research Complete - Choose Response Format\n\nWhich \
    presentation style would be most helpful for you?";

/// Response that pauses with `prompt`.
pub fn interrupted(thread_id: Option<&str>, step: &str, prompt: &str) -> WorkflowResponse {
    WorkflowResponse {
        thread_id: thread_id.map(str::to_string),
        state: Some(WorkflowState {
            current_step: Some(step.to_string()),
            final_response: None,
            extra: Map::new(),
        }),
        next: vec!["interrupt".to_string()],
        requires_input: Some(true),
        interrupt_message: Some(prompt.to_string()),
        current_step: None,
    }
}

/// Response carrying completed output.
pub fn completed(step: &str, text: &str) -> WorkflowResponse {
    WorkflowResponse {
        thread_id: None,
        state: Some(WorkflowState {
            current_step: Some(step.to_string()),
            final_response: Some(text.to_string()),
            extra: Map::new(),
        }),
        next: Vec::new(),
        requires_input: Some(false),
        interrupt_message: None,
        current_step: Some(step.to_string()),
    }
}

type ScriptedStream = BackendResult<Vec<BackendResult<StreamChunk>>>;

/// Backend that replays queued results and records every call.
///
/// `start`/`resume`/`follow_up` share one queue; `stream` and `get_state`
/// have their own. An empty queue answers with a network error.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<BackendResult<WorkflowResponse>>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    states: Mutex<VecDeque<BackendResult<WorkflowResponse>>>,
    /// Streams that never yield, for cancellation tests.
    hang_streams: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn push_response(&self, response: BackendResult<WorkflowResponse>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_stream(&self, stream: ScriptedStream) {
        self.streams.lock().unwrap().push_back(stream);
    }

    pub fn push_state(&self, state: BackendResult<WorkflowResponse>) {
        self.states.lock().unwrap().push_back(state);
    }

    pub fn hang_streams(&self) {
        *self.hang_streams.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn unscripted(call: &str) -> BackendError {
        BackendError::new(
            BackendErrorKind::Network,
            format!("no scripted result for {call}"),
        )
    }

    fn next_response(&self, call: &str) -> BackendResult<WorkflowResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted(call)))
    }
}

#[async_trait::async_trait]
impl ResearchBackend for ScriptedBackend {
    async fn start(&self, message: &str) -> BackendResult<WorkflowResponse> {
        self.record(format!("start:{message}"));
        self.next_response("start")
    }

    async fn resume(
        &self,
        thread_id: &str,
        choice: &str,
        user_input: &str,
    ) -> BackendResult<WorkflowResponse> {
        self.record(format!("resume:{thread_id}:{choice}:{user_input}"));
        self.next_response("resume")
    }

    async fn follow_up(&self, thread_id: &str, message: &str) -> BackendResult<WorkflowResponse> {
        self.record(format!("continue:{thread_id}:{message}"));
        self.next_response("continue")
    }

    async fn stream(&self, thread_id: &str, choice: &str) -> BackendResult<ChunkStream> {
        self.record(format!("stream:{thread_id}:{choice}"));
        if *self.hang_streams.lock().unwrap() {
            return Ok(futures_util::stream::pending().boxed());
        }
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("stream")))?;
        Ok(futures_util::stream::iter(chunks).boxed())
    }

    async fn get_state(&self, thread_id: &str) -> BackendResult<WorkflowResponse> {
        self.record(format!("get_state:{thread_id}"));
        self.states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("get_state")))
    }

    async fn conversation_history(&self, thread_id: &str) -> BackendResult<HistoryResponse> {
        self.record(format!("conversation_history:{thread_id}"));
        Ok(HistoryResponse {
            thread_id: Some(thread_id.to_string()),
            conversation_history: Vec::new(),
        })
    }
}
