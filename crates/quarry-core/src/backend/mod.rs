//! Research backend protocol and HTTP client.

mod http;
pub mod shared;
pub mod sse;
pub mod types;

use futures_util::stream::BoxStream;

pub use http::{BackendConfig, HttpBackend};
pub use shared::{
    BASE_URL_ENV, BackendError, BackendErrorKind, BackendResult, DEFAULT_BASE_URL,
    resolve_base_url,
};
pub use sse::StreamChunkParser;
pub use types::{HistoryResponse, StreamChunk, WorkflowResponse, WorkflowState};

/// Type alias for the streamed completion sequence.
pub type ChunkStream = BoxStream<'static, BackendResult<StreamChunk>>;

/// Remote research service.
///
/// Every call is atomic from the client's point of view except [`stream`],
/// which returns a lazily consumed sequence of chunks.
///
/// [`stream`]: ResearchBackend::stream
#[async_trait::async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Starts a new research thread.
    async fn start(&self, message: &str) -> BackendResult<WorkflowResponse>;

    /// Answers the pending interrupt of `thread_id`.
    async fn resume(
        &self,
        thread_id: &str,
        choice: &str,
        user_input: &str,
    ) -> BackendResult<WorkflowResponse>;

    /// Sends a follow-up question on an existing thread.
    async fn follow_up(&self, thread_id: &str, message: &str) -> BackendResult<WorkflowResponse>;

    /// Opens the streamed completion for a format choice.
    async fn stream(&self, thread_id: &str, choice: &str) -> BackendResult<ChunkStream>;

    /// Fetches the current workflow state of a thread.
    async fn get_state(&self, thread_id: &str) -> BackendResult<WorkflowResponse>;

    /// Fetches the backend-side conversation history of a thread.
    async fn conversation_history(&self, thread_id: &str) -> BackendResult<HistoryResponse>;
}
