pub mod http;
pub mod types;

use crate::error::Error;
use crate::provider::types::{ChatRequest, ChatResponse, StreamChunk};

/// Callback type for receiving streamed response chunks.
pub type OnChunk<'a> = dyn Fn(StreamChunk) + Send + Sync + 'a;

/// Trait for model providers.
///
/// Implementors must be thread-safe (`Send + Sync`) so a single provider can
/// back several agents. Network concerns — timeouts, retries, backoff — live
/// entirely inside the implementor; callers only see resolved or rejected
/// futures.
pub trait Provider: Send + Sync {
    /// Send a full conversation and receive one response.
    fn send_message(
        &self,
        request: ChatRequest,
    ) -> impl std::future::Future<Output = Result<ChatResponse, Error>> + Send;

    /// Send a full conversation, receiving the response incrementally.
    ///
    /// `on_chunk` is invoked once per delta and once more with a terminal
    /// `done` chunk. Implementors must not call it after the done chunk.
    fn send_message_stream(
        &self,
        request: ChatRequest,
        on_chunk: &OnChunk<'_>,
    ) -> impl std::future::Future<Output = Result<(), Error>> + Send;
}
