pub mod http_source;
pub mod logging;
pub mod mock_source;
pub mod sse;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;

pub use http_source::HttpAgentSource;
pub use mock_source::MockAgentSource;

/// Lazy sequence of raw chunks produced by one agent invocation.
///
/// Chunks are opaque structured payloads; the event classifier is the only
/// component that interprets their shape.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;

/// Streaming agent collaborator.
///
/// `invoke` starts one invocation and returns its chunk stream, possibly
/// unbounded until a terminal chunk. `request_cancel` asks the producer to
/// stop within a bounded time by emitting a terminal chunk or ceasing
/// production; the orchestrator stops pulling regardless.
pub trait AgentSource: Send {
    fn invoke<'a>(&'a mut self, input: &'a str) -> BoxFuture<'a, Result<ChunkStream>>;
    fn request_cancel(&self);
}
