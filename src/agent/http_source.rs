use anyhow::{bail, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::sse::SseDecoder;
use super::{AgentSource, ChunkStream};
use crate::config::Config;

/// Agent source backed by an SSE-streaming HTTP endpoint.
///
/// One POST per invocation; the response body is decoded incrementally into
/// JSON chunks. `request_cancel` trips a token that the chunk stream checks
/// before decoding further bytes, so cancellation never requires tearing
/// down the transport mid-read.
pub struct HttpAgentSource {
    http: reqwest::Client,
    agent_url: String,
    api_key: Option<String>,
    model: String,
    cancel: CancellationToken,
}

impl HttpAgentSource {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            agent_url: config.agent_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            cancel: CancellationToken::new(),
        }
    }
}

impl AgentSource for HttpAgentSource {
    fn invoke<'a>(&'a mut self, input: &'a str) -> BoxFuture<'a, Result<ChunkStream>> {
        // Fresh token per invocation so a cancelled run does not poison the next.
        self.cancel = CancellationToken::new();
        let token = self.cancel.clone();

        Box::pin(async move {
            let mut request = self.http.post(&self.agent_url).json(&json!({
                "input": input,
                "model": self.model,
                "stream": true,
            }));
            if let Some(key) = &self.api_key {
                request = request.header("x-api-key", key);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                bail!("Agent endpoint returned {}", response.status());
            }

            let bytes = response
                .bytes_stream()
                .map(|item| item.map_err(anyhow::Error::from));
            Ok(chunk_stream_from_bytes(bytes, token))
        })
    }

    fn request_cancel(&self) {
        self.cancel.cancel();
    }
}

/// Decode a byte stream into a chunk stream, honoring the cancellation token.
pub(crate) fn chunk_stream_from_bytes(
    bytes: impl Stream<Item = Result<Bytes>> + Send + 'static,
    cancel: CancellationToken,
) -> ChunkStream {
    let stream = bytes
        .scan(
            (SseDecoder::new(), cancel),
            |(decoder, token), item| {
                if token.is_cancelled() {
                    return futures::future::ready(None);
                }
                let out: Vec<Result<serde_json::Value>> = match item {
                    Ok(chunk) => decoder.process(&chunk).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(futures::stream::iter(out)))
            },
        )
        .flatten();
    Box::pin(stream)
}
