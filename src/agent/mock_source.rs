use anyhow::Result;
use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use super::{AgentSource, ChunkStream};

/// Scripted agent source for tests and offline demos.
///
/// Each `invoke` consumes the next configured script of chunks. A stalling
/// source keeps the stream pending after its script runs out until the run
/// is cancelled, which models an agent that never emits a terminal chunk.
pub struct MockAgentSource {
    scripts: Arc<Mutex<Vec<Vec<Value>>>>,
    stall_after_script: bool,
    cancel: CancellationToken,
}

impl MockAgentSource {
    pub fn new(scripts: Vec<Vec<Value>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            stall_after_script: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn stalling(scripts: Vec<Vec<Value>>) -> Self {
        Self {
            stall_after_script: true,
            ..Self::new(scripts)
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl AgentSource for MockAgentSource {
    fn invoke<'a>(&'a mut self, _input: &'a str) -> BoxFuture<'a, Result<ChunkStream>> {
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                None
            } else {
                Some(scripts.remove(0))
            }
        };
        // Fresh token per invocation, matching the HTTP source.
        self.cancel = CancellationToken::new();
        let token = self.cancel.clone();
        let stall = self.stall_after_script;

        Box::pin(async move {
            let Some(script) = script else {
                anyhow::bail!("MockAgentSource: no more scripts configured");
            };

            let items: Vec<Result<Value>> = script.into_iter().map(Ok).collect();
            let gated = futures::stream::iter(items).scan(token.clone(), |token, item| {
                futures::future::ready(if token.is_cancelled() {
                    None
                } else {
                    Some(item)
                })
            });

            if stall {
                let tail = futures::stream::unfold(token, |token| async move {
                    token.cancelled().await;
                    None::<(Result<Value>, CancellationToken)>
                });
                Ok(Box::pin(gated.chain(tail)) as ChunkStream)
            } else {
                Ok(Box::pin(gated) as ChunkStream)
            }
        })
    }

    fn request_cancel(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripts_are_consumed_in_order() {
        let mut source = MockAgentSource::new(vec![
            vec![json!({"type": "done"})],
            vec![json!({"type": "error", "message": "x"})],
        ]);

        let mut first = source.invoke("a").await.expect("stream");
        assert_eq!(
            first.next().await.expect("chunk").expect("ok"),
            json!({"type": "done"})
        );
        drop(first);

        let mut second = source.invoke("b").await.expect("stream");
        assert_eq!(
            second.next().await.expect("chunk").expect("ok"),
            json!({"type": "error", "message": "x"})
        );
        drop(second);

        assert!(source.invoke("c").await.is_err());
    }

    #[tokio::test]
    async fn test_stalling_source_ends_only_after_cancel() {
        let mut source = MockAgentSource::stalling(vec![vec![json!({"type": "text_delta", "text": "a"})]]);

        let mut stream = source.invoke("x").await.expect("stream");
        let token = source.cancel_token();
        assert!(stream.next().await.is_some());

        let pending = tokio::time::timeout(std::time::Duration::from_millis(20), stream.next());
        assert!(pending.await.is_err());

        token.cancel();
        assert!(stream.next().await.is_none());
    }
}
