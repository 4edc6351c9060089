use serde_json::Value;

use super::logging;

/// Incremental SSE frame decoder for the agent transport.
///
/// Frames are separated by a blank line; each frame carries an optional
/// `event:` line and a `data:` line with one JSON chunk. Partial frames stay
/// buffered until the terminator arrives, so byte boundaries never split a
/// chunk.
#[derive(Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, bytes: &[u8]) -> Vec<Value> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut chunks = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let frame_end = start + end + 2;
            let frame = &self.buffer[start..frame_end];

            let mut event_type = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    event_type = Some(rest.to_string());
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = Some(rest.trim().to_string());
                }
            }

            if let Some(json_data) = data {
                if json_data != "[DONE]" {
                    match serde_json::from_str::<Value>(&json_data) {
                        Ok(chunk) => chunks.push(chunk),
                        Err(e) => {
                            logging::emit_parse_error(
                                "sse_parse_failed",
                                &format!(
                                    "error={e}\nevent_type={}\ndata:\n{json_data}",
                                    event_type.as_deref().unwrap_or("<none>")
                                ),
                            );
                        }
                    }
                }
            }

            start = frame_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        chunks
    }

    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fragmented_frames_are_buffered() {
        let mut decoder = SseDecoder::new();
        assert!(decoder
            .process(b"event: chunk\ndata: {\"type\":\"text")
            .is_empty());
        let chunks = decoder.process(b"_delta\",\"text\":\"Hi\"}\n\n");
        assert_eq!(chunks, vec![json!({"type": "text_delta", "text": "Hi"})]);
    }

    #[test]
    fn test_invalid_json_is_skipped_not_fatal() {
        let mut decoder = SseDecoder::new();
        let chunks = decoder.process(b"event: chunk\ndata: {invalid}\n\n");
        assert!(chunks.is_empty());
        assert!(decoder.flush().is_empty());
    }

    #[test]
    fn test_done_sentinel_is_dropped() {
        let mut decoder = SseDecoder::new();
        let chunks = decoder.process(b"data: [DONE]\n\ndata: {\"type\":\"done\"}\n\n");
        assert_eq!(chunks, vec![json!({"type": "done"})]);
    }
}
