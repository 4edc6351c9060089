use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::todo::Todo;

/// One tool outcome as delivered by the agent layer.
///
/// `error` is the explicit structured failure signal; it is the only input
/// to the success/failure decision. Result text is never scanned, so a file
/// whose contents discuss errors still counts as a success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    #[serde(default)]
    pub error: bool,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: false,
        }
    }

    pub fn failed(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: true,
        }
    }
}

/// Typed event produced by the classifier, applied to the transcript in
/// stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    TextDelta(String),
    ThinkingDelta(String),
    ToolCallStart {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolCallEnd {
        id: String,
        name: Option<String>,
        result: ToolResult,
    },
    TodoUpdate(Vec<Todo>),
    RunError(String),
    RunDone,
}
