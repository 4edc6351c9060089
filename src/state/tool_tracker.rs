use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::event::ToolResult;
use crate::agent::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub started_at_ms: u64,
    pub status: ToolStatus,
    pub result: Option<ToolResult>,
    pub finished_at_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    DuplicateCallId(String),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::DuplicateCallId(id) => {
                write!(f, "duplicate tool call id '{id}' within one run")
            }
        }
    }
}

impl std::error::Error for TrackerError {}

/// Pairs tool-call starts with their eventual results, scoped to one run.
///
/// Status is decided solely by the structured `error` flag on the result;
/// out-of-order results synthesize a retroactive entry, and calls still
/// pending at run end are failed as interrupted.
#[derive(Default)]
pub struct ToolCallTracker {
    calls: HashMap<String, ToolCall>,
    order: Vec<String>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(
        &mut self,
        id: &str,
        name: &str,
        arguments: Value,
        now_ms: u64,
    ) -> Result<ToolCall, TrackerError> {
        if self.calls.contains_key(id) {
            logging::emit_warning(&format!(
                "protocol violation: duplicate tool call id '{id}' ({name})"
            ));
            return Err(TrackerError::DuplicateCallId(id.to_string()));
        }

        let call = ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
            started_at_ms: now_ms,
            status: ToolStatus::Pending,
            result: None,
            finished_at_ms: None,
        };
        self.calls.insert(id.to_string(), call.clone());
        self.order.push(id.to_string());
        Ok(call)
    }

    /// Resolve a call. Unknown ids are tolerated: a retroactive entry is
    /// synthesized so out-of-order delivery still pairs up.
    pub fn on_result(
        &mut self,
        id: &str,
        name: Option<&str>,
        result: ToolResult,
        now_ms: u64,
    ) -> ToolCall {
        if !self.calls.contains_key(id) {
            logging::emit_warning(&format!(
                "tool result for unknown call id '{id}'; synthesizing entry"
            ));
            let call = ToolCall {
                id: id.to_string(),
                name: name.unwrap_or("unknown").to_string(),
                arguments: Value::Null,
                started_at_ms: now_ms,
                status: ToolStatus::Pending,
                result: None,
                finished_at_ms: None,
            };
            self.calls.insert(id.to_string(), call);
            self.order.push(id.to_string());
        }

        let call = self.calls.get_mut(id).expect("entry present");
        call.status = if result.error {
            ToolStatus::Failed
        } else {
            ToolStatus::Succeeded
        };
        call.result = Some(result);
        call.finished_at_ms = Some(now_ms);
        call.clone()
    }

    /// Fail every still-pending call; returns the flipped calls in start order.
    pub fn finalize_outstanding(&mut self, now_ms: u64) -> Vec<ToolCall> {
        let mut flipped = Vec::new();
        for id in &self.order {
            let call = self.calls.get_mut(id).expect("tracked id");
            if call.status == ToolStatus::Pending {
                call.status = ToolStatus::Failed;
                call.result = Some(ToolResult::failed(
                    "interrupted: run ended before the tool completed",
                ));
                call.finished_at_ms = Some(now_ms);
                flipped.push(call.clone());
            }
        }
        flipped
    }

    pub fn snapshot(&self) -> Vec<ToolCall> {
        self.order
            .iter()
            .filter_map(|id| self.calls.get(id).cloned())
            .collect()
    }
}
