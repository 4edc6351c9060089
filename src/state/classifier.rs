use serde_json::{json, Value};

use super::event::{RunEvent, ToolResult};
use super::todo::normalize_todos;
use crate::util::truncate_diagnostic;

const DIAGNOSTIC_MAX_CHARS: usize = 200;

/// Classify one raw agent chunk into zero or more typed events.
///
/// Pure and total: malformed or unrecognized chunks come back as a
/// `RunError` event carrying a diagnostic, never a panic or an `Err`. The
/// caller owns deduplication of re-delivered chunks; this function has no
/// state.
///
/// Recognized chunk shapes (aliases cover the agent backends this fronts):
/// - `{"type": "text_delta" | "text", "text": ..}`
/// - `{"type": "thinking_delta" | "thinking", "text": ..}`
/// - `{"type": "tool_call_start" | "tool_call", "id", "name", "arguments"}`
///   — an embedded `"result"` also emits the paired end event
/// - `{"type": "tool_call_end" | "tool_result", "id", "result": {"content", "error"}}`
/// - `{"type": "todo_update" | "todos", "todos": <list | keyed map>}`
/// - `{"type": "error", "message"}` and `{"type": "done"}`
pub fn classify(chunk: &Value) -> Vec<RunEvent> {
    let Some(kind) = chunk.get("type").and_then(Value::as_str) else {
        return vec![malformed("chunk has no type field", chunk)];
    };

    match kind {
        "text_delta" | "text" => match delta_text(chunk) {
            Some(text) => vec![RunEvent::TextDelta(text)],
            None => vec![malformed("text chunk has no text", chunk)],
        },
        "thinking_delta" | "thinking" => match delta_text(chunk) {
            Some(text) => vec![RunEvent::ThinkingDelta(text)],
            None => vec![malformed("thinking chunk has no text", chunk)],
        },
        "tool_call_start" | "tool_call" => classify_tool_call(chunk),
        "tool_call_end" | "tool_result" => classify_tool_result(chunk),
        "todo_update" | "todos" => {
            let todos = chunk.get("todos").or_else(|| chunk.get("items"));
            match todos.and_then(normalize_todos) {
                Some(todos) => vec![RunEvent::TodoUpdate(todos)],
                None => vec![malformed("todo chunk has no recognizable todos", chunk)],
            }
        }
        "error" => {
            let message = chunk
                .get("message")
                .or_else(|| chunk.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("agent reported an unspecified error");
            vec![RunEvent::RunError(message.to_string())]
        }
        "done" | "run_done" => vec![RunEvent::RunDone],
        other => vec![malformed(&format!("unknown chunk type '{other}'"), chunk)],
    }
}

fn delta_text(chunk: &Value) -> Option<String> {
    ["text", "delta", "content"]
        .iter()
        .find_map(|key| chunk.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn classify_tool_call(chunk: &Value) -> Vec<RunEvent> {
    let Some(id) = call_id(chunk) else {
        return vec![malformed("tool call chunk has no id", chunk)];
    };
    let Some(name) = chunk.get("name").and_then(Value::as_str) else {
        return vec![malformed("tool call chunk has no name", chunk)];
    };
    let arguments = ["arguments", "args", "input"]
        .iter()
        .find_map(|key| chunk.get(*key))
        .cloned()
        .unwrap_or_else(|| json!({}));

    let mut events = vec![RunEvent::ToolCallStart {
        id: id.clone(),
        name: name.to_string(),
        arguments,
    }];

    // A single chunk may carry the whole call; emit the paired end event.
    if let Some(result) = chunk.get("result") {
        events.push(RunEvent::ToolCallEnd {
            id,
            name: Some(name.to_string()),
            result: parse_tool_result(result),
        });
    }

    events
}

fn classify_tool_result(chunk: &Value) -> Vec<RunEvent> {
    let Some(id) = call_id(chunk) else {
        return vec![malformed("tool result chunk has no id", chunk)];
    };
    let name = chunk.get("name").and_then(Value::as_str);
    let result = match chunk.get("result") {
        Some(result) => parse_tool_result(result),
        // Flat form: content/error at the top level of the chunk.
        None if chunk.get("content").is_some() => parse_tool_result(chunk),
        None => return vec![malformed("tool result chunk has no result", chunk)],
    };

    let mut events = vec![RunEvent::ToolCallEnd {
        id,
        name: name.map(str::to_string),
        result: result.clone(),
    }];

    // The todo tool reports the list through its result; surface it as a
    // todo update as well so the transcript stays in sync.
    if name == Some("write_todos") && !result.error {
        if let Ok(value) = serde_json::from_str::<Value>(&result.content) {
            if let Some(todos) = normalize_todos(&value) {
                events.push(RunEvent::TodoUpdate(todos));
            }
        }
    }

    events
}

fn call_id(chunk: &Value) -> Option<String> {
    match chunk.get("id").or_else(|| chunk.get("tool_call_id"))? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Extract the structured result. Bare strings wrap as non-error content;
/// only an explicit boolean flag marks failure.
fn parse_tool_result(value: &Value) -> ToolResult {
    match value {
        Value::String(content) => ToolResult::ok(content.clone()),
        Value::Object(map) => {
            let content = match map.get("content") {
                Some(Value::String(content)) => content.clone(),
                Some(other) => other.to_string(),
                None => Value::Object(map.clone()).to_string(),
            };
            let error = map
                .get("error")
                .or_else(|| map.get("is_error"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            ToolResult { content, error }
        }
        other => ToolResult::ok(other.to_string()),
    }
}

fn malformed(reason: &str, chunk: &Value) -> RunEvent {
    RunEvent::RunError(format!(
        "protocol violation: {reason}: {}",
        truncate_diagnostic(&chunk.to_string(), DIAGNOSTIC_MAX_CHARS)
    ))
}
