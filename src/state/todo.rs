use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Done,
}

/// Agent-reported task-progress item. Todos stick for the rest of the run
/// until a later update supersedes the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub text: String,
    pub status: TodoStatus,
}

impl Todo {
    pub fn new(text: impl Into<String>, status: TodoStatus) -> Self {
        Self {
            text: text.into(),
            status,
        }
    }
}

/// Normalize the two wire forms into one canonical ordered list.
///
/// Accepted shapes, from the agent backends this fronts:
/// - flat list of objects: `[{"text": "step", "status": "done"}]`
///   (also `task`/`content` for the text key)
/// - flat list of strings: `["step"]` (status defaults to pending)
/// - keyed map: `{"step": "in_progress"}` (insertion order is step order,
///   which is why serde_json runs with `preserve_order`)
///
/// Returns `None` when the value is not a recognizable todo collection.
pub fn normalize_todos(value: &Value) -> Option<Vec<Todo>> {
    match value {
        Value::Array(entries) => {
            let mut todos = Vec::with_capacity(entries.len());
            for entry in entries {
                match entry {
                    Value::String(text) => todos.push(Todo::new(text, TodoStatus::Pending)),
                    Value::Object(map) => {
                        let text = ["text", "task", "content"]
                            .iter()
                            .find_map(|key| map.get(*key).and_then(Value::as_str))?;
                        let status = map
                            .get("status")
                            .and_then(Value::as_str)
                            .map(parse_status)
                            .unwrap_or(TodoStatus::Pending);
                        todos.push(Todo::new(text, status));
                    }
                    _ => return None,
                }
            }
            Some(todos)
        }
        Value::Object(map) => {
            let mut todos = Vec::with_capacity(map.len());
            for (text, status) in map {
                let status = status.as_str().map(parse_status)?;
                todos.push(Todo::new(text, status));
            }
            Some(todos)
        }
        _ => None,
    }
}

fn parse_status(raw: &str) -> TodoStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "done" | "completed" | "complete" => TodoStatus::Done,
        "in_progress" | "in-progress" | "doing" | "active" => TodoStatus::InProgress,
        _ => TodoStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_list_of_objects() {
        let todos = normalize_todos(&json!([
            {"text": "step1", "status": "done"},
            {"task": "step2", "status": "in_progress"},
            {"content": "step3"},
        ]))
        .expect("todos");
        assert_eq!(
            todos,
            vec![
                Todo::new("step1", TodoStatus::Done),
                Todo::new("step2", TodoStatus::InProgress),
                Todo::new("step3", TodoStatus::Pending),
            ]
        );
    }

    #[test]
    fn test_normalize_list_of_strings() {
        let todos = normalize_todos(&json!(["a", "b"])).expect("todos");
        assert_eq!(todos.len(), 2);
        assert!(todos.iter().all(|t| t.status == TodoStatus::Pending));
    }

    #[test]
    fn test_normalize_keyed_map() {
        let todos = normalize_todos(&json!({
            "load data": "completed",
            "plot chart": "pending",
        }))
        .expect("todos");
        assert_eq!(todos.len(), 2);
        assert!(todos
            .iter()
            .any(|t| t.text == "load data" && t.status == TodoStatus::Done));
        assert!(todos
            .iter()
            .any(|t| t.text == "plot chart" && t.status == TodoStatus::Pending));
    }

    #[test]
    fn test_keyed_map_keeps_insertion_order() {
        // Keys deliberately out of alphabetical order.
        let todos = normalize_todos(&json!({
            "load the data": "done",
            "analyze results": "in_progress",
            "draft summary": "pending",
        }))
        .expect("todos");
        let texts: Vec<&str> = todos.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["load the data", "analyze results", "draft summary"]);
    }

    #[test]
    fn test_unrecognizable_shapes_return_none() {
        assert!(normalize_todos(&json!(42)).is_none());
        assert!(normalize_todos(&json!([{"status": "done"}])).is_none());
        assert!(normalize_todos(&json!({"task": 1})).is_none());
    }
}
