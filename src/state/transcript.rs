use serde::{Deserialize, Serialize};

use super::todo::Todo;
use super::tool_tracker::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One sub-element of a chat turn, in stream order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnElement {
    Text { content: String },
    Thinking { content: String },
    ToolCall(ToolCall),
    Todos(Vec<Todo>),
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: u64,
    pub role: Role,
    pub created_at_ms: u64,
    pub elements: Vec<TurnElement>,
    pub response_time_ms: Option<u64>,
}

impl ChatTurn {
    /// Append a text delta, coalescing into the trailing text element when
    /// there is one. Returns the element index and whether it was created.
    pub fn append_text_delta(&mut self, delta: &str) -> (usize, bool) {
        if let Some(TurnElement::Text { content }) = self.elements.last_mut() {
            content.push_str(delta);
            return (self.elements.len() - 1, false);
        }
        self.elements.push(TurnElement::Text {
            content: delta.to_string(),
        });
        (self.elements.len() - 1, true)
    }

    /// Same coalescing rule for thinking deltas.
    pub fn append_thinking_delta(&mut self, delta: &str) -> (usize, bool) {
        if let Some(TurnElement::Thinking { content }) = self.elements.last_mut() {
            content.push_str(delta);
            return (self.elements.len() - 1, false);
        }
        self.elements.push(TurnElement::Thinking {
            content: delta.to_string(),
        });
        (self.elements.len() - 1, true)
    }

    pub fn push_tool_call(&mut self, call: ToolCall) -> usize {
        self.elements.push(TurnElement::ToolCall(call));
        self.elements.len() - 1
    }

    /// Replace the element carrying this call id, or append one when the
    /// result arrived before its start. Returns the element index.
    pub fn update_tool_call(&mut self, call: &ToolCall) -> usize {
        for (index, element) in self.elements.iter_mut().enumerate() {
            if let TurnElement::ToolCall(existing) = element {
                if existing.id == call.id {
                    *existing = call.clone();
                    return index;
                }
            }
        }
        self.push_tool_call(call.clone())
    }

    /// Replace the turn's todo element in place, or append one. The todo
    /// list keeps its position in the element order from its first arrival.
    pub fn upsert_todos(&mut self, todos: &[Todo]) -> (usize, bool) {
        for (index, element) in self.elements.iter_mut().enumerate() {
            if let TurnElement::Todos(existing) = element {
                *existing = todos.to_vec();
                return (index, false);
            }
        }
        self.elements.push(TurnElement::Todos(todos.to_vec()));
        (self.elements.len() - 1, true)
    }

    pub fn push_error(&mut self, message: impl Into<String>) -> usize {
        self.elements.push(TurnElement::Error {
            message: message.into(),
        });
        self.elements.len() - 1
    }
}

/// Ordered chat history. Turns are appended per run and amended only while
/// their run is active; terminal runs leave them frozen.
#[derive(Default)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
    next_turn_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new turn and return its index.
    pub fn open_turn(&mut self, role: Role, now_ms: u64) -> usize {
        let id = self.next_turn_id;
        self.next_turn_id += 1;
        self.turns.push(ChatTurn {
            id,
            role,
            created_at_ms: now_ms,
            elements: Vec::new(),
            response_time_ms: None,
        });
        self.turns.len() - 1
    }

    pub fn turn_mut(&mut self, index: usize) -> Option<&mut ChatTurn> {
        self.turns.get_mut(index)
    }

    pub fn turn(&self, index: usize) -> Option<&ChatTurn> {
        self.turns.get(index)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Read-only snapshot for the presentation layer.
    pub fn snapshot(&self) -> Vec<ChatTurn> {
        self.turns.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn() -> ChatTurn {
        ChatTurn {
            id: 0,
            role: Role::Assistant,
            created_at_ms: 0,
            elements: Vec::new(),
            response_time_ms: None,
        }
    }

    #[test]
    fn test_consecutive_text_deltas_coalesce() {
        let mut turn = turn();
        assert_eq!(turn.append_text_delta("Hello"), (0, true));
        assert_eq!(turn.append_text_delta(", world"), (0, false));
        assert_eq!(
            turn.elements,
            vec![TurnElement::Text {
                content: "Hello, world".to_string()
            }]
        );
    }

    #[test]
    fn test_interleaved_kinds_start_new_elements() {
        let mut turn = turn();
        turn.append_text_delta("a");
        turn.append_thinking_delta("hmm");
        let (index, started) = turn.append_text_delta("b");
        assert!(started);
        assert_eq!(index, 2);
        assert_eq!(turn.elements.len(), 3);
    }

    #[test]
    fn test_upsert_todos_keeps_element_position() {
        let mut turn = turn();
        turn.append_text_delta("intro");
        let (index, started) = turn.upsert_todos(&[Todo::new("a", crate::state::TodoStatus::Pending)]);
        assert!(started);
        turn.append_text_delta("after");
        let (again, started) = turn.upsert_todos(&[Todo::new("a", crate::state::TodoStatus::Done)]);
        assert!(!started);
        assert_eq!(index, again);
    }

    #[test]
    fn test_snapshot_is_a_deep_copy() {
        let mut transcript = Transcript::new();
        let index = transcript.open_turn(Role::Assistant, 1);
        let snap = transcript.snapshot();
        transcript
            .turn_mut(index)
            .expect("turn")
            .append_text_delta("later");
        assert!(snap[0].elements.is_empty());
    }
}
