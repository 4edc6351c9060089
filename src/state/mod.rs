pub mod classifier;
pub mod event;
pub mod run;
pub mod session;
pub mod todo;
pub mod tool_tracker;
pub mod transcript;

pub use event::{RunEvent, ToolResult};
pub use run::{Run, RunStatus};
pub use session::{RunHandle, Session, SessionError, SessionUpdate};
pub use todo::{Todo, TodoStatus};
pub use tool_tracker::{ToolCall, ToolCallTracker, ToolStatus};
pub use transcript::{ChatTurn, Role, Transcript, TurnElement};
