use std::fmt;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::canvas::CanvasStore;
use crate::state::run::{Run, RunStatus};
use crate::state::todo::Todo;
use crate::state::tool_tracker::{ToolCall, ToolCallTracker};
use crate::state::transcript::{Role, Transcript};
use crate::util::epoch_millis;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A second submission arrived while a run was still active.
    RunAlreadyActive,
    /// The named run is not the active one.
    NotRunning,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::RunAlreadyActive => {
                write!(f, "a run is already active; cancel it or wait for it to finish")
            }
            SessionError::NotRunning => write!(f, "no active run with that id"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Whole-element notifications pushed to the presentation layer.
///
/// Indices refer to the transcript snapshot: `turn` is a transcript index,
/// `element` an index into that turn's elements. The referenced mutation is
/// complete before the notification is sent, so a snapshot taken on receipt
/// never observes a torn write.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    ElementStarted { turn: usize, element: usize },
    ElementDelta { turn: usize, element: usize },
    ToolCallUpdated { turn: usize, element: usize },
    TodosUpdated { turn: usize, element: usize },
    ArtifactAppended { item_id: String },
    Warning { message: String },
    RunFinished { run_id: u64, status: RunStatus },
}

pub(super) fn send_update(tx: Option<&UnboundedSender<SessionUpdate>>, update: SessionUpdate) {
    if let Some(tx) = tx {
        let _ = tx.send(update);
    }
}

/// Cancellation handle for one run, returned by `begin_run`.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub run_id: u64,
    cancel: CancellationToken,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(super) async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// One chat session: transcript, canvas, and at most one active run.
///
/// All mutation happens on the task driving the run; readers take snapshots
/// or subscribe to `SessionUpdate`s.
pub struct Session {
    pub(super) transcript: Transcript,
    pub(super) canvas: CanvasStore,
    pub(super) tracker: ToolCallTracker,
    pub(super) todos: Vec<Todo>,
    pub(super) run: Option<Run>,
    pub(super) cancel: Option<CancellationToken>,
    pub(super) next_run_id: u64,
    pub(super) assistant_turn: Option<usize>,
    pub(super) pending_input: Option<String>,
    pub(super) first_event_at_ms: Option<u64>,
}

impl Session {
    pub fn new(canvas: CanvasStore) -> Self {
        Self {
            transcript: Transcript::new(),
            canvas,
            tracker: ToolCallTracker::new(),
            todos: Vec::new(),
            run: None,
            cancel: None,
            next_run_id: 1,
            assistant_turn: None,
            pending_input: None,
            first_event_at_ms: None,
        }
    }

    /// Start a new run for one user submission.
    ///
    /// Opens the user turn and its companion assistant turn, resets per-run
    /// state (tool tracker, todo list), and hands back the cancellation
    /// handle. Rejected while another run is still active.
    pub fn begin_run(&mut self, input: &str) -> Result<RunHandle, SessionError> {
        if self.run.as_ref().is_some_and(|run| !run.status.is_terminal()) {
            return Err(SessionError::RunAlreadyActive);
        }

        let now = epoch_millis();
        let user_turn = self.transcript.open_turn(Role::User, now);
        if let Some(turn) = self.transcript.turn_mut(user_turn) {
            turn.append_text_delta(input);
        }
        self.assistant_turn = Some(self.transcript.open_turn(Role::Assistant, now));

        self.tracker = ToolCallTracker::new();
        self.todos.clear();
        self.first_event_at_ms = None;
        self.pending_input = Some(input.to_string());

        let id = self.next_run_id;
        self.next_run_id += 1;
        self.run = Some(Run::new(id, now));

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        Ok(RunHandle { run_id: id, cancel })
    }

    /// Ask the active run to stop. The driving loop observes the token
    /// between chunk pulls and resolves the run to `Cancelled`.
    pub fn request_cancel(&mut self, run_id: u64) -> Result<(), SessionError> {
        let active = self
            .run
            .as_mut()
            .filter(|run| run.id == run_id && !run.status.is_terminal())
            .ok_or(SessionError::NotRunning)?;
        active.request_cancel(epoch_millis());
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
        Ok(())
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn canvas(&self) -> &CanvasStore {
        &self.canvas
    }

    /// Current todo list; sticks for the rest of the run until superseded.
    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tracker.snapshot()
    }

    pub fn run(&self) -> Option<&Run> {
        self.run.as_ref()
    }

    pub fn run_status(&self) -> Option<RunStatus> {
        self.run.as_ref().map(|run| run.status)
    }
}
