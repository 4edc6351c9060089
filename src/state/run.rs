use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Cancelling,
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed
        )
    }
}

/// One end-to-end agent invocation, created on user submission.
///
/// Transitions: `Running -> {Completed, Failed}` on stream outcome, or
/// `Running -> Cancelling -> Cancelled` on an explicit stop request. There
/// is no transition out of a terminal state; a new submission always
/// creates a fresh run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: u64,
    pub status: RunStatus,
    pub started_at_ms: u64,
    pub cancel_requested_at_ms: Option<u64>,
}

impl Run {
    pub fn new(id: u64, now_ms: u64) -> Self {
        Self {
            id,
            status: RunStatus::Running,
            started_at_ms: now_ms,
            cancel_requested_at_ms: None,
        }
    }

    /// Record a stop request. Only meaningful while running; a no-op once
    /// the run is terminal or already cancelling.
    pub fn request_cancel(&mut self, now_ms: u64) -> bool {
        if self.status != RunStatus::Running {
            return false;
        }
        self.status = RunStatus::Cancelling;
        self.cancel_requested_at_ms = Some(now_ms);
        true
    }

    /// Move to a terminal state. Ignored if already terminal.
    pub fn finish(&mut self, status: RunStatus) -> bool {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }
}
