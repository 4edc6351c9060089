use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;

use super::state::{send_update, RunHandle, Session, SessionError, SessionUpdate};
use crate::agent::{logging, AgentSource};
use crate::state::classifier::classify;
use crate::state::event::RunEvent;
use crate::state::run::RunStatus;
use crate::util::epoch_millis;

impl Session {
    /// Consume the run's chunk stream to completion and resolve the run to
    /// a terminal state.
    ///
    /// This is the single logical consumer: chunk pulls are the only
    /// suspension points, and everything between them (classification,
    /// tracking, transcript and canvas mutation) is synchronous. The
    /// cancellation token is observed before every pull; on cancel the run
    /// moves to `Cancelling`, the source is told to stop, and the loop
    /// stops pulling. Elements applied strictly before the cancellation
    /// stand; chunks the source produces afterwards are never applied,
    /// even if it ignores the stop request.
    pub async fn drive(
        &mut self,
        source: &mut dyn AgentSource,
        handle: &RunHandle,
        tx: Option<&UnboundedSender<SessionUpdate>>,
    ) -> Result<RunStatus, SessionError> {
        let is_active = self
            .run
            .as_ref()
            .is_some_and(|run| run.id == handle.run_id && !run.status.is_terminal());
        if !is_active {
            return Err(SessionError::NotRunning);
        }

        let input = self.pending_input.take().unwrap_or_default();
        let mut stream = match source.invoke(&input).await {
            Ok(stream) => stream,
            Err(err) => {
                self.apply_event(
                    RunEvent::RunError(format!("agent invocation failed: {err:#}")),
                    tx,
                );
                return Ok(self.finalize(handle, tx));
            }
        };

        'run: loop {
            tokio::select! {
                biased;
                _ = handle.cancelled() => {
                    if let Some(run) = self.run.as_mut() {
                        run.request_cancel(epoch_millis());
                    }
                    source.request_cancel();
                    break 'run;
                }
                chunk = stream.next() => match chunk {
                    None => break 'run,
                    Some(Err(err)) => {
                        self.apply_event(
                            RunEvent::RunError(format!("agent stream failed: {err:#}")),
                            tx,
                        );
                        break 'run;
                    }
                    Some(Ok(chunk)) => {
                        if logging::debug_events_enabled() {
                            logging::emit_chunk_trace(&chunk);
                        }
                        for event in classify(&chunk) {
                            self.apply_event(event, tx);
                        }
                        if self.run.as_ref().is_some_and(|run| run.status.is_terminal()) {
                            break 'run;
                        }
                    }
                },
            }
        }
        drop(stream);

        Ok(self.finalize(handle, tx))
    }

    /// Settle everything the stream left open: outstanding tool calls flip
    /// to interrupted failures, the run lands in a terminal state, and the
    /// assistant turn is stamped with its response time and frozen.
    fn finalize(
        &mut self,
        handle: &RunHandle,
        tx: Option<&UnboundedSender<SessionUpdate>>,
    ) -> RunStatus {
        let now = epoch_millis();

        let interrupted = self.tracker.finalize_outstanding(now);
        if let Some(turn_index) = self.assistant_turn {
            if let Some(turn) = self.transcript.turn_mut(turn_index) {
                for call in &interrupted {
                    let element = turn.update_tool_call(call);
                    send_update(
                        tx,
                        SessionUpdate::ToolCallUpdated {
                            turn: turn_index,
                            element,
                        },
                    );
                }
            }
        }

        let status = match self.run.as_mut() {
            Some(run) => {
                if !run.status.is_terminal() {
                    // A stream that ends without a terminal chunk is a
                    // protocol violation unless we asked it to stop.
                    let terminal = if run.status == RunStatus::Cancelling {
                        RunStatus::Cancelled
                    } else {
                        RunStatus::Failed
                    };
                    run.finish(terminal);
                }
                run.status
            }
            None => RunStatus::Failed,
        };

        if let Some(turn_index) = self.assistant_turn.take() {
            let started = self.first_event_at_ms.take().unwrap_or(now);
            let elapsed = now.saturating_sub(started).max(1);
            if let Some(turn) = self.transcript.turn_mut(turn_index) {
                turn.response_time_ms = Some(elapsed);
            }
        }
        self.cancel = None;
        self.pending_input = None;

        send_update(
            tx,
            SessionUpdate::RunFinished {
                run_id: handle.run_id,
                status,
            },
        );
        status
    }
}
