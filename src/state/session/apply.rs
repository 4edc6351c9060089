use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use super::state::{send_update, Session, SessionUpdate};
use crate::canvas::item::{parse_artifact, parse_artifact_value};
use crate::state::event::RunEvent;
use crate::state::run::RunStatus;
use crate::state::tool_tracker::{ToolCall, ToolStatus};
use crate::util::epoch_millis;

impl Session {
    /// Apply one classified event to the transcript, tracker, and canvas.
    ///
    /// Events are applied in stream order; consecutive deltas of the same
    /// kind coalesce into the trailing element, anything else starts a new
    /// one. Synchronous throughout, so no update is sent before its
    /// mutation has landed.
    pub(super) fn apply_event(
        &mut self,
        event: RunEvent,
        tx: Option<&UnboundedSender<SessionUpdate>>,
    ) {
        let now = epoch_millis();
        if self.first_event_at_ms.is_none() {
            self.first_event_at_ms = Some(now);
        }
        let Some(turn_index) = self.assistant_turn else {
            return;
        };

        match event {
            RunEvent::TextDelta(delta) => {
                if let Some(turn) = self.transcript.turn_mut(turn_index) {
                    let (element, started) = turn.append_text_delta(&delta);
                    send_update(tx, delta_update(turn_index, element, started));
                }
            }
            RunEvent::ThinkingDelta(delta) => {
                if let Some(turn) = self.transcript.turn_mut(turn_index) {
                    let (element, started) = turn.append_thinking_delta(&delta);
                    send_update(tx, delta_update(turn_index, element, started));
                }
            }
            RunEvent::ToolCallStart {
                id,
                name,
                arguments,
            } => match self.tracker.on_start(&id, &name, arguments, now) {
                Ok(call) => {
                    if let Some(turn) = self.transcript.turn_mut(turn_index) {
                        let element = turn.push_tool_call(call);
                        send_update(
                            tx,
                            SessionUpdate::ElementStarted {
                                turn: turn_index,
                                element,
                            },
                        );
                    }
                }
                Err(err) => send_update(
                    tx,
                    SessionUpdate::Warning {
                        message: err.to_string(),
                    },
                ),
            },
            RunEvent::ToolCallEnd { id, name, result } => {
                let call = self.tracker.on_result(&id, name.as_deref(), result, now);
                if let Some(turn) = self.transcript.turn_mut(turn_index) {
                    let element = turn.update_tool_call(&call);
                    send_update(
                        tx,
                        SessionUpdate::ToolCallUpdated {
                            turn: turn_index,
                            element,
                        },
                    );
                }
                self.route_tool_result(&call, tx);
            }
            RunEvent::TodoUpdate(todos) => {
                self.todos = todos.clone();
                if let Some(turn) = self.transcript.turn_mut(turn_index) {
                    let (element, _) = turn.upsert_todos(&todos);
                    send_update(
                        tx,
                        SessionUpdate::TodosUpdated {
                            turn: turn_index,
                            element,
                        },
                    );
                }
            }
            RunEvent::RunError(message) => {
                if let Some(turn) = self.transcript.turn_mut(turn_index) {
                    let element = turn.push_error(&message);
                    send_update(
                        tx,
                        SessionUpdate::ElementStarted {
                            turn: turn_index,
                            element,
                        },
                    );
                }
                if let Some(run) = self.run.as_mut() {
                    run.finish(RunStatus::Failed);
                }
            }
            RunEvent::RunDone => {
                if let Some(run) = self.run.as_mut() {
                    // A terminal chunk on a cancelling run is the source
                    // honoring the stop request, not a completion.
                    let terminal = if run.status == RunStatus::Cancelling {
                        RunStatus::Cancelled
                    } else {
                        RunStatus::Completed
                    };
                    run.finish(terminal);
                }
            }
        }
    }

    /// Canvas routing for artifact-producing tools. Only successful results
    /// touch the store; failures already surfaced through the tool element.
    fn route_tool_result(
        &mut self,
        call: &ToolCall,
        tx: Option<&UnboundedSender<SessionUpdate>>,
    ) {
        if call.status != ToolStatus::Succeeded {
            return;
        }

        match call.name.as_str() {
            "add_to_canvas" => {
                let payload = match &call.arguments {
                    // The tool's own arguments carry the artifact; results
                    // from synthesized entries fall back to result content.
                    Value::Object(map) if !map.is_empty() => parse_artifact_value(&call.arguments),
                    _ => {
                        let content = call
                            .result
                            .as_ref()
                            .map(|result| result.content.as_str())
                            .unwrap_or_default();
                        parse_artifact(content)
                    }
                };
                let item = self.canvas.append(payload);
                send_update(tx, SessionUpdate::ArtifactAppended { item_id: item.id });
            }
            "update_canvas_item" => {
                let Some((id, item)) = update_target(call) else {
                    send_update(
                        tx,
                        SessionUpdate::Warning {
                            message: format!(
                                "update_canvas_item call '{}' carries no item id",
                                call.id
                            ),
                        },
                    );
                    return;
                };
                let payload = parse_artifact_value(&item);
                if self.canvas.update(&id, payload).is_err() {
                    send_update(
                        tx,
                        SessionUpdate::Warning {
                            message: format!("update_canvas_item: no canvas item with id {id}"),
                        },
                    );
                }
            }
            _ => {}
        }
    }
}

fn delta_update(turn: usize, element: usize, started: bool) -> SessionUpdate {
    if started {
        SessionUpdate::ElementStarted { turn, element }
    } else {
        SessionUpdate::ElementDelta { turn, element }
    }
}

/// Pull the target id and replacement content out of an
/// `update_canvas_item` call, preferring the arguments over the result.
fn update_target(call: &ToolCall) -> Option<(String, Value)> {
    let from_value = |value: &Value| {
        let map = value.as_object()?;
        let id = map.get("id").and_then(Value::as_str)?.to_string();
        let item = map
            .get("item")
            .or_else(|| map.get("data"))
            .cloned()
            .unwrap_or_else(|| value.clone());
        Some((id, item))
    };

    from_value(&call.arguments).or_else(|| {
        let content = call.result.as_ref()?.content.as_str();
        let parsed = serde_json::from_str::<Value>(content).ok()?;
        from_value(&parsed)
    })
}
