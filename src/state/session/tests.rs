use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::agent::{AgentSource, ChunkStream, MockAgentSource};
use crate::canvas::{CanvasPayload, CanvasStore};
use crate::state::{
    RunStatus, Session, SessionError, SessionUpdate, TodoStatus, ToolStatus, TurnElement,
};

fn session() -> Session {
    Session::new(CanvasStore::new())
}

async fn run_script(session: &mut Session, script: Vec<Value>) -> RunStatus {
    let mut source = MockAgentSource::new(vec![script]);
    let handle = session.begin_run("input").expect("begin_run");
    session
        .drive(&mut source, &handle, None)
        .await
        .expect("drive")
}

fn assistant_elements(session: &Session) -> Vec<TurnElement> {
    let turns = session.transcript().snapshot();
    turns
        .last()
        .expect("assistant turn")
        .elements
        .clone()
}

#[tokio::test]
async fn test_full_run_with_text_tool_and_artifact() {
    let mut session = session();
    let status = run_script(
        &mut session,
        vec![
            json!({"type": "text_delta", "text": "Loading "}),
            json!({"type": "text_delta", "text": "data."}),
            json!({
                "type": "tool_call_start",
                "id": "t1",
                "name": "add_to_canvas",
                "arguments": {"type": "dataframe", "columns": ["name"], "rows": [["a"]]},
            }),
            json!({"type": "tool_call_end", "id": "t1", "result": {"content": "added", "error": false}}),
            json!({"type": "text_delta", "text": " Done."}),
            json!({"type": "done"}),
        ],
    )
    .await;

    assert_eq!(status, RunStatus::Completed);

    let elements = assistant_elements(&session);
    assert_eq!(elements.len(), 3);
    assert_eq!(
        elements[0],
        TurnElement::Text {
            content: "Loading data.".to_string()
        }
    );
    match &elements[1] {
        TurnElement::ToolCall(call) => {
            assert_eq!(call.name, "add_to_canvas");
            assert_eq!(call.status, ToolStatus::Succeeded);
        }
        other => panic!("unexpected element: {other:?}"),
    }
    assert_eq!(
        elements[2],
        TurnElement::Text {
            content: " Done.".to_string()
        }
    );

    let items = session.canvas().items();
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0].payload, CanvasPayload::DataFrame { .. }));

    let turns = session.transcript().snapshot();
    assert!(turns.last().expect("turn").response_time_ms.expect("stamped") >= 1);
}

#[tokio::test]
async fn test_interleaved_deltas_start_separate_elements() {
    let mut session = session();
    run_script(
        &mut session,
        vec![
            json!({"type": "text_delta", "text": "a"}),
            json!({"type": "thinking_delta", "text": "hmm"}),
            json!({"type": "thinking_delta", "text": " more"}),
            json!({"type": "text_delta", "text": "b"}),
            json!({"type": "done"}),
        ],
    )
    .await;

    let elements = assistant_elements(&session);
    assert_eq!(
        elements,
        vec![
            TurnElement::Text {
                content: "a".to_string()
            },
            TurnElement::Thinking {
                content: "hmm more".to_string()
            },
            TurnElement::Text {
                content: "b".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_tool_failure_follows_error_flag_not_text() {
    let mut session = session();
    let status = run_script(
        &mut session,
        vec![
            json!({"type": "tool_call", "id": "t1", "name": "read_file", "arguments": {"path": "log.txt"},
                   "result": {"content": "the log mentions error: disk full", "error": false}}),
            json!({"type": "tool_call", "id": "t2", "name": "read_file", "arguments": {"path": "gone.txt"},
                   "result": {"content": "no such file", "error": true}}),
            json!({"type": "done"}),
        ],
    )
    .await;

    // A failed tool does not fail the run.
    assert_eq!(status, RunStatus::Completed);
    let calls = session.tool_calls();
    assert_eq!(calls[0].status, ToolStatus::Succeeded);
    assert_eq!(calls[1].status, ToolStatus::Failed);
}

#[tokio::test]
async fn test_out_of_order_result_and_interrupted_call() {
    let mut session = session();
    let status = run_script(
        &mut session,
        vec![
            json!({"type": "tool_result", "id": "ghost", "name": "search", "result": "hits"}),
            json!({"type": "tool_call_start", "id": "slow", "name": "run_query", "arguments": {}}),
            json!({"type": "done"}),
        ],
    )
    .await;

    assert_eq!(status, RunStatus::Completed);
    let calls = session.tool_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, "ghost");
    assert_eq!(calls[0].status, ToolStatus::Succeeded);
    assert_eq!(calls[1].id, "slow");
    assert_eq!(calls[1].status, ToolStatus::Failed);
    assert!(calls[1]
        .result
        .as_ref()
        .expect("result")
        .content
        .contains("interrupted"));
}

#[tokio::test]
async fn test_todos_stick_for_the_run_and_reset_on_next() {
    let mut session = session();
    run_script(
        &mut session,
        vec![
            json!({"type": "todo_update", "todos": [{"text": "load data", "status": "in_progress"}]}),
            json!({"type": "text_delta", "text": "working"}),
            json!({"type": "todo_update", "todos": [{"text": "load data", "status": "done"}]}),
            json!({"type": "done"}),
        ],
    )
    .await;

    assert_eq!(session.todos().len(), 1);
    assert_eq!(session.todos()[0].status, TodoStatus::Done);

    // One todo element per assistant turn, updated in place.
    let count = assistant_elements(&session)
        .iter()
        .filter(|element| matches!(element, TurnElement::Todos(_)))
        .count();
    assert_eq!(count, 1);

    // The next submission starts with a clean list.
    let handle = session.begin_run("next").expect("begin_run");
    assert!(session.todos().is_empty());
    let mut source = MockAgentSource::new(vec![vec![json!({"type": "done"})]]);
    session
        .drive(&mut source, &handle, None)
        .await
        .expect("drive");
}

#[tokio::test]
async fn test_error_chunk_fails_run_but_preserves_transcript() {
    let mut session = session();
    let status = run_script(
        &mut session,
        vec![
            json!({"type": "text_delta", "text": "partial answer"}),
            json!({"type": "error", "message": "backend exploded"}),
        ],
    )
    .await;

    assert_eq!(status, RunStatus::Failed);
    let elements = assistant_elements(&session);
    assert_eq!(
        elements[0],
        TurnElement::Text {
            content: "partial answer".to_string()
        }
    );
    assert_eq!(
        elements[1],
        TurnElement::Error {
            message: "backend exploded".to_string()
        }
    );
}

#[tokio::test]
async fn test_cancel_resolves_run_and_freezes_partial_output() {
    let mut session = session();
    let mut source = MockAgentSource::stalling(vec![vec![
        json!({"type": "text_delta", "text": "thinking about it"}),
        json!({"type": "tool_call_start", "id": "t1", "name": "run_query", "arguments": {}}),
    ]]);

    let handle = session.begin_run("slow question").expect("begin_run");
    let canceller = handle.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let status = session
        .drive(&mut source, &handle, None)
        .await
        .expect("drive");

    assert_eq!(status, RunStatus::Cancelled);
    assert_eq!(session.run_status(), Some(RunStatus::Cancelled));

    let elements = assistant_elements(&session);
    assert_eq!(
        elements[0],
        TurnElement::Text {
            content: "thinking about it".to_string()
        }
    );
    match &elements[1] {
        TurnElement::ToolCall(call) => {
            assert_eq!(call.status, ToolStatus::Failed);
            assert!(call
                .result
                .as_ref()
                .expect("result")
                .content
                .contains("interrupted"));
        }
        other => panic!("unexpected element: {other:?}"),
    }
}

#[tokio::test]
async fn test_done_chunk_on_a_cancelling_run_resolves_cancelled() {
    let mut session = session();
    let handle = session.begin_run("input").expect("begin_run");
    session.request_cancel(handle.run_id).expect("cancel");
    assert_eq!(session.run_status(), Some(RunStatus::Cancelling));

    session.apply_event(crate::state::RunEvent::RunDone, None);
    assert_eq!(session.run_status(), Some(RunStatus::Cancelled));
}

/// Source that keeps streaming after being asked to stop.
struct StubbornSource {
    script: Vec<Value>,
}

impl AgentSource for StubbornSource {
    fn invoke<'a>(&'a mut self, _input: &'a str) -> BoxFuture<'a, Result<ChunkStream>> {
        let items: Vec<Result<Value>> = self.script.drain(..).map(Ok).collect();
        Box::pin(async move { Ok(Box::pin(futures::stream::iter(items)) as ChunkStream) })
    }

    fn request_cancel(&self) {}
}

#[tokio::test]
async fn test_cancel_wins_over_a_source_that_keeps_streaming() {
    let mut session = session();
    let mut source = StubbornSource {
        script: vec![
            json!({"type": "text_delta", "text": "after the stop request"}),
            json!({"type": "done"}),
        ],
    };

    let handle = session.begin_run("stop this").expect("begin_run");
    handle.cancel();

    let status = session
        .drive(&mut source, &handle, None)
        .await
        .expect("drive");

    // The terminal chunk the source pushed anyway never flips the run to
    // completed, and nothing streamed after the cancellation is applied.
    assert_eq!(status, RunStatus::Cancelled);
    assert_eq!(session.run_status(), Some(RunStatus::Cancelled));
    assert!(assistant_elements(&session).is_empty());
}

#[tokio::test]
async fn test_second_submission_while_active_is_rejected() {
    let mut session = session();
    let handle = session.begin_run("first").expect("begin_run");
    assert_eq!(
        session.begin_run("second").unwrap_err(),
        SessionError::RunAlreadyActive
    );

    let mut source = MockAgentSource::new(vec![vec![json!({"type": "done"})]]);
    session
        .drive(&mut source, &handle, None)
        .await
        .expect("drive");

    // Terminal run: the session accepts a new submission.
    assert!(session.begin_run("second").is_ok());
}

#[tokio::test]
async fn test_update_canvas_item_routes_and_warns_on_unknown_id() {
    let mut session = session();
    let item = session.canvas().append(CanvasPayload::Markdown {
        text: "v1".to_string(),
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut source = MockAgentSource::new(vec![vec![
        json!({"type": "tool_call", "id": "t1", "name": "update_canvas_item",
               "arguments": {"id": item.id, "item": {"type": "markdown", "data": "v2"}},
               "result": {"content": "updated", "error": false}}),
        json!({"type": "tool_call", "id": "t2", "name": "update_canvas_item",
               "arguments": {"id": "canvas_missing", "item": {"type": "markdown", "data": "x"}},
               "result": {"content": "updated", "error": false}}),
        json!({"type": "done"}),
    ]]);

    let handle = session.begin_run("edit the canvas").expect("begin_run");
    session
        .drive(&mut source, &handle, Some(&tx))
        .await
        .expect("drive");

    let items = session.canvas().items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, item.id);
    assert_eq!(
        items[0].payload,
        CanvasPayload::Markdown {
            text: "v2".to_string()
        }
    );

    let mut saw_warning = false;
    while let Ok(update) = rx.try_recv() {
        if let SessionUpdate::Warning { message } = update {
            assert!(message.contains("canvas_missing"));
            saw_warning = true;
        }
    }
    assert!(saw_warning);
}

#[tokio::test]
async fn test_updates_arrive_in_order_and_end_with_run_finished() {
    let mut session = session();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut source = MockAgentSource::new(vec![vec![
        json!({"type": "text_delta", "text": "a"}),
        json!({"type": "text_delta", "text": "b"}),
        json!({"type": "done"}),
    ]]);

    let handle = session.begin_run("hi").expect("begin_run");
    session
        .drive(&mut source, &handle, Some(&tx))
        .await
        .expect("drive");

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    assert_eq!(
        updates[0],
        SessionUpdate::ElementStarted { turn: 1, element: 0 }
    );
    assert_eq!(
        updates[1],
        SessionUpdate::ElementDelta { turn: 1, element: 0 }
    );
    assert_eq!(
        updates.last().expect("updates"),
        &SessionUpdate::RunFinished {
            run_id: handle.run_id,
            status: RunStatus::Completed
        }
    );
}
