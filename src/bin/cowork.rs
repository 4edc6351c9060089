use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use cowork::agent::HttpAgentSource;
use cowork::canvas::{spawn_autosave, CanvasPersistence, CanvasStore};
use cowork::config::Config;
use cowork::state::{RunStatus, Session, SessionUpdate, TurnElement};
use cowork::util::format_response_time;
use cowork::workspace::LocalWorkspace;

/// Thin line-oriented driver: one run per stdin line, Ctrl-C cancels the
/// in-flight run, `:canvas` / `:clear` / `:quit` exercise the canvas.
#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let workspace = Arc::new(LocalWorkspace::new(config.workspace_root.clone()));
    let persistence = Arc::new(CanvasPersistence::new(workspace));
    let canvas = CanvasStore::new();
    if let Some(document) = persistence.load_active()? {
        canvas.load_document(&document);
    }
    canvas.attach_persistence(persistence.clone());
    spawn_autosave(
        &canvas,
        persistence,
        Duration::from_millis(config.autosave_debounce_ms),
    );

    let mut source = HttpAgentSource::new(&config);
    let mut session = Session::new(canvas.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            ":quit" => break,
            ":canvas" => println!("{}", canvas.export_markdown()),
            ":clear" => clear_canvas(&canvas, &mut lines).await?,
            input => run_turn(&mut session, &mut source, input).await?,
        }
        prompt()?;
    }

    Ok(())
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

async fn clear_canvas(canvas: &CanvasStore, lines: &mut Lines<BufReader<Stdin>>) -> Result<()> {
    let count = canvas.items().len();
    if count == 0 {
        println!("canvas is already empty");
        return Ok(());
    }
    print!("archive {count} canvas item(s)? [y/N] ");
    std::io::stdout().flush()?;
    match lines.next_line().await? {
        Some(answer) if answer.trim().eq_ignore_ascii_case("y") => {
            let archived = canvas.archive_and_clear();
            println!("archived {} item(s)", archived.len());
        }
        _ => println!("kept the canvas"),
    }
    Ok(())
}

async fn run_turn(
    session: &mut Session,
    source: &mut HttpAgentSource,
    input: &str,
) -> Result<()> {
    let handle = match session.begin_run(input) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{err}");
            return Ok(());
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let status = {
        let drive = session.drive(source, &handle, Some(&tx));
        tokio::pin!(drive);
        loop {
            tokio::select! {
                result = &mut drive => break result?,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("cancelling...");
                    handle.cancel();
                }
                Some(update) = rx.recv() => print_update(update),
            }
        }
    };
    while let Ok(update) = rx.try_recv() {
        print_update(update);
    }

    print_turn(session, status);
    Ok(())
}

fn print_update(update: SessionUpdate) {
    match update {
        SessionUpdate::Warning { message } => eprintln!("warning: {message}"),
        SessionUpdate::ArtifactAppended { item_id } => println!("[canvas] added {item_id}"),
        _ => {}
    }
}

fn print_turn(session: &Session, status: RunStatus) {
    let turns = session.transcript().snapshot();
    let Some(turn) = turns.last() else {
        return;
    };
    for element in &turn.elements {
        match element {
            TurnElement::Text { content } => println!("{content}"),
            TurnElement::Thinking { .. } => {}
            TurnElement::ToolCall(call) => {
                println!("[tool] {} -> {:?}", call.name, call.status)
            }
            TurnElement::Todos(todos) => {
                for todo in todos {
                    println!("[todo] {:?}: {}", todo.status, todo.text);
                }
            }
            TurnElement::Error { message } => eprintln!("error: {message}"),
        }
    }
    if let Some(ms) = turn.response_time_ms {
        println!("({status:?} in {})", format_response_time(ms));
    }
}
