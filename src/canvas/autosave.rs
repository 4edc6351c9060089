use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc::{self, UnboundedSender};

use super::markdown;
use super::store::{CanvasChange, CanvasStore};
use super::item::CanvasItem;
use crate::workspace::Workspace;

const CANVAS_PATH: &str = ".canvas/canvas.md";
const ARCHIVE_PATH: &str = ".canvas/canvas_archive.md";

/// Workspace-backed storage for the canvas document and its archive.
pub struct CanvasPersistence {
    workspace: Arc<dyn Workspace>,
    canvas_path: String,
    archive_path: String,
}

impl CanvasPersistence {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self {
            workspace,
            canvas_path: CANVAS_PATH.to_string(),
            archive_path: ARCHIVE_PATH.to_string(),
        }
    }

    /// Overwrite the active document with the current item sequence.
    pub fn write_active(&self, items: &[CanvasItem]) -> Result<()> {
        let document = markdown::export_document(items);
        self.workspace
            .write_text(&self.canvas_path, &document)
            .context("Failed to persist canvas document")
    }

    /// Append an archive snapshot. Each clear adds one dated section so the
    /// archive file keeps a full history across sessions.
    pub fn append_archive(&self, items: &[CanvasItem], now_ms: u64) -> Result<()> {
        let mut section = format!("\n# Archived canvas ({now_ms})\n");
        section.push_str(&markdown::render_items(items));
        self.workspace
            .append_text(&self.archive_path, &section)
            .context("Failed to append canvas archive")
    }

    /// Load the persisted document, if one exists.
    pub fn load_active(&self) -> Result<Option<String>> {
        if !self.workspace.exists(&self.canvas_path) {
            return Ok(None);
        }
        self.workspace.read_text(&self.canvas_path).map(Some)
    }
}

/// Start the debounced autosave task and wire it into the store.
///
/// Every mutation pings the returned channel; the task waits for the pings
/// to go quiet for `debounce` before writing, so bursts of canvas activity
/// during a run coalesce into one write. A final write happens when the
/// store drops its sender.
pub fn spawn_autosave(
    store: &CanvasStore,
    persistence: Arc<CanvasPersistence>,
    debounce: Duration,
) -> UnboundedSender<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    store.set_autosave(tx.clone());

    let store = store.clone();
    tokio::spawn(async move {
        loop {
            if rx.recv().await.is_none() {
                break;
            }

            let sleep = tokio::time::sleep(debounce);
            tokio::pin!(sleep);
            let mut open = true;
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    ping = rx.recv() => {
                        if ping.is_none() {
                            open = false;
                            break;
                        }
                        sleep.as_mut().reset(tokio::time::Instant::now() + debounce);
                    }
                }
            }

            write_snapshot(&store, &persistence);
            if !open {
                break;
            }
        }
        // Channel closed: one last write so nothing is lost on shutdown.
        write_snapshot(&store, &persistence);
    });

    tx
}

fn write_snapshot(store: &CanvasStore, persistence: &CanvasPersistence) {
    let items = store.items();
    match persistence.write_active(&items) {
        Ok(()) => store.notify(CanvasChange::Persisted),
        Err(err) => store.notify(CanvasChange::PersistFailed {
            message: format!("{err:#}"),
        }),
    }
}
