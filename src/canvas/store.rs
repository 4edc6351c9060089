use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use super::autosave::CanvasPersistence;
use super::item::{generate_item_id, CanvasItem, CanvasPayload};
use super::markdown;
use crate::util::epoch_millis;

#[derive(Debug, PartialEq, Eq)]
pub enum CanvasError {
    NotFound(String),
}

impl std::fmt::Display for CanvasError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanvasError::NotFound(id) => write!(f, "no canvas item with id {id}"),
        }
    }
}

impl std::error::Error for CanvasError {}

/// Change notifications pushed to whatever front-end is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasChange {
    Appended { id: String },
    Updated { id: String },
    CollapseToggled { id: String, collapsed: bool },
    Deleted { id: String },
    Cleared { count: usize },
    Persisted,
    PersistFailed { message: String },
}

struct Inner {
    items: Vec<CanvasItem>,
    archive: Vec<CanvasItem>,
    notifier: Option<UnboundedSender<CanvasChange>>,
    autosave: Option<UnboundedSender<()>>,
    persistence: Option<Arc<CanvasPersistence>>,
}

/// Ordered artifact sequence shared between the run driver, the autosave
/// task, and the presentation layer. Clones share state.
#[derive(Clone)]
pub struct CanvasStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for CanvasStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                items: Vec::new(),
                archive: Vec::new(),
                notifier: None,
                autosave: None,
                persistence: None,
            })),
        }
    }

    pub fn set_notifier(&self, tx: UnboundedSender<CanvasChange>) {
        self.lock().notifier = Some(tx);
    }

    pub(super) fn set_autosave(&self, tx: UnboundedSender<()>) {
        self.lock().autosave = Some(tx);
    }

    pub fn attach_persistence(&self, persistence: Arc<CanvasPersistence>) {
        self.lock().persistence = Some(persistence);
    }

    /// Append a new item at the end of the sequence.
    pub fn append(&self, payload: CanvasPayload) -> CanvasItem {
        let item = CanvasItem {
            id: generate_item_id(),
            payload,
            created_at_ms: epoch_millis(),
            collapsed: false,
            archived: false,
        };
        {
            let mut inner = self.lock();
            inner.items.push(item.clone());
        }
        self.notify(CanvasChange::Appended {
            id: item.id.clone(),
        });
        self.ping_autosave();
        item
    }

    /// Replace an item's content in place; id, position, and creation time
    /// are preserved.
    pub fn update(&self, id: &str, payload: CanvasPayload) -> Result<(), CanvasError> {
        {
            let mut inner = self.lock();
            let item = inner
                .items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or_else(|| CanvasError::NotFound(id.to_string()))?;
            item.payload = payload;
        }
        self.notify(CanvasChange::Updated { id: id.to_string() });
        self.ping_autosave();
        Ok(())
    }

    /// Toggle the presentation flag. Unknown ids are a silent no-op, which
    /// tolerates stale references after a concurrent delete.
    pub fn set_collapsed(&self, id: &str, collapsed: bool) {
        let toggled = {
            let mut inner = self.lock();
            match inner.items.iter_mut().find(|item| item.id == id) {
                Some(item) => {
                    item.collapsed = collapsed;
                    true
                }
                None => false,
            }
        };
        if toggled {
            self.notify(CanvasChange::CollapseToggled {
                id: id.to_string(),
                collapsed,
            });
            self.ping_autosave();
        }
    }

    pub fn delete(&self, id: &str) -> Result<CanvasItem, CanvasError> {
        let removed = {
            let mut inner = self.lock();
            let index = inner
                .items
                .iter()
                .position(|item| item.id == id)
                .ok_or_else(|| CanvasError::NotFound(id.to_string()))?;
            inner.items.remove(index)
        };
        self.notify(CanvasChange::Deleted { id: id.to_string() });
        self.ping_autosave();
        Ok(removed)
    }

    /// Move every active item into the archive log and snapshot them to the
    /// archive file. The active document becomes empty. Returns the items
    /// that were archived, in their canvas order.
    pub fn archive_and_clear(&self) -> Vec<CanvasItem> {
        let (archived, persistence) = {
            let mut inner = self.lock();
            let mut archived = std::mem::take(&mut inner.items);
            for item in &mut archived {
                item.archived = true;
            }
            inner.archive.extend(archived.iter().cloned());
            (archived, inner.persistence.clone())
        };

        if let Some(persistence) = persistence {
            if !archived.is_empty() {
                if let Err(err) = persistence.append_archive(&archived, epoch_millis()) {
                    self.notify(CanvasChange::PersistFailed {
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        self.notify(CanvasChange::Cleared {
            count: archived.len(),
        });
        self.ping_autosave();
        archived
    }

    /// Replace the active sequence with the contents of a persisted
    /// document. Used at startup; does not ping autosave.
    pub fn load_document(&self, content: &str) {
        let items = markdown::parse_document(content);
        self.lock().items = items;
    }

    pub fn items(&self) -> Vec<CanvasItem> {
        self.lock().items.clone()
    }

    pub fn archive_snapshot(&self) -> Vec<CanvasItem> {
        self.lock().archive.clone()
    }

    pub fn export_markdown(&self) -> String {
        let items = self.items();
        markdown::export_document(&items)
    }

    pub(super) fn notify(&self, change: CanvasChange) {
        let notifier = self.lock().notifier.clone();
        if let Some(tx) = notifier {
            let _ = tx.send(change);
        }
    }

    fn ping_autosave(&self) {
        let autosave = self.lock().autosave.clone();
        if let Some(tx) = autosave {
            let _ = tx.send(());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
