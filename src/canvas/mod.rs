pub mod autosave;
pub mod item;
pub mod markdown;
pub mod store;

pub use autosave::{spawn_autosave, CanvasPersistence};
pub use item::{parse_artifact, CanvasItem, CanvasPayload};
pub use store::{CanvasChange, CanvasError, CanvasStore};
