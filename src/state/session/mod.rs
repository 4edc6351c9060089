mod apply;
mod drive;
mod state;

#[cfg(test)]
mod tests;

pub use state::{RunHandle, Session, SessionError, SessionUpdate};
