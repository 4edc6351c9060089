pub mod agent;
pub mod canvas;
pub mod config;
pub mod state;
pub mod util;
pub mod workspace;

#[cfg(test)]
pub mod test_support;
