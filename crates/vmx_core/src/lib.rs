//! Video Matrix core - batch video transformation engine
//!
//! This crate contains all business logic with zero UI dependencies:
//! the operation catalog, job planning, the execution engine and its
//! event stream, workspace path resolution, configuration, and
//! per-job logging. A CLI or GUI shell drives it.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod executor;
pub mod jobs;
pub mod logging;
pub mod workspace;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
