//! Per-job logging.

pub mod job_logger;
pub mod types;

pub use job_logger::JobLogger;
pub use types::{LogCallback, LogConfig, LogLevel, MessagePrefix};
