//! Job planning and input discovery.

pub mod discovery;
pub mod planner;
pub mod types;

pub use planner::{JobRequest, PlanError, PlanOrdering, Planner, SUPPORTED_EXTENSIONS};
pub use types::{Job, PlannedOperation, TaskRecord, TaskStatus};
