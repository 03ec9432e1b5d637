//! Job and task data structures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::ParamMap;

/// One catalog operation with its fully resolved parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedOperation {
    /// Catalog operation id.
    pub id: String,
    /// Resolved parameter map (defaults merged with overrides).
    pub params: ParamMap,
}

/// An immutable, validated unit of work.
///
/// Produced by the planner; once submitted to the engine it is never
/// modified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: String,
    /// Operations to apply to every input, in execution order.
    pub operations: Vec<PlannedOperation>,
    /// Input video files.
    pub inputs: Vec<PathBuf>,
    /// Destination directory for final outputs.
    pub output_dir: PathBuf,
    /// ISO timestamp when the job was planned.
    pub created_at: String,
}

impl Job {
    /// Total number of tasks (one per operation per input file).
    pub fn task_count(&self) -> usize {
        self.operations.len() * self.inputs.len()
    }
}

/// Execution record for one (file, operation) pair.
///
/// Maintained by the engine while a job runs; snapshots are exposed
/// through the job handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub job_id: String,
    pub file_path: PathBuf,
    pub operation_id: String,
    pub status: TaskStatus,
    /// ISO timestamp, set when the task is dispatched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// ISO timestamp, set when the task finishes (any outcome).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Failure or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskRecord {
    pub fn new(job_id: &str, file_path: &std::path::Path, operation_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            file_path: file_path.to_path_buf(),
            operation_id: operation_id.to_string(),
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

/// Status of one (file, operation) task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    /// Not yet dispatched.
    #[default]
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Never ran (earlier failure in the chain, or job stopped).
    Skipped,
}

impl TaskStatus {
    /// Display string for shells and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
        }
    }

    /// Whether this status counts toward the completed counter.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}
