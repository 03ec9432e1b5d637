//! Job planning and validation.
//!
//! The planner turns a user selection into an immutable [`Job`], or
//! fails synchronously without creating one. Every id, input path and
//! the output directory are checked up front so the engine never sees
//! an invalid job.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, ParamMap};

use super::types::{Job, PlannedOperation};

/// Container extensions accepted as inputs.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["mp4", "mov", "mkv", "avi", "wmv", "flv", "webm", "m4v"];

/// Errors raised during planning. No [`Job`] is created on error.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown operation '{0}'")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid output directory: {0}")]
    InvalidOutput(String),
}

impl PlanError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        PlanError::InvalidInput(msg.into())
    }

    pub fn invalid_output(msg: impl Into<String>) -> Self {
        PlanError::InvalidOutput(msg.into())
    }
}

impl From<CatalogError> for PlanError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => PlanError::NotFound(id),
            CatalogError::InvalidParameter { .. } => PlanError::InvalidInput(err.to_string()),
        }
    }
}

/// Execution ordering for the selected operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanOrdering {
    /// Catalog order: category, then declaration order.
    #[default]
    Catalog,
    /// The order the ids were supplied in.
    AsSelected,
}

/// What the caller wants to run.
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    /// Selected operation ids.
    pub operation_ids: Vec<String>,
    /// Per-operation parameter overrides.
    pub overrides: BTreeMap<String, ParamMap>,
    /// Input video files.
    pub inputs: Vec<PathBuf>,
    /// Destination directory for final outputs.
    pub output_dir: PathBuf,
    /// Operation ordering.
    pub ordering: PlanOrdering,
}

/// Stateless planner over a catalog.
pub struct Planner {
    catalog: &'static Catalog,
}

impl Planner {
    pub fn new(catalog: &'static Catalog) -> Self {
        Self { catalog }
    }

    /// Validate a request and produce an immutable [`Job`].
    pub fn plan(&self, request: &JobRequest) -> Result<Job, PlanError> {
        let operations = self.resolve_operations(request)?;
        if operations.is_empty() {
            return Err(PlanError::invalid_input("no operations selected"));
        }

        self.check_inputs(&request.inputs)?;
        self.check_output_dir(&request.output_dir, &request.inputs)?;

        let job = Job {
            id: uuid::Uuid::new_v4().simple().to_string(),
            operations,
            inputs: request.inputs.clone(),
            output_dir: request.output_dir.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        tracing::info!(
            job_id = %job.id,
            operations = job.operations.len(),
            inputs = job.inputs.len(),
            "job planned"
        );

        Ok(job)
    }

    fn resolve_operations(&self, request: &JobRequest) -> Result<Vec<PlannedOperation>, PlanError> {
        // Validate every id before resolving anything.
        for id in &request.operation_ids {
            if !self.catalog.contains(id) {
                return Err(PlanError::NotFound(id.clone()));
            }
        }

        let empty = ParamMap::new();
        let mut seen = std::collections::HashSet::new();
        let mut ordered: Vec<&str> = request
            .operation_ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();

        if request.ordering == PlanOrdering::Catalog {
            // Stable catalog position per id.
            let position = |id: &str| {
                self.catalog
                    .list()
                    .iter()
                    .position(|op| op.id == id)
                    .unwrap_or(usize::MAX)
            };
            ordered.sort_by_key(|id| position(id));
        }

        ordered
            .into_iter()
            .map(|id| {
                let overrides = request.overrides.get(id).unwrap_or(&empty);
                let params = self.catalog.resolve_parameters(id, overrides)?;
                Ok(PlannedOperation {
                    id: id.to_string(),
                    params,
                })
            })
            .collect()
    }

    fn check_inputs(&self, inputs: &[PathBuf]) -> Result<(), PlanError> {
        if inputs.is_empty() {
            return Err(PlanError::invalid_input("no input files"));
        }
        for path in inputs {
            if !path.is_file() {
                return Err(PlanError::invalid_input(format!(
                    "not a file: {}",
                    path.display()
                )));
            }
            if !is_supported(path) {
                return Err(PlanError::invalid_input(format!(
                    "unsupported container: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn check_output_dir(&self, output_dir: &Path, inputs: &[PathBuf]) -> Result<(), PlanError> {
        if !output_dir.is_dir() {
            return Err(PlanError::invalid_output(format!(
                "not a directory: {}",
                output_dir.display()
            )));
        }

        // A directory that exists but refuses writes should fail
        // planning, not surface mid-run after work has been spent.
        let scratch = output_dir.join(format!(
            ".vmx-write-check-{}",
            uuid::Uuid::new_v4().simple()
        ));
        match OpenOptions::new().write(true).create_new(true).open(&scratch) {
            Ok(_) => {
                let _ = std::fs::remove_file(&scratch);
            }
            Err(e) => {
                return Err(PlanError::invalid_output(format!(
                    "not writable: {}: {}",
                    output_dir.display(),
                    e
                )));
            }
        }

        // Symlinks and relative paths must not disguise the input
        // parent as a distinct directory.
        let canonical_out = output_dir.canonicalize().map_err(|e| {
            PlanError::invalid_output(format!("{}: {}", output_dir.display(), e))
        })?;
        for input in inputs {
            if let Some(parent) = input.parent() {
                if let Ok(canonical_parent) = parent.canonicalize() {
                    if canonical_parent == canonical_out {
                        return Err(PlanError::invalid_output(format!(
                            "output directory equals the parent of input {}",
                            input.display()
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Whether a path carries a supported container extension.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ParamValue;
    use std::fs::File;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, TempDir, PathBuf) {
        let in_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let video = in_dir.path().join("clip.mp4");
        File::create(&video).unwrap();
        (in_dir, out_dir, video)
    }

    fn request(video: PathBuf, out: PathBuf, ids: &[&str]) -> JobRequest {
        JobRequest {
            operation_ids: ids.iter().map(|s| s.to_string()).collect(),
            overrides: BTreeMap::new(),
            inputs: vec![video],
            output_dir: out,
            ordering: PlanOrdering::Catalog,
        }
    }

    #[test]
    fn unknown_operation_creates_no_job() {
        let (_in_dir, out_dir, video) = fixture();
        let planner = Planner::new(Catalog::builtin());
        let err = planner
            .plan(&request(video, out_dir.path().into(), &["mirror", "bogus"]))
            .unwrap_err();
        assert!(matches!(err, PlanError::NotFound(id) if id == "bogus"));
    }

    #[test]
    fn rejects_missing_input() {
        let (_in_dir, out_dir, _video) = fixture();
        let planner = Planner::new(Catalog::builtin());
        let err = planner
            .plan(&request(
                PathBuf::from("/no/such/file.mp4"),
                out_dir.path().into(),
                &["mirror"],
            ))
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput(_)));
    }

    #[test]
    fn rejects_unsupported_extension() {
        let (in_dir, out_dir, _video) = fixture();
        let text = in_dir.path().join("notes.txt");
        File::create(&text).unwrap();
        let planner = Planner::new(Catalog::builtin());
        let err = planner
            .plan(&request(text, out_dir.path().into(), &["mirror"]))
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidInput(_)));
    }

    #[test]
    fn rejects_output_equal_to_input_parent() {
        let (in_dir, _out_dir, video) = fixture();
        let planner = Planner::new(Catalog::builtin());
        let err = planner
            .plan(&request(video, in_dir.path().into(), &["mirror"]))
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidOutput(_)));
    }

    #[test]
    #[cfg(unix)]
    fn rejects_read_only_output_dir() {
        use std::os::unix::fs::PermissionsExt;

        let (_in_dir, out_dir, video) = fixture();
        let planner = Planner::new(Catalog::builtin());

        std::fs::set_permissions(out_dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();
        // Permission bits are not enforced for root; nothing to
        // observe in that case.
        let enforced = File::create(out_dir.path().join("canary")).is_err();
        if enforced {
            let err = planner
                .plan(&request(video, out_dir.path().into(), &["mirror"]))
                .unwrap_err();
            assert!(matches!(err, PlanError::InvalidOutput(_)));
        }
        std::fs::set_permissions(out_dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn write_check_leaves_no_scratch_file() {
        let (_in_dir, out_dir, video) = fixture();
        let planner = Planner::new(Catalog::builtin());
        planner
            .plan(&request(video, out_dir.path().into(), &["mirror"]))
            .unwrap();
        assert_eq!(std::fs::read_dir(out_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn catalog_ordering_sorts_selection() {
        let (_in_dir, out_dir, video) = fixture();
        let planner = Planner::new(Catalog::builtin());
        // "bw" (Visual Enhancement) precedes "mute" (Audio & Others);
        // "crop" (Basic Editing) precedes both.
        let job = planner
            .plan(&request(video, out_dir.path().into(), &["mute", "bw", "crop"]))
            .unwrap();
        let ids: Vec<&str> = job.operations.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["crop", "bw", "mute"]);
    }

    #[test]
    fn as_selected_ordering_is_preserved() {
        let (_in_dir, out_dir, video) = fixture();
        let planner = Planner::new(Catalog::builtin());
        let mut req = request(video, out_dir.path().into(), &["mute", "bw", "crop"]);
        req.ordering = PlanOrdering::AsSelected;
        let job = planner.plan(&req).unwrap();
        let ids: Vec<&str> = job.operations.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["mute", "bw", "crop"]);
    }

    #[test]
    fn overrides_are_resolved_into_job() {
        let (_in_dir, out_dir, video) = fixture();
        let planner = Planner::new(Catalog::builtin());
        let mut req = request(video, out_dir.path().into(), &["encode"]);
        let mut params = ParamMap::new();
        params.insert("crf".into(), ParamValue::Int(20));
        req.overrides.insert("encode".into(), params);
        let job = planner.plan(&req).unwrap();
        assert_eq!(
            job.operations[0].params.get("crf"),
            Some(&ParamValue::Int(20))
        );
    }
}
