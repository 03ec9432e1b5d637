//! Workspace resolver.
//!
//! Maps (job, file) pairs to concrete filesystem paths: a per-job work
//! directory for chain intermediates, and claimed final output names
//! under the destination directory. Output names are claimed with an
//! atomic create-or-fail open so concurrent chains and stale leftovers
//! can never be overwritten.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Filesystem refusal while resolving or claiming a path.
#[derive(Debug, Error)]
#[error("path error at {path}: {source}")]
pub struct PathError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl PathError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Resolves work and output paths for one job.
pub struct WorkspaceResolver {
    output_dir: PathBuf,
    work_root: PathBuf,
    job_id: String,
}

impl WorkspaceResolver {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        work_root: impl Into<PathBuf>,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            work_root: work_root.into(),
            job_id: job_id.into(),
        }
    }

    /// Per-file work directory for chain intermediates. Created on
    /// first use.
    pub fn chain_work_dir(&self, input: &Path) -> Result<PathBuf, PathError> {
        let stem = file_stem(input);
        let dir = self.work_root.join(&self.job_id).join(stem);
        std::fs::create_dir_all(&dir).map_err(|e| PathError::new(&dir, e))?;
        Ok(dir)
    }

    /// Path for the output of step `index` in a file's chain.
    ///
    /// Intermediates keep the input's container extension so every
    /// step reads and writes the same format.
    pub fn step_output(&self, work_dir: &Path, input: &Path, index: usize) -> PathBuf {
        let ext = extension(input);
        work_dir.join(format!("step_{:02}.{}", index, ext))
    }

    /// Claim a final output name for `input` under the destination
    /// directory.
    ///
    /// The base name is `<stem>__<jobid>.<ext>`; if that already
    /// exists a numeric disambiguator is appended (`-2`, `-3`, ...).
    /// The claim is an `O_CREAT|O_EXCL` open, so a name observed as
    /// free can never be stolen between check and create.
    pub fn claim_final_output(&self, input: &Path) -> Result<PathBuf, PathError> {
        let stem = file_stem(input);
        let ext = extension(input);

        let mut counter = 1u32;
        loop {
            let name = if counter == 1 {
                format!("{}__{}.{}", stem, self.job_id, ext)
            } else {
                format!("{}__{}-{}.{}", stem, self.job_id, counter, ext)
            };
            let candidate = self.output_dir.join(name);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(_) => {
                    tracing::debug!(path = %candidate.display(), "claimed output name");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    counter += 1;
                }
                Err(e) => return Err(PathError::new(&candidate, e)),
            }
        }
    }

    /// Move a finished chain result onto a claimed output path.
    ///
    /// Rename when possible; falls back to copy + remove across
    /// filesystems (the work root may live on a different mount).
    pub fn publish(&self, result: &Path, claimed: &Path) -> Result<(), PathError> {
        match std::fs::rename(result, claimed) {
            Ok(()) => Ok(()),
            Err(_) => {
                std::fs::copy(result, claimed).map_err(|e| PathError::new(claimed, e))?;
                std::fs::remove_file(result).map_err(|e| PathError::new(result, e))?;
                Ok(())
            }
        }
    }

    /// Remove a file's work directory after its chain finishes.
    pub fn cleanup_chain(&self, input: &Path) {
        let dir = self.work_root.join(&self.job_id).join(file_stem(input));
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(dir = %dir.display(), error = %e, "failed to clean work dir");
            }
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "input".to_string())
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "mp4".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver(out: &TempDir, work: &TempDir, job_id: &str) -> WorkspaceResolver {
        WorkspaceResolver::new(out.path(), work.path(), job_id)
    }

    #[test]
    fn claims_base_name_first() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let ws = resolver(&out, &work, "abc123");

        let claimed = ws.claim_final_output(Path::new("/in/clip.mp4")).unwrap();
        assert_eq!(
            claimed.file_name().unwrap().to_str().unwrap(),
            "clip__abc123.mp4"
        );
        assert!(claimed.exists());
    }

    #[test]
    fn disambiguates_on_collision() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let ws = resolver(&out, &work, "abc123");

        let first = ws.claim_final_output(Path::new("/in/clip.mp4")).unwrap();
        let second = ws.claim_final_output(Path::new("/in/clip.mp4")).unwrap();
        assert_ne!(first, second);
        assert_eq!(
            second.file_name().unwrap().to_str().unwrap(),
            "clip__abc123-2.mp4"
        );
    }

    #[test]
    fn resubmission_with_new_job_id_never_collides() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();

        let a = resolver(&out, &work, "job_a")
            .claim_final_output(Path::new("/in/clip.mp4"))
            .unwrap();
        let b = resolver(&out, &work, "job_b")
            .claim_final_output(Path::new("/in/clip.mp4"))
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn step_outputs_keep_container_extension() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let ws = resolver(&out, &work, "j");

        let dir = ws.chain_work_dir(Path::new("/in/clip.mkv")).unwrap();
        let step = ws.step_output(&dir, Path::new("/in/clip.mkv"), 3);
        assert!(step.to_string_lossy().ends_with("step_03.mkv"));
    }

    #[test]
    fn publish_moves_result_onto_claim() {
        let out = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let ws = resolver(&out, &work, "j");

        let dir = ws.chain_work_dir(Path::new("/in/clip.mp4")).unwrap();
        let result = ws.step_output(&dir, Path::new("/in/clip.mp4"), 0);
        std::fs::write(&result, b"data").unwrap();

        let claimed = ws.claim_final_output(Path::new("/in/clip.mp4")).unwrap();
        ws.publish(&result, &claimed).unwrap();
        assert_eq!(std::fs::read(&claimed).unwrap(), b"data");
        assert!(!result.exists());
    }
}
