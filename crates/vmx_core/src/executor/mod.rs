//! Task execution.
//!
//! One task is one (operation, input file) pair. The [`TaskRunner`]
//! trait is the seam between the engine and the outside world: the
//! production [`FfmpegRunner`] shells out to ffmpeg/ffprobe, tests
//! substitute a mock.

pub mod command;
pub mod probe;

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::MaterialSettings;
use crate::jobs::PlannedOperation;
use crate::logging::JobLogger;

pub use command::{build_plan, needs_duration, CommandPlan};

/// Errors from running a single task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("{tool} failed (exit code {exit_code:?}): {message}")]
    ExternalTool {
        tool: String,
        exit_code: Option<i32>,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),
}

impl TaskError {
    pub fn external_tool(
        tool: impl Into<String>,
        exit_code: Option<i32>,
        message: impl Into<String>,
    ) -> Self {
        TaskError::ExternalTool {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }
}

/// Outcome of one successful task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    /// Where the task wrote its result.
    pub output_path: PathBuf,
    /// Wall-clock execution time.
    pub elapsed: Duration,
}

/// Runs one task to completion or failure.
pub trait TaskRunner: Send + Sync {
    fn run(
        &self,
        op: &PlannedOperation,
        input: &Path,
        output: &Path,
        logger: &JobLogger,
        timeout: Duration,
    ) -> Result<TaskReport, TaskError>;
}

/// Production runner shelling out to ffmpeg and ffprobe.
pub struct FfmpegRunner {
    ffmpeg: String,
    ffprobe: String,
    materials: MaterialSettings,
}

impl FfmpegRunner {
    pub fn new(materials: MaterialSettings) -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            materials,
        }
    }

    /// Override the tool binaries (non-PATH installs).
    pub fn with_tools(mut self, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    fn run_ffmpeg(
        &self,
        args: &[String],
        logger: &JobLogger,
        timeout: Duration,
    ) -> Result<(), TaskError> {
        logger.command(&format!("{} {}", self.ffmpeg, args.join(" ")));

        let mut child = Command::new(&self.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain stderr on a side thread so the pipe never backs up.
        let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let drain = child.stderr.take().map(|stderr| {
            let captured = Arc::clone(&captured);
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    captured.lock().push(line);
                }
            })
        });

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                if let Some(handle) = drain {
                    let _ = handle.join();
                }
                logger.error(&format!("ffmpeg killed after {:?}", timeout));
                return Err(TaskError::Timeout(timeout));
            }
            std::thread::sleep(Duration::from_millis(50));
        };

        if let Some(handle) = drain {
            let _ = handle.join();
        }
        for line in captured.lock().iter() {
            logger.output_line(line, true);
        }

        if !status.success() {
            logger.show_tail("ffmpeg");
            let tail = logger.tail_lines().join("\n");
            return Err(TaskError::external_tool("ffmpeg", status.code(), tail));
        }
        Ok(())
    }
}

impl TaskRunner for FfmpegRunner {
    fn run(
        &self,
        op: &PlannedOperation,
        input: &Path,
        output: &Path,
        logger: &JobLogger,
        timeout: Duration,
    ) -> Result<TaskReport, TaskError> {
        let started = Instant::now();
        logger.clear_tail();

        let duration = if needs_duration(&op.id) {
            Some(probe::duration_secs(&self.ffprobe, input)?)
        } else {
            None
        };

        let plan = build_plan(
            op,
            input,
            output,
            &self.materials,
            duration,
            &mut rand::thread_rng(),
        )?;

        match plan {
            CommandPlan::Ffmpeg(args) => self.run_ffmpeg(&args, logger, timeout)?,
            CommandPlan::TouchFile => {
                logger.debug(&format!(
                    "copy and restamp {} -> {}",
                    input.display(),
                    output.display()
                ));
                std::fs::copy(input, output)?;
                filetime::set_file_mtime(output, filetime::FileTime::now())?;
            }
        }

        tracing::debug!(
            operation = %op.id,
            input = %input.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "task finished"
        );

        Ok(TaskReport {
            output_path: output.to_path_buf(),
            elapsed: started.elapsed(),
        })
    }
}
