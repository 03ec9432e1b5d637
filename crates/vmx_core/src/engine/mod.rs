//! Execution engine.
//!
//! Owns the worker pool and the job lifecycle. One engine runs at most
//! one job at a time; the unit of dispatch is a per-file operation
//! chain, so operations on one file run in order while different files
//! proceed concurrently. A failed task abandons the rest of its file's
//! chain only. `stop()` is cooperative: in-flight invocations finish,
//! nothing new is dispatched, remaining tasks are marked skipped.

pub mod events;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Settings;
use crate::executor::TaskRunner;
use crate::jobs::{Job, PlannedOperation, TaskRecord, TaskStatus};
use crate::logging::{JobLogger, LogConfig};
use crate::workspace::{PathError, WorkspaceResolver};

pub use events::{EventBus, JobEvent};

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    Planning,
    Running,
    Stopping,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Planning => "Planning",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Errors from submitting a job to the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a job is already active (engine is {})", .0.as_str())]
    AlreadyRunning(ExecutionState),

    #[error(transparent)]
    Workspace(#[from] PathError),

    #[error("failed to open job log: {0}")]
    Logger(#[from] std::io::Error),
}

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size; 0 selects the machine's parallelism.
    pub pool_size: usize,
    /// Per-invocation timeout.
    pub task_timeout: Duration,
    /// Root for per-job intermediate directories.
    pub work_root: PathBuf,
    /// Directory for per-job log files.
    pub logs_dir: PathBuf,
    /// Per-job log behavior.
    pub log_config: LogConfig,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            pool_size: settings.execution.pool_size,
            task_timeout: Duration::from_secs(settings.execution.task_timeout_secs),
            work_root: PathBuf::from(&settings.paths.work_root),
            logs_dir: PathBuf::from(&settings.paths.logs_folder),
            log_config: LogConfig {
                compact: settings.logging.compact,
                error_tail: settings.logging.error_tail,
                progress_step: settings.logging.progress_step,
                show_timestamps: settings.logging.show_timestamps,
                ..LogConfig::default()
            },
        }
    }

    fn effective_pool_size(&self, chains: usize) -> usize {
        let auto = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let size = if self.pool_size == 0 {
            auto
        } else {
            self.pool_size
        };
        size.min(chains).max(1)
    }
}

#[derive(Default)]
struct Progress {
    completed: usize,
    total: usize,
}

/// State shared between the engine facade, workers, and handles.
///
/// One block per job: a handle to a finished job keeps its own block,
/// so it stays an inert snapshot and cannot touch a later job running
/// on the same engine.
struct Shared {
    state: Mutex<ExecutionState>,
    cancel: AtomicBool,
    bus: EventBus,
    progress: Mutex<Progress>,
    failure: Mutex<Option<String>>,
    tasks: Mutex<Vec<TaskRecord>>,
}

impl Shared {
    fn idle() -> Self {
        Self {
            state: Mutex::new(ExecutionState::Idle),
            cancel: AtomicBool::new(false),
            bus: EventBus::new(),
            progress: Mutex::new(Progress::default()),
            failure: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Fresh per-job block, with the task table expanded up front.
    fn for_job(job: &Job) -> Self {
        let mut tasks = Vec::with_capacity(job.task_count());
        for input in &job.inputs {
            for op in &job.operations {
                tasks.push(TaskRecord::new(&job.id, input, &op.id));
            }
        }
        Self {
            state: Mutex::new(ExecutionState::Planning),
            cancel: AtomicBool::new(false),
            bus: EventBus::new(),
            progress: Mutex::new(Progress {
                completed: 0,
                total: job.task_count(),
            }),
            failure: Mutex::new(None),
            tasks: Mutex::new(tasks),
        }
    }

    fn mark_running(&self, file: &PathBuf, operation: &str) {
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks
            .iter_mut()
            .find(|t| &t.file_path == file && t.operation_id == operation)
        {
            task.status = TaskStatus::Running;
            task.started_at = Some(chrono::Utc::now().to_rfc3339());
        }
    }

    fn mark_finished(
        &self,
        file: &PathBuf,
        operation: &str,
        status: TaskStatus,
        error: Option<&str>,
    ) {
        let mut tasks = self.tasks.lock();
        if let Some(task) = tasks
            .iter_mut()
            .find(|t| &t.file_path == file && t.operation_id == operation)
        {
            task.status = status;
            task.finished_at = Some(chrono::Utc::now().to_rfc3339());
            task.error = error.map(|e| e.to_string());
        }
    }
    fn transition(&self, new: ExecutionState, reason: Option<String>) {
        let old = {
            let mut state = self.state.lock();
            let old = *state;
            *state = new;
            old
        };
        tracing::info!(from = old.as_str(), to = new.as_str(), "engine state change");
        self.bus.publish(JobEvent::JobStateChanged { old, new, reason });
    }

    /// Count one finished task and broadcast the new progress.
    /// Returns the completed percentage.
    fn bump_progress(&self) -> u32 {
        let (completed, total) = {
            let mut progress = self.progress.lock();
            progress.completed += 1;
            (progress.completed, progress.total)
        };
        self.bus.publish(JobEvent::JobProgress { completed, total });
        ((completed * 100) / total.max(1)) as u32
    }

    fn record_failure(&self, reason: String) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(reason);
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Handle to one submitted job.
///
/// Holds the job's own shared block; once the job is terminal the
/// handle is a read-only snapshot and `stop()` is a no-op.
pub struct JobHandle {
    job_id: String,
    shared: Arc<Shared>,
    join: Mutex<Option<JoinHandle<ExecutionState>>>,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.job_id)
            .field("state", &self.state())
            .finish()
    }
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Subscribe to this job's event stream (history replayed first).
    pub fn subscribe(&self) -> mpsc::Receiver<JobEvent> {
        self.shared.bus.subscribe()
    }

    pub fn state(&self) -> ExecutionState {
        *self.shared.state.lock()
    }

    pub fn progress(&self) -> (usize, usize) {
        let progress = self.shared.progress.lock();
        (progress.completed, progress.total)
    }

    /// Snapshot of every task's execution record.
    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.shared.tasks.lock().clone()
    }

    /// Request a cooperative stop.
    pub fn stop(&self) {
        request_stop(&self.shared);
    }

    /// Block until the job reaches a terminal state.
    pub fn wait(&self) -> ExecutionState {
        let handle = self.join.lock().take();
        match handle {
            Some(handle) => handle.join().unwrap_or(ExecutionState::Failed),
            None => self.state(),
        }
    }
}

fn request_stop(shared: &Shared) {
    let old = {
        let mut state = shared.state.lock();
        match *state {
            ExecutionState::Running | ExecutionState::Planning => {
                let old = *state;
                *state = ExecutionState::Stopping;
                old
            }
            _ => return,
        }
    };
    shared.cancel.store(true, Ordering::SeqCst);
    shared.bus.publish(JobEvent::JobStateChanged {
        old,
        new: ExecutionState::Stopping,
        reason: Some("stop requested".to_string()),
    });
    tracing::info!("stop requested, waiting for in-flight tasks");
}

/// The execution engine. Reusable across jobs, one job at a time.
pub struct ExecutionEngine {
    config: EngineConfig,
    runner: Arc<dyn TaskRunner>,
    active: Mutex<Arc<Shared>>,
}

impl ExecutionEngine {
    pub fn new(config: EngineConfig, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            config,
            runner,
            active: Mutex::new(Arc::new(Shared::idle())),
        }
    }

    pub fn state(&self) -> ExecutionState {
        let shared = Arc::clone(&self.active.lock());
        let state = *shared.state.lock();
        state
    }

    /// Subscribe to the current job's event stream.
    pub fn subscribe(&self) -> mpsc::Receiver<JobEvent> {
        let shared = Arc::clone(&self.active.lock());
        shared.bus.subscribe()
    }

    /// Request a cooperative stop of the active job.
    pub fn stop(&self) {
        let shared = Arc::clone(&self.active.lock());
        request_stop(&shared);
    }

    /// Submit a job. Fails with [`EngineError::AlreadyRunning`] unless
    /// the engine is idle or the previous job reached a terminal state.
    pub fn start(&self, job: Job) -> Result<JobHandle, EngineError> {
        // Swap in a fresh per-job block under the lock so the guard
        // and the handoff are one atomic step.
        let (previous, shared) = {
            let mut active = self.active.lock();
            let current = *active.state.lock();
            if !(current == ExecutionState::Idle || current.is_terminal()) {
                return Err(EngineError::AlreadyRunning(current));
            }
            let shared = Arc::new(Shared::for_job(&job));
            *active = Arc::clone(&shared);
            (current, shared)
        };

        shared.bus.publish(JobEvent::JobStateChanged {
            old: previous,
            new: ExecutionState::Planning,
            reason: None,
        });

        let setup = self.prepare(&job);
        let (workspace, logger) = match setup {
            Ok(pair) => pair,
            Err(e) => {
                // Setup failed before any task ran; the engine stays
                // reusable.
                shared.transition(ExecutionState::Failed, Some(e.to_string()));
                return Err(e);
            }
        };

        logger.phase(&format!(
            "Job {} ({} files x {} operations)",
            job.id,
            job.inputs.len(),
            job.operations.len()
        ));

        shared.transition(ExecutionState::Running, None);

        let queue: Arc<Mutex<VecDeque<PathBuf>>> =
            Arc::new(Mutex::new(job.inputs.iter().cloned().collect()));
        let operations = Arc::new(job.operations.clone());
        let pool_size = self.config.effective_pool_size(job.inputs.len());
        let timeout = self.config.task_timeout;

        tracing::info!(
            job_id = %job.id,
            pool_size,
            tasks = job.task_count(),
            "starting worker pool"
        );

        let worker_shared = Arc::clone(&shared);
        let runner = Arc::clone(&self.runner);
        let coordinator = std::thread::spawn(move || {
            let shared = worker_shared;
            let mut workers = Vec::with_capacity(pool_size);
            for _ in 0..pool_size {
                let shared = Arc::clone(&shared);
                let runner = Arc::clone(&runner);
                let queue = Arc::clone(&queue);
                let operations = Arc::clone(&operations);
                let workspace = Arc::clone(&workspace);
                let logger = Arc::clone(&logger);
                workers.push(std::thread::spawn(move || {
                    worker_loop(&shared, &*runner, &queue, &operations, &workspace, &logger, timeout);
                }));
            }
            for worker in workers {
                let _ = worker.join();
            }

            let failure = shared.failure.lock().clone();
            let (terminal, reason) = if shared.cancelled() {
                (ExecutionState::Cancelled, Some("stopped by user".to_string()))
            } else if let Some(reason) = failure {
                (ExecutionState::Failed, Some(reason))
            } else {
                (ExecutionState::Completed, None)
            };

            logger.phase(&format!("Job finished: {}", terminal.as_str()));
            logger.close();
            shared.transition(terminal, reason);
            terminal
        });

        Ok(JobHandle {
            job_id: job.id,
            shared,
            join: Mutex::new(Some(coordinator)),
        })
    }

    fn prepare(&self, job: &Job) -> Result<(Arc<WorkspaceResolver>, Arc<JobLogger>), EngineError> {
        let workspace = Arc::new(WorkspaceResolver::new(
            &job.output_dir,
            &self.config.work_root,
            &job.id,
        ));
        let logger = Arc::new(JobLogger::new(
            &job.id,
            &self.config.logs_dir,
            self.config.log_config.clone(),
            None,
        )?);
        Ok((workspace, logger))
    }
}

fn worker_loop(
    shared: &Shared,
    runner: &dyn TaskRunner,
    queue: &Mutex<VecDeque<PathBuf>>,
    operations: &[PlannedOperation],
    workspace: &WorkspaceResolver,
    logger: &JobLogger,
    timeout: Duration,
) {
    loop {
        let input = { queue.lock().pop_front() };
        let Some(input) = input else { break };

        if shared.cancelled() {
            skip_chain(shared, operations, &input, 0, "job stopped");
            continue;
        }
        run_chain(shared, runner, operations, workspace, logger, &input, timeout);
    }
}

/// Run one file's operation chain. Each step consumes the previous
/// step's output; a failure abandons the remainder of this chain only.
fn run_chain(
    shared: &Shared,
    runner: &dyn TaskRunner,
    operations: &[PlannedOperation],
    workspace: &WorkspaceResolver,
    logger: &JobLogger,
    input: &PathBuf,
    timeout: Duration,
) {
    let work_dir = match workspace.chain_work_dir(input) {
        Ok(dir) => dir,
        Err(e) => {
            logger.error(&format!("cannot create work dir for {}: {}", input.display(), e));
            shared.record_failure(e.to_string());
            skip_chain(shared, operations, input, 0, "workspace error");
            return;
        }
    };

    let bus = &shared.bus;
    let mut current = input.clone();

    for (index, op) in operations.iter().enumerate() {
        if shared.cancelled() {
            skip_chain(shared, operations, input, index, "job stopped");
            workspace.cleanup_chain(input);
            return;
        }

        shared.mark_running(input, &op.id);
        bus.publish(JobEvent::TaskStarted {
            file: input.clone(),
            operation: op.id.clone(),
        });
        logger.info(&format!(
            "{} :: {} (step {}/{})",
            input.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            op.id,
            index + 1,
            operations.len()
        ));

        let output = workspace.step_output(&work_dir, input, index);
        match runner.run(op, &current, &output, logger, timeout) {
            Ok(report) => {
                shared.mark_finished(input, &op.id, TaskStatus::Succeeded, None);
                bus.publish(JobEvent::TaskFinished {
                    file: input.clone(),
                    operation: op.id.clone(),
                    status: TaskStatus::Succeeded,
                    error: None,
                });
                let percent = shared.bump_progress();
                logger.progress(percent);
                current = report.output_path;
            }
            Err(e) => {
                logger.error(&format!("{} failed on {}: {}", op.id, input.display(), e));
                shared.mark_finished(input, &op.id, TaskStatus::Failed, Some(&e.to_string()));
                bus.publish(JobEvent::TaskFinished {
                    file: input.clone(),
                    operation: op.id.clone(),
                    status: TaskStatus::Failed,
                    error: Some(e.to_string()),
                });
                let percent = shared.bump_progress();
                logger.progress(percent);
                skip_chain(shared, operations, input, index + 1, "earlier step failed");
                workspace.cleanup_chain(input);
                return;
            }
        }
    }

    // The output name is claimed only after the whole chain succeeded,
    // so a failed file leaves nothing behind in the output directory.
    let published = workspace
        .claim_final_output(input)
        .and_then(|claimed| workspace.publish(&current, &claimed).map(|_| claimed));
    match published {
        Ok(claimed) => {
            logger.success(&format!(
                "{} -> {}",
                input.display(),
                claimed.display()
            ));
        }
        Err(e) => {
            logger.error(&format!("cannot publish output for {}: {}", input.display(), e));
            shared.record_failure(e.to_string());
        }
    }
    workspace.cleanup_chain(input);
}

/// Mark the remaining tasks of a chain as skipped so the progress
/// counter still reaches the total in every terminal state.
fn skip_chain(
    shared: &Shared,
    operations: &[PlannedOperation],
    input: &PathBuf,
    from: usize,
    reason: &str,
) {
    let bus = &shared.bus;
    for op in &operations[from..] {
        shared.mark_finished(input, &op.id, TaskStatus::Skipped, Some(reason));
        bus.publish(JobEvent::TaskFinished {
            file: input.clone(),
            operation: op.id.clone(),
            status: TaskStatus::Skipped,
            error: Some(reason.to_string()),
        });
        shared.bump_progress();
    }
}
