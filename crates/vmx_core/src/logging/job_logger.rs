//! Per-job logger with file and callback output.
//!
//! Each running job gets its own log file. Lines also go to an
//! optional callback (terminal or UI sink). Compact mode suppresses
//! raw tool output but keeps a bounded tail buffer so the last lines
//! of stderr can be shown when an invocation fails.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-job logger with dual output (file + callback).
pub struct JobLogger {
    job_id: String,
    log_path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    callback: Mutex<Option<LogCallback>>,
    config: LogConfig,
    /// Recent external-tool output lines, for error diagnosis.
    tail: Mutex<VecDeque<String>>,
    /// Last progress percent that was emitted.
    last_progress: Mutex<u32>,
}

impl JobLogger {
    /// Open a logger writing to `<log_dir>/job_<id>.log`.
    pub fn new(
        job_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let job_id = job_id.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        let log_path = log_dir.join(format!("job_{}.log", job_id));
        let writer = BufWriter::new(File::create(&log_path)?);

        Ok(Self {
            job_id,
            log_path,
            writer: Mutex::new(Some(writer)),
            callback: Mutex::new(callback),
            config,
            tail: Mutex::new(VecDeque::with_capacity(64)),
            last_progress: Mutex::new(0),
        })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        self.emit(&self.stamp(message));
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log an external command about to run.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    /// Log a phase marker.
    pub fn phase(&self, name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Phase.format(name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Log a job-level progress update.
    ///
    /// In compact mode only step-interval changes are emitted; returns
    /// whether the line was written.
    pub fn progress(&self, percent: u32) -> bool {
        if self.config.compact {
            let mut last = self.last_progress.lock();
            let step = self.config.progress_step.max(1);
            if (percent / step) * step <= (*last / step) * step && percent < 100 {
                return false;
            }
            *last = percent;
        }
        self.log(LogLevel::Info, &format!("Progress: {}%", percent));
        true
    }

    /// Record a line of external-tool output.
    ///
    /// Always lands in the tail buffer; only written out verbatim when
    /// compact mode is off.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        {
            let mut tail = self.tail.lock();
            if tail.len() >= self.config.error_tail {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }

        if self.config.compact {
            return;
        }
        let prefix = if is_stderr { "[stderr] " } else { "" };
        self.emit(&self.stamp(&format!("{}{}", prefix, line)));
    }

    /// Write out the tail buffer, typically after a failed invocation.
    pub fn show_tail(&self, header: &str) {
        let tail = self.tail.lock();
        if tail.is_empty() {
            return;
        }
        self.emit(&self.stamp(&format!("[{}/tail]", header)));
        for line in tail.iter() {
            self.emit(&self.stamp(line));
        }
    }

    pub fn clear_tail(&self) {
        self.tail.lock().clear();
    }

    /// Current tail buffer contents.
    pub fn tail_lines(&self) -> Vec<String> {
        self.tail.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Flush and release the file handle.
    pub fn close(&self) {
        self.flush();
        *self.writer.lock() = None;
    }

    fn stamp(&self, message: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%H:%M:%S"), message)
        } else {
            message.to_string()
        }
    }

    fn emit(&self, line: &str) {
        if let Some(ref mut writer) = *self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
        }
        if let Some(ref callback) = *self.callback.lock() {
            callback(line);
        }
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn creates_log_file_named_after_job() {
        let dir = tempdir().unwrap();
        let logger = JobLogger::new("abc123", dir.path(), LogConfig::default(), None).unwrap();
        assert!(logger.log_path().exists());
        assert!(logger.log_path().to_string_lossy().contains("job_abc123.log"));
    }

    #[test]
    fn writes_to_file() {
        let dir = tempdir().unwrap();
        let logger = JobLogger::new("j", dir.path(), LogConfig::default(), None).unwrap();
        logger.info("hello");
        logger.flush();
        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("hello"));
    }

    #[test]
    fn callback_receives_lines() {
        let dir = tempdir().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let callback: LogCallback = Box::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        let logger =
            JobLogger::new("j", dir.path(), LogConfig::default(), Some(callback)).unwrap();
        logger.info("one");
        logger.warn("two");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compact_mode_gates_progress() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            compact: true,
            progress_step: 20,
            ..LogConfig::default()
        };
        let logger = JobLogger::new("j", dir.path(), config, None).unwrap();

        assert!(!logger.progress(5));
        assert!(!logger.progress(15));
        assert!(logger.progress(20));
        assert!(!logger.progress(25));
        assert!(logger.progress(40));
        assert!(logger.progress(100));
    }

    #[test]
    fn tail_buffer_is_bounded() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            compact: true,
            error_tail: 5,
            ..LogConfig::default()
        };
        let logger = JobLogger::new("j", dir.path(), config, None).unwrap();
        for i in 0..10 {
            logger.output_line(&format!("line {}", i), true);
        }
        let tail = logger.tail_lines();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0], "line 5");
        assert_eq!(tail[4], "line 9");
    }
}
