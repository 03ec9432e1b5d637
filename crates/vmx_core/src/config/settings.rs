//! Application settings model.
//!
//! Sectioned TOML settings. Every field carries a serde default so
//! partial config files load cleanly and new fields appear on the next
//! save.

use serde::{Deserialize, Serialize};

/// Top-level settings, one struct per TOML section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub execution: ExecutionSettings,
    #[serde(default)]
    pub materials: MaterialSettings,
}

/// `[paths]` — output and working directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Destination for final outputs.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,
    /// Root for per-job intermediate work directories.
    #[serde(default = "default_work_root")]
    pub work_root: String,
    /// Per-job log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_output_folder() -> String {
    "output".to_string()
}

fn default_work_root() -> String {
    "work".to_string()
}

fn default_logs_folder() -> String {
    "logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            work_root: default_work_root(),
            logs_folder: default_logs_folder(),
        }
    }
}

/// `[logging]` — per-job log behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Compact mode: suppress raw tool output, step-gate progress.
    #[serde(default = "default_true")]
    pub compact: bool,
    /// Stderr lines kept for error diagnosis.
    #[serde(default = "default_error_tail")]
    pub error_tail: usize,
    /// Progress step percentage in compact mode.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,
    /// Prepend timestamps to log lines.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> usize {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            compact: true,
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
            show_timestamps: true,
        }
    }
}

/// `[execution]` — worker pool and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Worker pool size; 0 selects the machine's available parallelism.
    #[serde(default)]
    pub pool_size: usize,
    /// Per-invocation timeout in seconds.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Grace period before escalating a stop to a hard kill. Unset
    /// means cooperative stop only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_kill_grace_secs: Option<u64>,
}

fn default_task_timeout_secs() -> u64 {
    1800
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            pool_size: 0,
            task_timeout_secs: default_task_timeout_secs(),
            hard_kill_grace_secs: None,
        }
    }
}

/// `[materials]` — asset paths for overlay operations.
///
/// Unset paths make the corresponding operation fall back to a plain
/// remux instead of failing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light_effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goods: Option<String>,
}

/// Identifies one TOML section for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Execution,
    Materials,
}

impl ConfigSection {
    /// TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Execution => "execution",
            ConfigSection::Materials => "materials",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.execution.task_timeout_secs, 1800);
        assert_eq!(parsed.logging.progress_step, 20);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let parsed: Settings =
            toml::from_str("[execution]\npool_size = 4\n").unwrap();
        assert_eq!(parsed.execution.pool_size, 4);
        assert_eq!(parsed.execution.task_timeout_secs, 1800);
        assert_eq!(parsed.paths.output_folder, "output");
        assert!(parsed.materials.watermark.is_none());
    }
}
