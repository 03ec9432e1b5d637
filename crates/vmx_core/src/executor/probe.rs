//! Media probing via ffprobe.

use std::path::Path;
use std::process::Command;

use super::TaskError;

/// Query a file's container duration in seconds.
pub fn duration_secs(ffprobe: &str, input: &Path) -> Result<f64, TaskError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .map_err(TaskError::Io)?;

    if !output.status.success() {
        return Err(TaskError::Probe(format!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let value = text.trim();
    value.parse::<f64>().map_err(|_| {
        TaskError::Probe(format!("unparseable duration '{}' for {}", value, input.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_binary_reports_io_error() {
        let err = duration_secs("/no/such/ffprobe", &PathBuf::from("/a.mp4")).unwrap_err();
        assert!(matches!(err, TaskError::Io(_)));
    }
}
