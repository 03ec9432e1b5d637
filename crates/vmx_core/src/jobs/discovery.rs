//! Input discovery.
//!
//! Scans a directory for video files with supported container
//! extensions so callers can pass a folder instead of explicit files.

use std::path::{Path, PathBuf};

use super::planner::is_supported;

/// Collect supported video files directly under `dir`, sorted by
/// filename. Subdirectories are not descended into.
pub fn scan_directory(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_supported(&path) {
            found.push(path);
        }
    }
    found.sort();

    tracing::debug!(dir = %dir.display(), count = found.len(), "scanned input directory");
    Ok(found)
}

/// Expand a mixed list of files and directories into a flat input list.
///
/// Files are kept as-is (the planner validates them); directories are
/// scanned non-recursively.
pub fn expand_inputs(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            inputs.extend(scan_directory(path)?);
        } else {
            inputs.push(path.clone());
        }
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn scan_picks_only_supported_files() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("b.mp4")).unwrap();
        File::create(dir.path().join("a.MKV")).unwrap();
        File::create(dir.path().join("readme.txt")).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("nested/c.mp4")).unwrap();

        let found = scan_directory(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.MKV", "b.mp4"]);
    }

    #[test]
    fn expand_mixes_files_and_directories() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("a.mp4")).unwrap();
        let standalone = dir.path().join("solo.mov");
        File::create(&standalone).unwrap();

        let sub = dir.path().join("batch");
        std::fs::create_dir(&sub).unwrap();
        File::create(sub.join("b.webm")).unwrap();

        let inputs = expand_inputs(&[standalone.clone(), sub]).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0], standalone);
    }
}
