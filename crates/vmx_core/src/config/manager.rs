//! Config manager for loading, saving, and atomic updates.
//!
//! Writes go to a temp file first and are renamed into place, so a
//! crash mid-save never leaves a truncated config. Section-level
//! updates re-read the file and replace only the target table,
//! preserving comments elsewhere via toml_edit.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Errors raised by config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to parse config for editing: {0}")]
    EditParse(#[from] toml_edit::TomlError),

    #[error("config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the application settings file.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for the given path. Call `load()` or
    /// `load_or_create()` before using the settings.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// In-memory mutation; persist with `save()` or `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load the config file, failing if it does not exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }
        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        Ok(())
    }

    /// Load the config file, writing defaults if it does not exist.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            self.settings = toml::from_str(&content)?;
        } else {
            if let Some(parent) = self.config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Create the configured output, work and log directories.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        for dir in [
            &self.settings.paths.output_folder,
            &self.settings.paths.work_root,
            &self.settings.paths.logs_folder,
        ] {
            let path = PathBuf::from(dir);
            if !path.exists() {
                fs::create_dir_all(&path)?;
            }
        }
        Ok(())
    }

    pub fn logs_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.logs_folder)
    }

    pub fn output_folder(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.output_folder)
    }

    pub fn work_root(&self) -> PathBuf {
        PathBuf::from(&self.settings.paths.work_root)
    }

    /// Save the full settings atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.render()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Rewrite a single section, leaving the rest of the file intact.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current.is_empty() {
            DocumentMut::new()
        } else {
            current.parse()?
        };

        let section_toml = match section {
            ConfigSection::Paths => toml::to_string_pretty(&self.settings.paths)?,
            ConfigSection::Logging => toml::to_string_pretty(&self.settings.logging)?,
            ConfigSection::Execution => toml::to_string_pretty(&self.settings.execution)?,
            ConfigSection::Materials => toml::to_string_pretty(&self.settings.materials)?,
        };
        let section_doc: DocumentMut = section_toml.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    fn render(&self) -> ConfigResult<String> {
        let mut out = String::new();
        out.push_str("# Video Matrix configuration\n\n");

        out.push_str("# Output and working directories\n[paths]\n");
        out.push_str(&toml::to_string_pretty(&self.settings.paths)?);
        out.push('\n');

        out.push_str("# Per-job logging\n[logging]\n");
        out.push_str(&toml::to_string_pretty(&self.settings.logging)?);
        out.push('\n');

        out.push_str("# Worker pool and timeouts\n[execution]\n");
        out.push_str(&toml::to_string_pretty(&self.settings.execution)?);
        out.push('\n');

        out.push_str("# Asset paths for overlay operations\n[materials]\n");
        out.push_str(&toml::to_string_pretty(&self.settings.materials)?);

        Ok(out)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("settings.toml");

        let mut manager = ConfigManager::new(&path);
        manager.load_or_create().unwrap();

        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[paths]"));
        assert!(content.contains("[execution]"));
    }

    #[test]
    fn load_or_create_keeps_existing_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "[execution]\npool_size = 3\n").unwrap();

        let mut manager = ConfigManager::new(&path);
        manager.load_or_create().unwrap();
        assert_eq!(manager.settings().execution.pool_size, 3);
    }

    #[test]
    fn update_section_leaves_other_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&path);
        manager.load_or_create().unwrap();

        manager.settings_mut().logging.compact = false;
        manager.update_section(ConfigSection::Logging).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("compact = false"));
        assert!(content.contains("[paths]"));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&path);
        manager.load_or_create().unwrap();

        assert!(!path.with_extension("toml.tmp").exists());
    }
}
