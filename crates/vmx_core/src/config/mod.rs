//! Settings file handling.

pub mod manager;
pub mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, ExecutionSettings, LoggingSettings, MaterialSettings, PathSettings, Settings,
};
