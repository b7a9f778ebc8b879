//! Subcommands.

pub mod batch;
pub mod codes;
pub mod config;
pub mod process;

use std::path::{Path, PathBuf};

use danfe_core::DanfeConfig;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("danfe")
        .join("config.json")
}

/// Explicit `--config` file, else the default file if present, else defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<DanfeConfig> {
    if let Some(path) = config_path {
        return Ok(DanfeConfig::from_file(Path::new(path))?);
    }

    let default_path = default_config_path();
    if default_path.exists() {
        Ok(DanfeConfig::from_file(&default_path)?)
    } else {
        Ok(DanfeConfig::default())
    }
}
