//! TOML persistence for the declaration model.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::RoleConfig;
use crate::validate::validate_config;

/// Loads and saves the declaration file. `save` is the write-back path the
/// reconciler uses right after publishing a message, so it goes through a
/// temp file + rename and never leaves a half-written config behind.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RoleConfig, ConfigError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        let config: RoleConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: self.path.display().to_string(),
            source,
        })?;
        validate_config(&config)?;
        Ok(config)
    }

    pub fn save(&self, config: &RoleConfig) -> Result<(), ConfigError> {
        let rendered = toml::to_string_pretty(config)?;
        write_replacing(&self.path, &rendered).map_err(|source| ConfigError::Write {
            path: self.path.display().to_string(),
            source,
        })
    }
}

fn write_replacing(path: &Path, content: &str) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("rolecall.toml");
    let temp_path = parent.join(format!(".{file_name}.{}.swap", std::process::id()));
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)
}

/// Reads the bytes of a local asset referenced from a thumbnail or icon
/// field. Asset names must be bare file names; anything that looks like a
/// path is rejected rather than resolved.
pub fn load_asset(assets_dir: &Path, name: &str) -> Result<Vec<u8>, ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.starts_with('.')
    {
        return Err(ConfigError::UnsafeAssetName {
            name: name.to_string(),
        });
    }
    std::fs::read(assets_dir.join(trimmed)).map_err(|source| ConfigError::Asset {
        name: trimmed.to_string(),
        source,
    })
}
