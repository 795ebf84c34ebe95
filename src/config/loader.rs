use std::path::{Path, PathBuf};

use tracing::debug;

use crate::args::defaults::DEFAULT_CONFIG_FILES;
use crate::error::{AppError, AppResult, ConfigFileError};

use super::types::ConfigFile;

/// Loads a configuration file from the provided path or default locations.
///
/// # Errors
///
/// Returns an error when the config file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> AppResult<Option<ConfigFile>> {
    if let Some(path) = path {
        return Ok(Some(load_config_file(path)?));
    }

    for candidate in DEFAULT_CONFIG_FILES {
        let candidate = PathBuf::from(candidate);
        if candidate.exists() {
            return Ok(Some(load_config_file(&candidate)?));
        }
    }

    Ok(None)
}

pub(crate) fn load_config_file(path: &Path) -> AppResult<ConfigFile> {
    debug!("Loading config from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|err| {
        AppError::config_file(ConfigFileError::ReadConfig {
            path: path.to_path_buf(),
            source: err,
        })
    })?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content).map_err(|err| {
            AppError::config_file(ConfigFileError::ParseToml {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some("json") => serde_json::from_str(&content).map_err(|err| {
            AppError::config_file(ConfigFileError::ParseJson {
                path: path.to_path_buf(),
                source: err,
            })
        }),
        Some(ext) => Err(AppError::config_file(
            ConfigFileError::UnsupportedExtension {
                ext: ext.to_owned(),
            },
        )),
        None => Err(AppError::config_file(ConfigFileError::MissingExtension)),
    }
}
