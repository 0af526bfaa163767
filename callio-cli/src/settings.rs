use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use callio_batch::JobConfig;
use callio_core::FileLog;

const APP_DIR: &str = "Callio";
const CONFIG_FILE: &str = "config.json";
const LOG_FILE: &str = "log.txt";

pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine the user data directory")?;
    Ok(base.join(APP_DIR).join(CONFIG_FILE))
}

/// The run log lives next to the configuration file.
pub fn log_path(config_path: &Path) -> PathBuf {
    config_path.with_file_name(LOG_FILE)
}

/// Opens the run log, creating its directory when needed.
pub fn open_log(config_path: &Path) -> FileLog {
    let path = log_path(config_path);
    if let Some(parent) = path.parent() {
        if let Err(error) = fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), error = %error, "cannot create log directory");
        }
    }
    FileLog::new(path)
}

/// Loads the configuration, falling back to defaults when none was saved yet.
pub fn load_config(path: &Path) -> Result<JobConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(JobConfig::default());
    }
    JobConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

pub fn save_config(path: &Path, config: &JobConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    config
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, JobConfig::default());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Callio").join("config.json");
        let config = JobConfig {
            max_workers: 7,
            ..JobConfig::default()
        };

        save_config(&path, &config).unwrap();

        assert_eq!(load_config(&path).unwrap().max_workers, 7);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(load_config(&path).is_err());
    }

    #[test]
    fn log_sits_next_to_config() {
        let path = PathBuf::from("/data/Callio/config.json");
        assert_eq!(log_path(&path), PathBuf::from("/data/Callio/log.txt"));
    }
}
