use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::Config;
use super::env::{ENV_CONFIG, apply_env_overrides};

/// `$LIFESTREAM_CONFIG`, else `<config dir>/lifestream/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(ENV_CONFIG)
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("lifestream")
        .join("config.toml")
}

/// Parse the file at `path`, or `None` if it does not exist.
pub fn read_config(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found");
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(
        path = %path.display(),
        algorithm = %config.engine.algorithm,
        rule = %config.engine.rule,
        "loaded config"
    );
    Ok(Some(config))
}

pub fn load() -> Result<Config, ConfigError> {
    load_from(&config_path())
}

/// File (or defaults), then environment overrides, then validation.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let mut config = read_config(path)?.unwrap_or_default();
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Like [`load`], but falls back to defaults on any error and writes a default
/// file when none exists yet.
pub fn load_or_init() -> Config {
    let path = config_path();
    let had_config = path.exists();

    let config = match load_from(&path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("config load failed, using defaults: {err}");
            Config::default()
        }
    };

    if !had_config && let Err(err) = write_config(&path, &Config::default()) {
        tracing::warn!("failed to write default config: {err}");
    }

    config
}

pub fn write_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let contents = toml::to_string_pretty(config)?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    fs::write(temp.path(), data).map_err(write_err)?;
    temp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}
