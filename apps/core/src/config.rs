use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::IconSize;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "menuicon";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub icon_size: IconSize,
    pub placeholder_alpha: u8,
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            icon_size: IconSize::Small,
            placeholder_alpha: 128,
            config_path: stable_app_data_dir().join(CONFIG_FILE_NAME),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
    Serialize(String),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(error) => write!(f, "io error: {error}"),
            Self::Parse(error) => write!(f, "parse error: {error}"),
            Self::Serialize(error) => write!(f, "serialize error: {error}"),
            Self::Invalid(error) => write!(f, "invalid config: {error}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    icon_size: IconSize,
    placeholder_alpha: u8,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let defaults = Config::default();
        Self {
            icon_size: defaults.icon_size,
            placeholder_alpha: defaults.placeholder_alpha,
        }
    }
}

pub fn stable_app_data_dir() -> PathBuf {
    let base = std::env::var_os("LOCALAPPDATA")
        .or_else(|| std::env::var_os("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("share")))
        .unwrap_or_else(std::env::temp_dir);
    base.join(APP_DIR_NAME)
}

/// Loads the config at `path`, or at the default location. A missing file
/// yields defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Config::default().config_path);

    let file = match std::fs::read_to_string(&config_path) {
        Ok(raw) => toml::from_str::<ConfigFile>(&raw)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", config_path.display())))?,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => ConfigFile::default(),
        Err(error) => return Err(ConfigError::Io(error)),
    };

    let config = Config {
        icon_size: file.icon_size,
        placeholder_alpha: file.placeholder_alpha,
        config_path,
    };
    validate(&config).map_err(ConfigError::Invalid)?;
    Ok(config)
}

pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    validate(cfg).map_err(ConfigError::Invalid)?;
    let file = ConfigFile {
        icon_size: cfg.icon_size,
        placeholder_alpha: cfg.placeholder_alpha,
    };
    let encoded = toml::to_string_pretty(&file).map_err(|e| ConfigError::Serialize(e.to_string()))?;

    if let Some(parent) = cfg.config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&cfg.config_path, encoded)?;
    Ok(())
}

pub fn validate(cfg: &Config) -> Result<(), String> {
    if cfg.placeholder_alpha == 0 || cfg.placeholder_alpha == u8::MAX {
        return Err("placeholder_alpha must be between 1 and 254".into());
    }

    if cfg.config_path.as_os_str().is_empty() {
        return Err("config_path is required".into());
    }

    Ok(())
}
