use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::downloader::FetcherConfig;

const CONFIG_ENV: &str = "PAGEFETCH_CONFIG_DIR";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory")]
    MissingDirectory,
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("{0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Settings persisted between runs of the command-line tool.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
}

impl Settings {
    /// A zero timeout is treated as unset.
    pub fn fetcher_config(&self) -> FetcherConfig {
        let config = FetcherConfig::new();
        match self.read_timeout_secs.filter(|&secs| secs > 0) {
            Some(secs) => config.with_read_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigManager {
    base_dir: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let dir = determine_base_dir()?;
        Ok(Self { base_dir: dir })
    }

    pub fn with_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.base_dir)?;
        let contents = toml::to_string(settings)?;
        fs::write(self.config_file(), contents)?;
        Ok(())
    }

    /// Load the stored settings; a missing file yields the defaults.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let contents = match fs::read_to_string(self.config_file()) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Settings::default())
            }
            Err(err) => return Err(err.into()),
        };
        Ok(toml::from_str(&contents)?)
    }

    pub fn save_cookies(&self, cookies: Option<&str>) -> Result<(), ConfigError> {
        let mut settings = self.load()?;
        settings.cookies = cookies.map(str::to_string);
        self.save(&settings)
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE)
    }
}

fn determine_base_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    let dirs = ProjectDirs::from("dev", "pagefetch", "pagefetch")
        .ok_or(ConfigError::MissingDirectory)?;
    Ok(dirs.config_dir().to_path_buf())
}
