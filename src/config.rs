use anyhow::{Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;
use std::{fmt, fs, path::PathBuf, time::Duration};

use crate::serde_utils;

pub const ENV_PREFIX: &str = "FILE_TRANSFER_";
pub const DEFAULT_USER_AGENT: &str = concat!("file-transfer/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default, deserialize_with = "serde_utils::deserialize_duration")]
    pub timeout: Option<Duration>,
    #[serde(default, deserialize_with = "serde_utils::deserialize_duration")]
    pub connect_timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

/// Read from `FILE_TRANSFER_*` variables, e.g. `FILE_TRANSFER_TIMEOUT=30s`.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigEnv {
    #[serde(default, deserialize_with = "serde_utils::deserialize_duration")]
    pub timeout: Option<Duration>,
    #[serde(default, deserialize_with = "serde_utils::deserialize_duration")]
    pub connect_timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

/// Transport settings for [`crate::UploadClient::from_config`].
///
/// No timeout is applied unless one is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |duration: Option<Duration>| {
            duration
                .map(|d| humantime::format_duration(d).to_string())
                .unwrap_or_else(|| "none".to_string())
        };
        writeln!(f, "timeout: {}", show(self.timeout))?;
        writeln!(f, "connect_timeout: {}", show(self.connect_timeout))?;
        write!(f, "user_agent: {}", self.user_agent)
    }
}

pub fn merge_config(base: ConfigFile, override_config: ConfigEnv) -> Config {
    Config {
        timeout: override_config.timeout.or(base.timeout),
        connect_timeout: override_config.connect_timeout.or(base.connect_timeout),
        user_agent: override_config
            .user_agent
            .or(base.user_agent)
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
    }
}

pub fn config_file_path() -> Result<PathBuf> {
    let project_dirs = directories::ProjectDirs::from("com", "file-transfer", "file-transfer")
        .ok_or(anyhow!("Unable to determine home directory"))?;
    Ok(project_dirs.config_dir().join("config.toml"))
}

pub fn read_config() -> Result<Config> {
    let _ = dotenv();
    let env_config = envy::prefixed(ENV_PREFIX).from_env::<ConfigEnv>()?;

    let file_config = if let Ok(config) = fs::read_to_string(config_file_path()?) {
        toml::from_str(&config)?
    } else {
        ConfigFile::default()
    };

    Ok(merge_config(file_config, env_config))
}
