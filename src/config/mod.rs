use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const APP_DIR: &str = "pr-dash";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine the configuration directory")]
    NoConfigDir,
}

/// Top-level configuration loaded from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Minutes between automatic refreshes.
    #[serde(default = "default_interval")]
    pub update_interval_minutes: u64,

    pub bitbucket: BitbucketConfig,

    /// Local clones, keyed by "owner/repo".
    #[serde(default)]
    pub local_repository_paths: HashMap<String, PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BitbucketConfig {
    pub username: String,
    /// App password with account and pull request read access.
    pub password: String,
    #[serde(default)]
    pub repositories: Vec<String>,
}

fn default_interval() -> u64 {
    5
}

/// One week.
const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

const SAMPLE_CONFIG: &str = r#"# How often should the list of pull requests be updated?
update_interval_minutes = 5

[bitbucket]
# Your Bitbucket username.
# If you log in through an identity provider you can look it up at
# https://bitbucket.org/account/settings/username/change
username = ""

# An app password with permissions to read your account and pull requests.
# Create one at https://bitbucket.org/account/settings/app-passwords/new
password = ""

# Which repositories do you want to monitor?
repositories = [
    # "owner/reponame",
]

# Where are your local copies of these repositories?
# Optional, but needed to check out and update branches from the dashboard.
[local_repository_paths]
# "owner/reponame" = "/home/you/code/reponame"
"#;

impl Config {
    /// Default location: `<config dir>/pr-dash/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(app_dir()?.join("config.toml"))
    }

    /// Load and validate the config at `path`.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write a commented sample config, creating parent directories.
    pub fn write_sample(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, SAMPLE_CONFIG)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes.min(MAX_INTERVAL_MINUTES) * 60)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.update_interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::Invalid(format!(
                "update_interval_minutes must be at most {}",
                MAX_INTERVAL_MINUTES
            )));
        }
        if self.bitbucket.username.trim().is_empty() || self.bitbucket.password.is_empty() {
            return Err(ConfigError::Invalid(
                "bitbucket.username and bitbucket.password are required".to_string(),
            ));
        }
        if self.bitbucket.repositories.is_empty() {
            return Err(ConfigError::Invalid(
                "bitbucket.repositories must list at least one repository".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<config dir>/pr-dash`
pub fn app_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or(ConfigError::NoConfigDir)
}
