use crate::state::ServerSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: String,
    pub interval_secs: u64,
    pub ssh_key_path: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    pub servers: Vec<ServerSpec>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("configuration validation error: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "the listen field is required".to_string(),
            ));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "listen must be a valid host:port address".to_string(),
            ));
        }
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs must be >= 1".to_string(),
            ));
        }
        if self.ssh_key_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "ssh_key_path must not be empty".to_string(),
            ));
        }
        if self.connect_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "connect_timeout_secs must be >= 1".to_string(),
            ));
        }
        if self.command_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "command_timeout_secs must be >= 1".to_string(),
            ));
        }

        validate_servers(&self.servers)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_servers(servers: &[ServerSpec]) -> Result<(), ConfigError> {
    if servers.is_empty() {
        return Err(ConfigError::Validation(
            "servers must be a non-empty list".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for server in servers {
        if server.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "servers[*].name must not be empty".to_string(),
            ));
        }
        // Names key the published snapshot, so they must be unique.
        if !names.insert(server.name.clone()) {
            return Err(ConfigError::Validation(format!(
                "server name '{}' must be unique",
                server.name
            )));
        }
        if server.host.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "server '{}' host must not be empty",
                server.name
            )));
        }
        if server.user.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "server '{}' user must not be empty",
                server.name
            )));
        }
    }
    Ok(())
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

const fn default_command_timeout_secs() -> u64 {
    10
}
