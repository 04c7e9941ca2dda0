// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Configuration file handling.
//!
//! `moneysync.toml` lives in the platform config dir unless `--config`
//! points elsewhere. A missing file means defaults: local-only storage in
//! the platform data dir.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const PASSWORD_ENV: &str = "MONEYSYNC_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    #[default]
    None,
    Rest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub kind: RemoteKind,
    /// Realtime database root, e.g. `https://<project>.firebaseio.com`.
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_auth_url() -> String {
    "https://identitytoolkit.googleapis.com".to_string()
}

fn default_poll_interval() -> u64 {
    15
}

fn default_timeout() -> u64 {
    15
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            kind: RemoteKind::None,
            database_url: String::new(),
            auth_url: default_auth_url(),
            api_key: String::new(),
            email: String::new(),
            password: String::new(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location when `None`. A missing file
    /// yields defaults; a present but invalid file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Read config at {}", path.display()))?;
            Self::parse(&content).with_context(|| format!("Parse config at {}", path.display()))?
        } else {
            Self::default()
        };
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.remote.password = password;
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::db::project_dirs()?
            .config_dir()
            .join("moneysync.toml"))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if self.storage.data_dir.is_empty() {
            crate::db::default_data_dir()
        } else {
            Ok(PathBuf::from(&self.storage.data_dir))
        }
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote.kind != RemoteKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_local_only_defaults() {
        let config = Config::parse("").unwrap();
        assert!(!config.remote_enabled());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.remote.poll_interval_secs, 15);
        assert!(config.storage.data_dir.is_empty());
    }

    #[test]
    fn parses_rest_remote_section() {
        let config = Config::parse(
            r#"
            [storage]
            data_dir = "/tmp/moneysync"

            [remote]
            kind = "rest"
            database_url = "https://demo.firebaseio.com"
            api_key = "k"
            email = "me@example.com"
            poll_interval_secs = 5
            "#,
        )
        .unwrap();
        assert!(config.remote_enabled());
        assert_eq!(config.remote.kind, RemoteKind::Rest);
        assert_eq!(config.remote.auth_url, "https://identitytoolkit.googleapis.com");
        assert_eq!(config.remote.poll_interval_secs, 5);
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/moneysync"));
    }

    #[test]
    fn rejects_unknown_remote_kind() {
        assert!(Config::parse("[remote]\nkind = \"ftp\"\n").is_err());
    }
}
