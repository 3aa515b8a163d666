//! Configuration loading for sqlscribe.
//!
//! Settings come from three layers, lowest precedence first: an optional
//! TOML config file (`~/.config/sqlscribe/config.toml` or `--config`),
//! environment variables, and CLI flags. The environment and flag layers
//! arrive here already merged as [`Overrides`] (clap binds each flag to
//! its environment variable).

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ScribeError, ScribeResult};
use crate::prompt::REPORT_TABLES;

/// Default model for SQL generation.
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// Default chat-completions endpoint base.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_DB_PORT: u16 = 3306;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// SSH jump-host settings for the tunnel.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub private_key_path: PathBuf,
}

/// Database endpoint as seen from the jump host, plus credentials.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

/// Model API settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub tunnel: TunnelConfig,
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    /// Introspection allow-list, in prompt order.
    pub tables: Vec<String>,
}

/// Values collected from CLI flags and environment variables.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub ssh_host: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_username: Option<String>,
    pub ssh_key_path: Option<PathBuf>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_username: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub tables: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    tunnel: FileTunnel,
    #[serde(default)]
    database: FileDatabase,
    #[serde(default)]
    model: FileModel,
    tables: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct FileTunnel {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    private_key_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileDatabase {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileModel {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Resolve the configuration from the file layer and the given
    /// overrides. Fields without a value in any layer fall back to
    /// defaults; fields with no sensible default are errors.
    pub fn load(config_path: Option<&Path>, overrides: Overrides) -> ScribeResult<Self> {
        let file = match config_path {
            Some(path) => read_file_config(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_file_config(&path)?,
                _ => FileConfig::default(),
            },
        };
        Self::merge(file, overrides)
    }

    fn merge(file: FileConfig, overrides: Overrides) -> ScribeResult<Self> {
        let tunnel = TunnelConfig {
            host: overrides
                .ssh_host
                .or(file.tunnel.host)
                .ok_or_else(|| missing("ssh host", "SQLSCRIBE_SSH_HOST"))?,
            port: overrides
                .ssh_port
                .or(file.tunnel.port)
                .unwrap_or(DEFAULT_SSH_PORT),
            username: overrides
                .ssh_username
                .or(file.tunnel.username)
                .ok_or_else(|| missing("ssh username", "SQLSCRIBE_SSH_USERNAME"))?,
            private_key_path: overrides
                .ssh_key_path
                .or(file.tunnel.private_key_path)
                .ok_or_else(|| missing("ssh private key path", "SQLSCRIBE_SSH_KEY_PATH"))?,
        };

        let db_username = overrides
            .db_username
            .or(file.database.username)
            .ok_or_else(|| missing("database username", "SQLSCRIBE_DB_USERNAME"))?;
        let database = DatabaseConfig {
            host: overrides
                .db_host
                .or(file.database.host)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: overrides
                .db_port
                .or(file.database.port)
                .unwrap_or(DEFAULT_DB_PORT),
            password: overrides
                .db_password
                .or(file.database.password)
                .unwrap_or_default(),
            database: overrides
                .db_name
                .or(file.database.database)
                .unwrap_or_else(|| db_username.clone()),
            username: db_username,
        };

        let model = ModelConfig {
            api_key: overrides
                .api_key
                .or(file.model.api_key)
                .unwrap_or_default(),
            model: overrides
                .model
                .or(file.model.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: overrides
                .base_url
                .or(file.model.base_url)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_secs: overrides
                .timeout_secs
                .or(file.model.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        let tables = overrides
            .tables
            .or(file.tables)
            .unwrap_or_else(default_tables);
        if tables.is_empty() {
            return Err(ScribeError::config("table allow-list is empty"));
        }

        Ok(Self {
            tunnel,
            database,
            model,
            tables,
        })
    }
}

fn missing(what: &str, env: &str) -> ScribeError {
    ScribeError::config(format!("{what} is not configured (set {env})"))
}

fn default_tables() -> Vec<String> {
    REPORT_TABLES.iter().map(|t| t.to_string()).collect()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sqlscribe").join("config.toml"))
}

fn read_file_config(path: &Path) -> ScribeResult<FileConfig> {
    let text = fs::read_to_string(path)
        .map_err(|e| ScribeError::config(format!("read {}: {}", path.display(), e)))?;
    toml::from_str(&text)
        .map_err(|e| ScribeError::config(format!("parse {}: {}", path.display(), e)))
}
