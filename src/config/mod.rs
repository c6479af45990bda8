//! Configuration management
//!
//! Two layers live here:
//! - `ClientConfig`: the JSON object handed to client constructors. Keys follow
//!   the usual Mongo client names (`connection_string`, `db_name`,
//!   `maxPoolSize`, ...) and every key is optional.
//! - `Config`: the TOML file read by the `mongoclient` binary, holding a
//!   `[client]` table and a `[logging]` table.
//!
//! Configuration precedence for the binary (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use mongodb::options::{ClientOptions, Credential};
use tracing::debug;

use crate::codec::JsonObject;
use crate::error::{ConfigError, ConnectionError, Result};
use crate::options::WriteOption;

/// Database used when neither the config nor the URI names one.
pub const DEFAULT_DB_NAME: &str = "DEFAULT_DB";

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "MONGOCLIENT_";

/// Client creation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Full connection URI; takes precedence over `host`/`port`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Server host when no connection string is given
    pub host: String,

    /// Server port when no connection string is given
    pub port: u16,

    /// Database all operations run against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,

    /// Return and generate ObjectIds instead of hex strings
    #[serde(rename = "useObjectId")]
    pub use_object_id: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(rename = "authSource", skip_serializing_if = "Option::is_none")]
    pub auth_source: Option<String>,

    #[serde(rename = "maxPoolSize", skip_serializing_if = "Option::is_none")]
    pub max_pool_size: Option<u32>,

    #[serde(rename = "minPoolSize", skip_serializing_if = "Option::is_none")]
    pub min_pool_size: Option<u32>,

    #[serde(rename = "maxIdleTimeMS", skip_serializing_if = "Option::is_none")]
    pub max_idle_time_ms: Option<u64>,

    #[serde(rename = "connectTimeoutMS", skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    #[serde(rename = "serverSelectionTimeoutMS", skip_serializing_if = "Option::is_none")]
    pub server_selection_timeout_ms: Option<u64>,

    #[serde(rename = "replicaSet", skip_serializing_if = "Option::is_none")]
    pub replica_set: Option<String>,

    #[serde(rename = "appName", skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    /// Default write concern by `WriteOption` name
    #[serde(rename = "writeConcern", skip_serializing_if = "Option::is_none")]
    pub write_concern: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    27017
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            host: default_host(),
            port: default_port(),
            db_name: None,
            use_object_id: false,
            username: None,
            password: None,
            auth_source: None,
            max_pool_size: None,
            min_pool_size: None,
            max_idle_time_ms: None,
            connect_timeout_ms: None,
            server_selection_timeout_ms: None,
            replica_set: None,
            app_name: None,
            write_concern: None,
        }
    }
}

impl ClientConfig {
    /// Read a configuration from the JSON object passed at client creation.
    pub fn from_json(json: &JsonObject) -> Result<Self> {
        let config: ClientConfig = serde_json::from_value(Value::Object(json.clone()))
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The URI handed to the driver.
    pub fn connection_uri(&self) -> String {
        match &self.connection_string {
            Some(uri) => uri.clone(),
            None => format!("mongodb://{}:{}", self.host, self.port),
        }
    }

    /// Default write option, if one is configured.
    pub fn default_write_option(&self) -> Result<Option<WriteOption>> {
        match &self.write_concern {
            Some(name) => WriteOption::from_str(name)
                .map(Some)
                .map_err(|_| {
                    ConfigError::InvalidValue {
                        field: "writeConcern".to_string(),
                        value: name.clone(),
                    }
                    .into()
                }),
            None => Ok(None),
        }
    }

    /// Check values the driver would otherwise reject later, at first use.
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.is_none() && self.port == 0 {
            return Err(invalid("port", "0"));
        }
        if self.max_pool_size == Some(0) {
            return Err(invalid("maxPoolSize", "0"));
        }
        if let (Some(min), Some(max)) = (self.min_pool_size, self.max_pool_size) {
            if min > max {
                return Err(invalid("minPoolSize", &min.to_string()));
            }
        }
        if matches!(self.db_name.as_deref(), Some("")) {
            return Err(invalid("db_name", ""));
        }
        self.default_write_option()?;
        Ok(())
    }

    /// Build driver options: parse the URI, then apply explicit keys on top.
    ///
    /// Returns the options and the database name operations should use.
    pub async fn to_client_options(&self) -> Result<(ClientOptions, String)> {
        self.validate()?;

        let mut options = ClientOptions::parse(self.connection_uri())
            .await
            .map_err(|e| ConnectionError::InvalidUri(e.to_string()))?;

        if let Some(size) = self.max_pool_size {
            options.max_pool_size = Some(size);
        }
        if let Some(size) = self.min_pool_size {
            options.min_pool_size = Some(size);
        }
        if let Some(ms) = self.max_idle_time_ms {
            options.max_idle_time = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = self.connect_timeout_ms {
            options.connect_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = self.server_selection_timeout_ms {
            options.server_selection_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(name) = &self.replica_set {
            options.repl_set_name = Some(name.clone());
        }
        if let Some(name) = &self.app_name {
            options.app_name = Some(name.clone());
        }
        if let Some(opt) = self.default_write_option()? {
            options.write_concern = Some(opt.to_write_concern());
        }
        if self.username.is_some() || self.password.is_some() || self.auth_source.is_some() {
            let mut credential = options.credential.take().unwrap_or_else(Credential::default);
            if let Some(user) = &self.username {
                credential.username = Some(user.clone());
            }
            if let Some(password) = &self.password {
                credential.password = Some(password.clone());
            }
            if let Some(source) = &self.auth_source {
                credential.source = Some(source.clone());
            }
            options.credential = Some(credential);
        }

        let db_name = self
            .db_name
            .clone()
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DB_NAME.to_string());

        debug!(
            "Resolved client options for {:?} (database '{}')",
            options.hosts, db_name
        );
        Ok((options, db_name))
    }

    /// Copy with the password masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.password.is_some() {
            copy.password = Some("****".to_string());
        }
        copy
    }
}

fn invalid(field: &str, value: &str) -> crate::error::ClientError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Configuration file contents for the `mongoclient` binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client configuration
    pub client: ClientConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        Ok(config)
    }

    /// Load file and environment configuration.
    ///
    /// An explicit path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MONGOCLIENT_*` overrides using the given variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(uri) = var("CONNECTION_STRING") {
            self.client.connection_string = Some(uri);
        }
        if let Some(db) = var("DB_NAME") {
            self.client.db_name = Some(db);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level.parse()?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongoclient")
            .join("config.toml")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.client.validate()
    }

    /// Render as TOML with secrets masked.
    pub fn to_toml_redacted(&self) -> Result<String> {
        let display = Config {
            client: self.client.redacted(),
            logging: self.logging.clone(),
        };
        toml::to_string_pretty(&display).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: s.to_string(),
            }),
        }
    }
}
