// src/config.rs
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_PATH_VAR: &str = "FLUID_WORKER_CONFIG";
pub const CONFIG_FILE_NAME: &str = "fluid-worker.json";

/// Smallest frame size a broker accepts during tune negotiation.
const MIN_FRAME_MAX: u32 = 4096;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
}

/// Broker connection parameters. Fixed at startup.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    #[serde(default = "default_credential")]
    pub username: String,
    #[serde(default = "default_credential")]
    pub password: String,
    #[serde(default = "default_frame_max")]
    pub frame_max: u32,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_seconds: u16,
    #[serde(default = "default_timeout")]
    pub connection_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Inbound queue. Empty asks the broker for a generated name.
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default = "default_consumer_tag_prefix")]
    pub consumer_tag_prefix: String,
    #[serde(default)]
    pub missing_reply_to: MissingReplyTo,
    #[serde(default)]
    pub publisher_confirms: bool,
}

/// What to do with a request that carries no usable `reply-to`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingReplyTo {
    /// Run the handler and drop its results without publishing.
    #[default]
    Discard,
    /// Fail the worker before the handler runs.
    Reject,
}

#[derive(Debug, Error)]
#[error("unknown missing_reply_to policy '{0}', expected 'discard' or 'reject'")]
pub struct UnknownPolicy(String);

impl FromStr for MissingReplyTo {
    type Err = UnknownPolicy;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(MissingReplyTo::Discard),
            "reject" => Ok(MissingReplyTo::Reject),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

// Default values
fn default_host() -> String { "localhost".to_string() }
fn default_port() -> u16 { 5672 }
fn default_vhost() -> String { "/".to_string() }
fn default_credential() -> String { "guest".to_string() }
fn default_frame_max() -> u32 { 131_072 }
fn default_heartbeat() -> u16 { 30 }
fn default_timeout() -> u64 { 5000 }
fn default_queue() -> String { "fluid_request".to_string() }
fn default_consumer_tag_prefix() -> String { "fluid-worker".to_string() }

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            vhost: default_vhost(),
            username: default_credential(),
            password: default_credential(),
            frame_max: default_frame_max(),
            heartbeat_seconds: default_heartbeat(),
            connection_timeout_ms: default_timeout(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            queue: default_queue(),
            consumer_tag_prefix: default_consumer_tag_prefix(),
            missing_reply_to: MissingReplyTo::default(),
            publisher_confirms: false,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vhost", &self.vhost)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("frame_max", &self.frame_max)
            .field("heartbeat_seconds", &self.heartbeat_seconds)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn amqp_uri(&self) -> AMQPUri {
        AMQPUri {
            scheme: AMQPScheme::AMQP,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.username.clone(),
                    password: self.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            vhost: self.vhost.clone(),
            query: AMQPQueryString {
                frame_max: Some(self.frame_max),
                heartbeat: Some(self.heartbeat_seconds),
                ..AMQPQueryString::default()
            },
        }
    }

    /// `host:port/vhost`, safe to log.
    pub fn endpoint(&self) -> String {
        format!("{}:{}{}", self.host, self.port, self.vhost_path())
    }

    fn vhost_path(&self) -> String {
        if self.vhost.starts_with('/') {
            self.vhost.clone()
        } else {
            format!("/{}", self.vhost)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

impl WorkerConfig {
    /// Config file (if any), then `.env` and environment overrides, then validation.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = match find_config_file() {
            Some(path) => load_config_file(&path)?,
            None => {
                debug!("No config file found, using defaults");
                WorkerConfig::default()
            }
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection.host.is_empty() {
            return Err(anyhow!("Configuration error: connection.host cannot be empty"));
        }
        if self.connection.port == 0 {
            return Err(anyhow!("Configuration error: connection.port cannot be 0"));
        }
        if self.connection.frame_max < MIN_FRAME_MAX {
            return Err(anyhow!(
                "Configuration error: connection.frame_max must be at least {}",
                MIN_FRAME_MAX
            ));
        }
        if self.worker.consumer_tag_prefix.is_empty() {
            return Err(anyhow!(
                "Configuration error: worker.consumer_tag_prefix cannot be empty"
            ));
        }
        Ok(())
    }
}

pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
        debug!("Using config file from {}: {}", CONFIG_PATH_VAR, path);
        return Some(PathBuf::from(path));
    }

    let locations = [
        ("Current directory", PathBuf::from(CONFIG_FILE_NAME)),
        ("Current directory (alternative)", Path::new("config").join(CONFIG_FILE_NAME)),
    ];

    for (location_name, path) in locations.iter() {
        if path.exists() {
            debug!("Found config file in {}: {}", location_name, path.display());
            return Some(path.clone());
        }
    }

    if let Some(home_dir) = home::home_dir() {
        let home_config = home_dir.join(format!(".{}", CONFIG_FILE_NAME));
        if home_config.exists() {
            debug!("Found config file in home directory: {}", home_config.display());
            return Some(home_config);
        }
    }

    None
}

pub fn load_config_file(path: &Path) -> Result<WorkerConfig> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read config file at {}", path.display()))?;

    let config: WorkerConfig = serde_json::from_str(&content)
        .context("Configuration file contains invalid JSON or unexpected field types")?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

pub fn create_default_config_file(path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&WorkerConfig::default())
        .context("Failed to serialize default configuration")?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory at {}", parent.display()))?;
        }
    }

    fs::write(path, json)
        .context(format!("Failed to write configuration to {}", path.display()))?;

    info!("Created default configuration file at: {}", path.display());
    Ok(())
}
