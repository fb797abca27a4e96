//! Client configuration.
//!
//! Configuration is read from a TOML file with three sections:
//!
//! ```toml
//! [server]
//! address = "127.0.0.1"
//! port = 6006
//!
//! [cache]
//! address = "127.0.0.1"
//! port = 11211
//!
//! [client]
//! authkey = "secret"
//! environment = "production"
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level client configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub client: ClientSection,
}

/// Backend RPC server location
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host name, IP address, or socket path (optionally `unix://` prefixed)
    #[serde(default = "default_server_address")]
    pub address: String,
    /// Port for TCP endpoints; omit for Unix sockets
    #[serde(default = "default_server_port")]
    pub port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
            port: default_server_port(),
        }
    }
}

impl ServerConfig {
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::from_parts(&self.address, self.port)
    }
}

fn default_server_address() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> Option<u16> {
    Some(6006)
}

/// External key-value cache store location
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_address")]
    pub address: String,
    #[serde(default = "default_cache_port")]
    pub port: Option<u16>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            address: default_cache_address(),
            port: default_cache_port(),
        }
    }
}

impl CacheConfig {
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::from_parts(&self.address, self.port)
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_address() -> String {
    "127.0.0.1".to_string()
}

fn default_cache_port() -> Option<u16> {
    Some(11211)
}

/// Settings attached to every call made by this client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientSection {
    /// Sent with every call payload
    #[serde(default)]
    pub authkey: String,
    #[serde(default)]
    pub environment: Environment,
    /// Optional prefix for envelope method names, e.g. `Sleepy` yields `Sleepy.Call`
    #[serde(default)]
    pub service: Option<String>,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl Environment {
    /// Whether error details may be shown to end users
    pub fn show_errors(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file {path:?}: {e}")))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.server.endpoint()?;
        if self.cache.enabled {
            self.cache.endpoint()?;
        }
        Ok(())
    }
}

/// Where a socket connection goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Endpoint {
    /// Build an endpoint from an address and an optional port
    ///
    /// `unix:///path` or an absolute path select a Unix socket and ignore the
    /// port, anything else needs a port. A `tcp://` prefix is accepted and stripped.
    pub fn from_parts(address: &str, port: Option<u16>) -> Result<Self> {
        if let Some(path) = address.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(Error::Config("Unix socket path is empty".to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }

        let host = address.strip_prefix("tcp://").unwrap_or(address);
        if host.is_empty() {
            return Err(Error::Config("Address is empty".to_string()));
        }

        if host.starts_with('/') {
            return Ok(Self::Unix(PathBuf::from(host)));
        }

        match port {
            Some(port) => Ok(Self::Tcp {
                host: host.to_string(),
                port,
            }),
            None => Err(Error::Config(format!("No port given for address '{host}'"))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}
