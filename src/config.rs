//! Configuration for atomickv
//!
//! Connection settings for the remote backend and listener settings for the
//! local RESP server, both with sensible defaults and builders.

use std::time::Duration;

use crate::error::{KvError, Result};

/// Settings used by [`RemoteBackend`](crate::backend::RemoteBackend) to open
/// its connection
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    // -------------------------------------------------------------------------
    // Endpoint
    // -------------------------------------------------------------------------
    /// Server host name or IP address
    pub host: String,

    /// Server TCP port
    pub port: u16,

    /// Logical database index selected after connecting (0 = default)
    pub db: u32,

    /// Optional password sent with AUTH after connecting
    pub password: Option<String>,

    // -------------------------------------------------------------------------
    // Timeouts
    // -------------------------------------------------------------------------
    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Socket read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Socket write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
        }
    }
}

impl RemoteConfig {
    /// Create a new config builder
    pub fn builder() -> RemoteConfigBuilder {
        RemoteConfigBuilder::default()
    }

    /// `host:port` string for this endpoint
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings that can never produce a working connection
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(KvError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(KvError::Config("port must be non-zero".to_string()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(KvError::Config(
                "connect timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub(crate) fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}

/// Builder for RemoteConfig
#[derive(Default)]
pub struct RemoteConfigBuilder {
    config: RemoteConfig,
}

impl RemoteConfigBuilder {
    /// Set the server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the logical database index
    pub fn db(mut self, db: u32) -> Self {
        self.config.db = db;
        self
    }

    /// Set the AUTH password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> RemoteConfig {
        self.config
    }
}

/// Settings for the local RESP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:6379".to_string(),
            max_connections: 1024,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
