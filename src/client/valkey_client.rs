//! Valkey client wrapper using the fred crate.
//!
//! Opens a single-node (non-clustered) connection: per-slot key counts and
//! keyspace statistics only make sense against the node that owns the slots.

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use fred::types::InfoKind;
use thiserror::Error;
use tracing::{debug, instrument};

use super::connection::{InfoSection, NodeAdmin, NodeConnection, NodeConnector};

/// Default endpoint when none is given.
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:6379";

/// Errors that can occur during Valkey operations.
#[derive(Error, Debug)]
pub enum ValkeyError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] crate::cluster::types::ParseError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for connecting to one node.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Host name or IP.
    pub host: String,
    pub port: u16,
    /// Password for AUTH.
    pub password: Option<String>,
    /// Use TLS with the platform's root certificates.
    pub tls: bool,
    /// Connection timeout.
    pub connection_timeout: Duration,
    /// Command timeout.
    pub command_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            tls: false,
            connection_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration for a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Parse a `host:port` endpoint. The port is split off the last colon.
    pub fn from_endpoint(endpoint: &str) -> Result<Self, ValkeyError> {
        let (host, port) = endpoint.rsplit_once(':').ok_or_else(|| {
            ValkeyError::InvalidConfig(format!("expected HOST:PORT, got {endpoint:?}"))
        })?;
        if host.is_empty() {
            return Err(ValkeyError::InvalidConfig(format!(
                "missing host in {endpoint:?}"
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| ValkeyError::InvalidConfig(format!("invalid port {port:?}: {e}")))?;
        Ok(Self::new(host, port))
    }

    /// Same settings, different node.
    pub fn for_node(&self, host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..self.clone()
        }
    }

    /// Set password.
    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password;
        self
    }

    /// Enable or disable TLS.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Set connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// `host:port` of the configured node.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection to a single Valkey node.
pub struct ValkeyClient {
    client: Client,
    config: ClientConfig,
}

impl ValkeyClient {
    /// Create and connect a new client.
    #[instrument(skip(config), fields(endpoint = %config.endpoint(), tls = config.tls))]
    pub async fn connect(config: ClientConfig) -> Result<Self, ValkeyError> {
        let mut redis_config = Config {
            server: ServerConfig::Centralized {
                server: Server::new(config.host.as_str(), config.port),
            },
            ..Default::default()
        };

        if let Some(ref password) = config.password {
            redis_config.password = Some(password.clone());
        }

        if config.tls {
            let tls_connector = TlsConnector::default_rustls()
                .map_err(|e| ValkeyError::Connection(format!("TLS error: {}", e)))?;
            redis_config.tls = Some(tls_connector.into());
        }

        let command_timeout = config.command_timeout;
        let connection_timeout = config.connection_timeout;

        let client = Builder::from_config(redis_config)
            .with_performance_config(|perf| {
                perf.default_command_timeout = command_timeout;
            })
            .with_connection_config(|conn| {
                conn.connection_timeout = connection_timeout;
            })
            .build()?;

        debug!("Connecting to Valkey node");
        client.init().await?;
        debug!("Connected to Valkey node");

        Ok(Self { client, config })
    }
}

#[async_trait]
impl NodeConnection for ValkeyClient {
    #[instrument(skip(self), fields(endpoint = %self.config.endpoint()))]
    async fn cluster_nodes_raw(&self) -> Result<String, ValkeyError> {
        let response: String = self.client.cluster_nodes().await?;
        Ok(response)
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint()))]
    async fn cluster_info_raw(&self) -> Result<String, ValkeyError> {
        let response: String = self.client.cluster_info().await?;
        Ok(response)
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint()))]
    async fn info(&self, section: InfoSection) -> Result<String, ValkeyError> {
        let kind = match section {
            InfoSection::Keyspace => InfoKind::Keyspace,
            InfoSection::Memory => InfoKind::Memory,
        };
        let response: String = self.client.info(Some(kind)).await?;
        Ok(response)
    }

    #[instrument(skip(self), level = "trace")]
    async fn count_keys_in_slot(&self, slot: u16) -> Result<i64, ValkeyError> {
        let count: i64 = self.client.cluster_count_keys_in_slot(slot).await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint()))]
    async fn close(&self) -> Result<(), ValkeyError> {
        self.client.quit().await?;
        Ok(())
    }
}

#[async_trait]
impl NodeAdmin for ValkeyClient {
    #[instrument(skip(self), fields(endpoint = %self.config.endpoint()))]
    async fn cluster_meet(&self, ip: &str, port: u16) -> Result<(), ValkeyError> {
        self.client.cluster_meet(ip, port).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint()))]
    async fn cluster_replicate(&self, master_id: &str) -> Result<(), ValkeyError> {
        self.client.cluster_replicate(master_id).await?;
        Ok(())
    }
}

/// Connect to other nodes with the same credentials and timeouts.
#[async_trait]
impl NodeConnector for ClientConfig {
    type Connection = ValkeyClient;

    async fn connect(&self, host: &str, port: u16) -> Result<ValkeyClient, ValkeyError> {
        ValkeyClient::connect(self.for_node(host, port)).await
    }
}
