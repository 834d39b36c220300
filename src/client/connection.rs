//! The seam between cluster logic and a live node.
//!
//! Everything that inspects or administers a node goes through these traits,
//! so the checker, analyzer and join workflow can run against a scripted
//! node in tests and against [`ValkeyClient`](super::ValkeyClient) for real.

use async_trait::async_trait;

use super::parsing::db_section;
use super::valkey_client::ValkeyError;

/// `INFO` sections the tool reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoSection {
    Keyspace,
    Memory,
}

/// Read-only requests against a single node.
#[async_trait]
pub trait NodeConnection: Send + Sync {
    /// Raw `CLUSTER NODES` text.
    async fn cluster_nodes_raw(&self) -> Result<String, ValkeyError>;

    /// Raw `CLUSTER INFO` text.
    async fn cluster_info_raw(&self) -> Result<String, ValkeyError>;

    /// Raw `INFO <section>` text.
    async fn info(&self, section: InfoSection) -> Result<String, ValkeyError>;

    /// `CLUSTER COUNTKEYSINSLOT <slot>`.
    async fn count_keys_in_slot(&self, slot: u16) -> Result<i64, ValkeyError>;

    /// Keyspace lines for one logical database; empty when it holds no keys.
    async fn database_info(&self, db: u32) -> Result<String, ValkeyError> {
        let keyspace = self.info(InfoSection::Keyspace).await?;
        Ok(db_section(&keyspace, db))
    }

    /// Release the connection. Nothing to do unless the transport holds one.
    async fn close(&self) -> Result<(), ValkeyError> {
        Ok(())
    }
}

/// Mutating cluster commands used when joining a node.
#[async_trait]
pub trait NodeAdmin: NodeConnection {
    /// `CLUSTER MEET <ip> <port>`.
    async fn cluster_meet(&self, ip: &str, port: u16) -> Result<(), ValkeyError>;

    /// `CLUSTER REPLICATE <master-id>`.
    async fn cluster_replicate(&self, master_id: &str) -> Result<(), ValkeyError>;
}

/// Opens connections to individual nodes of a topology.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    type Connection: NodeConnection;

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Connection, ValkeyError>;
}
