//! Talking to Valkey nodes.
//!
//! - `connection`: the traits cluster logic is written against
//! - `valkey_client`: the `fred`-backed implementation and its configuration
//! - `parsing`: `INFO` and keyspace text parsing
//! - `cluster_ops`: topology fetch and the replica-join workflow, with
//!   connection setup and teardown

pub mod cluster_ops;
pub mod connection;
pub mod parsing;
pub mod valkey_client;

pub use cluster_ops::{
    JoinError, JoinOptions, add_replica, close_quietly, fetch_topology, join_as_replica,
    load_topology,
};
pub use connection::{InfoSection, NodeAdmin, NodeConnection, NodeConnector};
pub use parsing::{DbKeyspace, InfoParseError, KeyspaceInfo};
pub use valkey_client::{ClientConfig, DEFAULT_ENDPOINT, ValkeyClient, ValkeyError};
