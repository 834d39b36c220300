//! Cluster topology as reported by `CLUSTER NODES`.

pub mod resolver;
pub mod types;

pub use resolver::{DnsResolver, HostResolver, LiteralResolver};
pub use types::{LinkState, NodeFlags, NodeRecord, ParseError, Topology};
