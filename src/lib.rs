//! valkey-cluster-admin library crate
//!
//! Parses cluster topology, checks nodes before they join a cluster, and
//! measures how keys are spread across shards.

pub mod client;
pub mod cluster;
pub mod precondition;
pub mod render;
pub mod slots;

pub use client::{ClientConfig, ValkeyClient, ValkeyError};
pub use cluster::{NodeRecord, ParseError, Topology};
pub use precondition::{PreconditionError, check_empty};
pub use slots::{AnalysisError, AnalyzeOptions, ShardStats, analyze_shard};
