//! Hash slot ownership and per-slot key distribution.
//!
//! ## Module Structure
//!
//! - [`range`]: the slot range grammar used in `CLUSTER NODES`
//! - [`ranking`]: ordering slots by key count
//! - [`distribution`]: per-shard key statistics

pub mod distribution;
pub mod range;
pub mod ranking;

pub use distribution::{
    AnalysisError, AnalyzeOptions, ShardReport, ShardStats, analyze_cluster, analyze_shard,
    fetch_used_memory,
};
pub use range::{SlotBounds, SlotRange, SlotTransition, TOTAL_SLOTS};
pub use ranking::{SlotKeyCount, rank_by_key_count};
