//! Per-shard key distribution.
//!
//! Walks every stable slot a master owns, asks the master how many keys each
//! slot holds, and reads the master's keyspace totals. The per-slot sum and
//! the keyspace total come from different commands and are reported side by
//! side; they are never reconciled.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::client::cluster_ops::close_quietly;
use crate::client::connection::{InfoSection, NodeConnection, NodeConnector};
use crate::client::parsing::{InfoParseError, KeyspaceInfo, parse_info_value};
use crate::client::valkey_client::ValkeyError;
use crate::cluster::types::{NodeRecord, Topology};

use super::range::{SlotBounds, SlotRange};
use super::ranking::{SlotKeyCount, rank_by_key_count};

/// Errors that abort the analysis of one shard.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("{operation} failed: {source}")]
    Rpc {
        operation: String,
        #[source]
        source: ValkeyError,
    },

    #[error(transparent)]
    InvalidKeyspace(#[from] InfoParseError),

    #[error("{0} total overflowed")]
    Overflow(&'static str),
}

impl AnalysisError {
    fn rpc(operation: impl Into<String>) -> impl FnOnce(ValkeyError) -> Self {
        let operation = operation.into();
        move |source| AnalysisError::Rpc { operation, source }
    }
}

/// Knobs for [`analyze_shard`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyzeOptions {
    /// Rank slots by key count when non-zero.
    pub rank: usize,
    /// How stable slot ranges are walked.
    pub slot_bounds: SlotBounds,
}

impl AnalyzeOptions {
    pub fn new(rank: usize) -> Self {
        Self {
            rank,
            ..Default::default()
        }
    }

    pub fn with_slot_bounds(mut self, slot_bounds: SlotBounds) -> Self {
        self.slot_bounds = slot_bounds;
        self
    }
}

/// Statistics for one shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardStats {
    /// Id of the master the statistics were taken from.
    pub master_id: String,
    /// Number of slots walked.
    pub slot_count: usize,
    /// Sum of `keys=` over every `db*` line of `INFO keyspace`.
    pub key_count: i64,
    /// Sum of `expires=` over every `db*` line of `INFO keyspace`.
    pub expires_count: i64,
    /// Sum of the per-slot counts.
    pub slot_key_total: i64,
    /// Per-slot counts, by count descending when ranking was requested,
    /// otherwise in walk order.
    pub ranked: Vec<SlotKeyCount>,
}

impl ShardStats {
    /// Keyspace keys per walked slot, `None` for a shard with no slots.
    pub fn average_keys_per_slot(&self) -> Option<i64> {
        let slots = i64::try_from(self.slot_count).ok()?;
        self.key_count.checked_div(slots)
    }

    /// The first `n` entries of `ranked`.
    pub fn top(&self, n: usize) -> &[SlotKeyCount] {
        let n = n.min(self.ranked.len());
        self.ranked.get(..n).unwrap_or_default()
    }
}

/// Compute slot and key statistics for the shard `node` belongs to.
///
/// `conn` must be connected to the shard's master. A replica is swapped
/// for its master when the master is present in `topology`, otherwise the
/// node itself is analysed.
#[instrument(skip_all, fields(node_id = %node.id, rank = options.rank))]
pub async fn analyze_shard<C: NodeConnection + ?Sized>(
    topology: &Topology,
    node: &NodeRecord,
    options: &AnalyzeOptions,
    conn: &C,
) -> Result<ShardStats, AnalysisError> {
    let master = topology.master_of(node);

    let mut pairs = Vec::new();
    let mut slot_key_total: i64 = 0;
    for range in master.slots.iter().filter(|range| range.is_stable()) {
        for slot in range.slots(options.slot_bounds) {
            let count = conn
                .count_keys_in_slot(slot)
                .await
                .map_err(AnalysisError::rpc(format!("CLUSTER COUNTKEYSINSLOT {slot}")))?;
            slot_key_total = slot_key_total
                .checked_add(count)
                .ok_or(AnalysisError::Overflow("per-slot key"))?;
            pairs.push(SlotKeyCount::new(slot, count));
        }
    }
    let slot_count = pairs.len();

    let raw = conn
        .info(InfoSection::Keyspace)
        .await
        .map_err(AnalysisError::rpc("INFO keyspace"))?;
    let keyspace = KeyspaceInfo::parse(&raw)?;
    let key_count = keyspace
        .total_keys()
        .ok_or(AnalysisError::Overflow("keyspace key"))?;
    let expires_count = keyspace
        .total_expires()
        .ok_or(AnalysisError::Overflow("keyspace expires"))?;

    let ranked = if options.rank > 0 {
        rank_by_key_count(pairs)
    } else {
        pairs
    };

    debug!(
        master_id = %master.id,
        slot_count,
        key_count,
        slot_key_total,
        "Analyzed shard"
    );

    Ok(ShardStats {
        master_id: master.id.clone(),
        slot_count,
        key_count,
        expires_count,
        slot_key_total,
        ranked,
    })
}

/// `used_memory` from `INFO memory`, as reported by the node.
#[instrument(skip(conn))]
pub async fn fetch_used_memory<C: NodeConnection + ?Sized>(
    conn: &C,
) -> Result<Option<String>, AnalysisError> {
    let raw = conn
        .info(InfoSection::Memory)
        .await
        .map_err(AnalysisError::rpc("INFO memory"))?;
    Ok(parse_info_value(&raw, "used_memory"))
}

/// Outcome of analysing one master in [`analyze_cluster`].
#[derive(Debug)]
pub struct ShardReport {
    pub node: NodeRecord,
    pub used_memory: Option<String>,
    pub stats: Result<ShardStats, AnalysisError>,
}

/// Analyse every master of `topology`, in line order.
///
/// Masters without slots are left out without being contacted. A failing
/// shard is reported with its error and does not stop the others. Every
/// connection opened here is closed before the next shard.
pub async fn analyze_cluster<K: NodeConnector + ?Sized>(
    topology: &Topology,
    options: &AnalyzeOptions,
    connector: &K,
) -> Vec<ShardReport> {
    let mut reports = Vec::new();

    for node in topology.masters() {
        let master = topology.master_of(node);
        if !master.slots.iter().any(SlotRange::is_stable) {
            debug!(node_id = %node.id, flags = %node.flags_display(), "Master owns no slots, skipping");
            continue;
        }

        let outcome = match connector.connect(&master.ip, master.port).await {
            Ok(conn) => {
                let outcome = shard_report(topology, node, options, &conn).await;
                close_quietly(&conn).await;
                outcome
            }
            Err(e) => Err(AnalysisError::rpc(format!("connect {}:{}", master.ip, master.port))(e)),
        };

        match outcome {
            Ok(None) => debug!(node_id = %node.id, "No slots walked, skipping"),
            Ok(Some((stats, used_memory))) => reports.push(ShardReport {
                node: node.clone(),
                used_memory,
                stats: Ok(stats),
            }),
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "Shard analysis failed");
                reports.push(ShardReport {
                    node: node.clone(),
                    used_memory: None,
                    stats: Err(e),
                });
            }
        }
    }

    info!(shards = reports.len(), "Cluster analysis complete");
    reports
}

/// Stats plus memory for one shard, `None` when the walk found no slots.
async fn shard_report<C: NodeConnection + ?Sized>(
    topology: &Topology,
    node: &NodeRecord,
    options: &AnalyzeOptions,
    conn: &C,
) -> Result<Option<(ShardStats, Option<String>)>, AnalysisError> {
    let stats = analyze_shard(topology, node, options, conn).await?;
    if stats.slot_count == 0 {
        return Ok(None);
    }
    let used_memory = fetch_used_memory(conn).await?;
    Ok(Some((stats, used_memory)))
}
