//! Safety check run before a node is introduced into a cluster.

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::client::connection::NodeConnection;
use crate::client::parsing::parse_info_value;
use crate::client::valkey_client::ValkeyError;

const KNOWN_NODES_FIELD: &str = "cluster_known_nodes";

/// Why a node may not be admitted.
#[derive(Error, Debug)]
pub enum PreconditionError {
    #[error("failed to query candidate node: {0}")]
    Rpc(#[from] ValkeyError),

    #[error("CLUSTER INFO has no `cluster_known_nodes` field")]
    MissingKnownNodes,

    #[error("invalid `cluster_known_nodes` value {0:?}")]
    InvalidKnownNodes(String),

    #[error(
        "node is not empty, either the node already knows other nodes (check with CLUSTER NODES) or contains some key in database 0: {db_info}"
    )]
    NotEmpty { db_info: String },
}

/// Verify a candidate node holds no keys and no prior cluster knowledge.
///
/// A node that already knows other peers (`cluster_known_nodes > 1`) passes:
/// only an isolated node is inspected for keys in database 0.
#[instrument(skip(conn))]
pub async fn check_empty<C: NodeConnection + ?Sized>(conn: &C) -> Result<(), PreconditionError> {
    let cluster_info = conn.cluster_info_raw().await?;

    let known_nodes = parse_info_value(&cluster_info, KNOWN_NODES_FIELD)
        .ok_or(PreconditionError::MissingKnownNodes)?;
    let known_nodes: u64 = known_nodes
        .parse()
        .map_err(|_| PreconditionError::InvalidKnownNodes(known_nodes.clone()))?;

    if known_nodes != 1 {
        warn!(
            known_nodes,
            "Node already knows other peers, skipping keyspace check"
        );
        return Ok(());
    }

    let db_info = conn.database_info(0).await?;
    if !db_info.trim().is_empty() {
        return Err(PreconditionError::NotEmpty { db_info });
    }

    debug!("Node is empty");
    Ok(())
}
