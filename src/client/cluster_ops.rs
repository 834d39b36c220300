//! Multi-step cluster operations built from single-node commands.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, instrument, warn};

use super::connection::{NodeAdmin, NodeConnection, NodeConnector};
use super::valkey_client::ValkeyError;
use crate::cluster::resolver::HostResolver;
use crate::cluster::types::Topology;
use crate::precondition::{PreconditionError, check_empty};

/// Fetch and parse `CLUSTER NODES`, then resolve node addresses.
#[instrument(skip_all)]
pub async fn fetch_topology<C, R>(conn: &C, resolver: &R) -> Result<Topology, ValkeyError>
where
    C: NodeConnection + ?Sized,
    R: HostResolver + ?Sized,
{
    let raw = conn.cluster_nodes_raw().await?;
    let topology = Topology::parse(&raw)?;
    Ok(topology.resolve_hosts(resolver).await)
}

/// Close `conn`, logging a failure instead of returning it.
pub async fn close_quietly<C: NodeConnection + ?Sized>(conn: &C) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close connection");
    }
}

/// Connect to `host:port`, read the topology it sees, and close the
/// connection whether or not the read succeeded.
#[instrument(skip(connector, resolver))]
pub async fn load_topology<K, R>(
    connector: &K,
    host: &str,
    port: u16,
    resolver: &R,
) -> Result<Topology, ValkeyError>
where
    K: NodeConnector + ?Sized,
    R: HostResolver + ?Sized,
{
    let conn = connector.connect(host, port).await?;
    let topology = fetch_topology(&conn, resolver).await;
    close_quietly(&conn).await;
    topology
}

/// Errors from [`join_as_replica`].
#[derive(Error, Debug)]
pub enum JoinError {
    #[error("candidate node rejected: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("no node flagged `myself` in the master's CLUSTER NODES output")]
    NoSelfNode,

    #[error("connect {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: ValkeyError,
    },

    #[error("{operation} failed: {source}")]
    Command {
        operation: &'static str,
        #[source]
        source: ValkeyError,
    },
}

/// Settings for [`join_as_replica`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    /// Pause between CLUSTER MEET and CLUSTER REPLICATE so the handshake
    /// can propagate.
    pub settle_delay: Duration,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(5),
        }
    }
}

/// Add an empty node as a replica of the master `master_conn` points at.
///
/// Returns the id of the master the node now replicates.
#[instrument(skip_all)]
pub async fn join_as_replica<M, N>(
    master_conn: &M,
    candidate: &N,
    options: &JoinOptions,
) -> Result<String, JoinError>
where
    M: NodeConnection + ?Sized,
    N: NodeAdmin + ?Sized,
{
    let raw = master_conn
        .cluster_nodes_raw()
        .await
        .map_err(|source| JoinError::Command {
            operation: "CLUSTER NODES",
            source,
        })?;
    let topology = Topology::parse(&raw).map_err(|e| JoinError::Command {
        operation: "CLUSTER NODES",
        source: e.into(),
    })?;
    let master = topology.myself().ok_or(JoinError::NoSelfNode)?;

    check_empty(candidate).await?;

    info!(master_id = %master.id, ip = %master.ip, port = master.port, "Introducing node to the cluster");
    candidate
        .cluster_meet(&master.ip, master.port)
        .await
        .map_err(|source| JoinError::Command {
            operation: "CLUSTER MEET",
            source,
        })?;

    tokio::time::sleep(options.settle_delay).await;

    info!(master_id = %master.id, "Configuring node as replica");
    candidate
        .cluster_replicate(&master.id)
        .await
        .map_err(|source| JoinError::Command {
            operation: "CLUSTER REPLICATE",
            source,
        })?;

    Ok(master.id.clone())
}

/// Connect to the candidate and the master, run [`join_as_replica`], and
/// close every connection that was opened, on success or failure.
#[instrument(skip(connector, options))]
pub async fn add_replica<K>(
    connector: &K,
    candidate: (&str, u16),
    master: (&str, u16),
    options: &JoinOptions,
) -> Result<String, JoinError>
where
    K: NodeConnector + ?Sized,
    K::Connection: NodeAdmin,
{
    let candidate_conn = connect_for_join(connector, candidate).await?;
    let master_conn = match connect_for_join(connector, master).await {
        Ok(conn) => conn,
        Err(e) => {
            close_quietly(&candidate_conn).await;
            return Err(e);
        }
    };

    let outcome = join_as_replica(&master_conn, &candidate_conn, options).await;
    close_quietly(&candidate_conn).await;
    close_quietly(&master_conn).await;
    outcome
}

async fn connect_for_join<K: NodeConnector + ?Sized>(
    connector: &K,
    (host, port): (&str, u16),
) -> Result<K::Connection, JoinError> {
    connector
        .connect(host, port)
        .await
        .map_err(|source| JoinError::Connect {
            endpoint: format!("{host}:{port}"),
            source,
        })
}
