//! Types for the parsed `CLUSTER NODES` topology.
//!
//! One [`NodeRecord`] per line of the introspection output, in source order.
//! Parsing is all-or-nothing: a single bad field fails the whole topology.

use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::slots::range::SlotRange;

/// Errors that can occur when parsing cluster data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: missing required field `{field}`")]
    MissingField { line: usize, field: &'static str },

    #[error("line {line}: invalid `{field}` value {value:?}: {reason}")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid slot token {token:?}: {reason}")]
    InvalidSlotToken { token: String, reason: String },
}

/// Typed view over the comma-separated flags field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeFlags {
    /// This is the node that answered the introspection call.
    pub myself: bool,
    pub master: bool,
    pub slave: bool,
    /// Possibly failing, not yet confirmed by a majority.
    pub pfail: bool,
    pub fail: bool,
    pub handshake: bool,
    pub noaddr: bool,
    pub nofailover: bool,
    pub noflags: bool,
}

impl NodeFlags {
    /// Build flags from the raw token list.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        let mut flags = NodeFlags::default();
        for token in tokens {
            match token {
                "myself" => flags.myself = true,
                "master" => flags.master = true,
                "slave" => flags.slave = true,
                "fail?" => flags.pfail = true,
                "fail" => flags.fail = true,
                "handshake" => flags.handshake = true,
                "noaddr" => flags.noaddr = true,
                "nofailover" => flags.nofailover = true,
                "noflags" => flags.noflags = true,
                _ => {}
            }
        }
        flags
    }
}

/// State of the cluster-bus link to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connected,
    Disconnected,
}

impl FromStr for LinkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(LinkState::Connected),
            "disconnected" => Ok(LinkState::Disconnected),
            other => Err(format!("expected connected or disconnected, got {other:?}")),
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Connected => write!(f, "connected"),
            LinkState::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A cluster member as reported by `CLUSTER NODES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    /// Unique node id.
    pub id: String,
    /// Hostname when reverse resolution succeeded, the IP literal otherwise.
    pub address: String,
    /// IP literal as received.
    pub ip: String,
    /// Client port.
    pub port: u16,
    /// Cluster bus port from the `@cport` suffix, when present.
    pub cluster_bus_port: Option<u16>,
    /// Hostname announced by the node itself (`@cport,hostname`).
    pub announced_hostname: Option<String>,
    /// Raw flag tokens in received order.
    pub flags: Vec<String>,
    /// Typed view over `flags`.
    #[serde(skip)]
    pub node_flags: NodeFlags,
    /// Master id for replicas; `None` for masters or when unknown (`-`).
    pub replica_of: Option<String>,
    pub ping_sent: u64,
    pub pong_recv: u64,
    pub config_epoch: u64,
    pub link_state: LinkState,
    /// Owned slot ranges, only populated for masters.
    pub slots: Vec<SlotRange>,
}

/// Fields in the order they appear on a line.
const FIELDS: [&str; 8] = [
    "id",
    "address",
    "flags",
    "replica_of",
    "ping_sent",
    "pong_recv",
    "config_epoch",
    "link_state",
];

impl NodeRecord {
    /// True iff the `master` flag is present.
    pub fn is_master(&self) -> bool {
        self.node_flags.master
    }

    /// True iff the `slave` flag is present.
    pub fn is_slave(&self) -> bool {
        self.node_flags.slave
    }

    /// Check if this is the node that answered the introspection call.
    pub fn is_myself(&self) -> bool {
        self.node_flags.myself
    }

    pub fn is_connected(&self) -> bool {
        self.link_state == LinkState::Connected
    }

    /// `host:port` using the display address.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Flags joined the way the server prints them.
    pub fn flags_display(&self) -> String {
        self.flags.join(",")
    }

    /// Parse a single line of `CLUSTER NODES` output.
    ///
    /// `line_no` is 1-based and only used for error reporting.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.split(' ').collect();
        let field = |index: usize| required_field(&parts, index, line_no);
        let invalid = |field: &'static str, value: &str, reason: String| ParseError::InvalidField {
            line: line_no,
            field,
            value: value.to_string(),
            reason,
        };

        let id = field(0)?.to_string();
        let address_field = field(1)?;
        let flags_field = field(2)?;
        let replica_of = field(3)?;
        let ping_sent = field(4)?;
        let pong_recv = field(5)?;
        let config_epoch = field(6)?;
        let link_state = field(7)?;

        let (ip, port, cluster_bus_port, announced_hostname) =
            parse_address(address_field).map_err(|reason| invalid("address", address_field, reason))?;

        let flags: Vec<String> = flags_field.split(',').map(str::to_string).collect();
        let node_flags = NodeFlags::from_tokens(flags.iter().map(String::as_str));

        let replica_of = match replica_of {
            "-" => None,
            id => Some(id.to_string()),
        };

        let parse_u64 = |field: &'static str, value: &str| -> Result<u64, ParseError> {
            value
                .parse::<u64>()
                .map_err(|e| invalid(field, value, format!("{e}")))
        };
        let ping_sent = parse_u64("ping_sent", ping_sent)?;
        let pong_recv = parse_u64("pong_recv", pong_recv)?;
        let config_epoch = parse_u64("config_epoch", config_epoch)?;
        let link_state = link_state
            .parse::<LinkState>()
            .map_err(|reason| invalid("link_state", link_state, reason))?;

        let slots = if node_flags.master {
            parts
                .iter()
                .skip(FIELDS.len())
                .filter(|token| !token.is_empty())
                .map(|token| {
                    SlotRange::parse(token).map_err(|e| invalid("slots", token, e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        Ok(NodeRecord {
            id,
            address: ip.clone(),
            ip,
            port,
            cluster_bus_port,
            announced_hostname,
            flags,
            node_flags,
            replica_of,
            ping_sent,
            pong_recv,
            config_epoch,
            link_state,
            slots,
        })
    }
}

fn required_field<'a>(parts: &[&'a str], index: usize, line_no: usize) -> Result<&'a str, ParseError> {
    parts
        .get(index)
        .copied()
        .filter(|value| !value.is_empty())
        .ok_or(ParseError::MissingField {
            line: line_no,
            field: FIELDS.get(index).copied().unwrap_or("unknown"),
        })
}

/// Split `ip:port[@cport[,hostname]]` on the last colon of the `ip:port` part.
fn parse_address(raw: &str) -> Result<(String, u16, Option<u16>, Option<String>), String> {
    let (ip_port, bus) = match raw.split_once('@') {
        Some((ip_port, bus)) => (ip_port, Some(bus)),
        None => (raw, None),
    };

    let (ip, port) = ip_port
        .rsplit_once(':')
        .ok_or_else(|| "expected <address>:<port>".to_string())?;
    let port = port
        .parse::<u16>()
        .map_err(|e| format!("invalid port {port:?}: {e}"))?;

    let (cluster_bus_port, hostname) = match bus {
        Some(bus) => {
            let (cport, hostname) = match bus.split_once(',') {
                Some((cport, hostname)) => (cport, Some(hostname)),
                None => (bus, None),
            };
            let cport = cport
                .parse::<u16>()
                .map_err(|e| format!("invalid cluster bus port {cport:?}: {e}"))?;
            let hostname = hostname.filter(|h| !h.is_empty()).map(str::to_string);
            (Some(cport), hostname)
        }
        None => (None, None),
    };

    Ok((ip.to_string(), port, cluster_bus_port, hostname))
}

/// Parsed output of `CLUSTER NODES`, one record per line in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Topology {
    pub nodes: Vec<NodeRecord>,
}

impl Topology {
    /// Parse the raw text of `CLUSTER NODES`.
    ///
    /// The text is trimmed first; every remaining line must be a node.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Topology::default());
        }

        let nodes = raw
            .lines()
            .enumerate()
            .map(|(index, line)| NodeRecord::parse_line(line.trim_end_matches('\r'), index + 1))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(nodes = nodes.len(), "Parsed cluster topology");
        Ok(Topology { nodes })
    }

    /// All nodes flagged `master`.
    pub fn masters(&self) -> Vec<&NodeRecord> {
        self.nodes.iter().filter(|n| n.is_master()).collect()
    }

    /// All nodes flagged `slave`.
    pub fn replicas(&self) -> Vec<&NodeRecord> {
        self.nodes.iter().filter(|n| n.is_slave()).collect()
    }

    /// The node flagged `myself`.
    pub fn myself(&self) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.is_myself())
    }

    /// Replicas of a specific master, in source order.
    pub fn replicas_of(&self, master_id: &str) -> Vec<&NodeRecord> {
        self.nodes
            .iter()
            .filter(|n| n.is_slave() && n.replica_of.as_deref() == Some(master_id))
            .collect()
    }

    /// Get a node by its id. The first match wins if ids repeat.
    pub fn get_node(&self, node_id: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// The master a node's statistics should be taken from.
    ///
    /// A replica resolves to the node named by `replica_of`; anything else,
    /// or a replica whose master is not in this snapshot, resolves to itself.
    pub fn master_of<'a>(&'a self, node: &'a NodeRecord) -> &'a NodeRecord {
        if !node.is_slave() {
            return node;
        }
        match node.replica_of.as_deref().and_then(|id| self.get_node(id)) {
            Some(master) => master,
            None => {
                warn!(node_id = %node.id, replica_of = ?node.replica_of, "Master not in topology, using node itself");
                node
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::slots::range::SlotTransition;

    const NODES: &str = "07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002 master - 0 1426238316232 2 connected 5461-10922
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30003 master - 0 1426238318243 3 connected 10923-16383
6ec23923021cf3ffec47632106199cb7f496ce01 127.0.0.1:30005 slave 67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 0 1426238316232 5 connected
824fe116063bc5fcf9f4ffd895bc17aee7731ac3 127.0.0.1:30006 slave 292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 0 1426238317741 6 connected
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001 myself,master - 0 0 1 connected 0-5460
";

    #[test]
    fn test_parse_topology_preserves_line_order() {
        let topology = Topology::parse(NODES).unwrap();
        assert_eq!(topology.nodes.len(), 6);
        assert_eq!(topology.nodes[0].id, "07c37dfeb235213a872192d90877d0cd55635b91");
        assert_eq!(topology.nodes[5].id, "e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca");
        assert_eq!(topology.masters().len(), 3);
        assert_eq!(topology.replicas().len(), 3);
    }

    #[test]
    fn test_parse_master_line() {
        let line = "e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001 myself,master - 0 0 1 connected 0-5460";
        let node = NodeRecord::parse_line(line, 1).unwrap();
        assert_eq!(node.ip, "127.0.0.1");
        assert_eq!(node.address, "127.0.0.1");
        assert_eq!(node.port, 30001);
        assert_eq!(node.flags, vec!["myself", "master"]);
        assert!(node.is_master());
        assert!(!node.is_slave());
        assert!(node.is_myself());
        assert!(node.replica_of.is_none());
        assert_eq!(node.link_state, LinkState::Connected);
        assert_eq!(node.slots, vec![SlotRange::new(0, 5460)]);
    }

    #[test]
    fn test_parse_replica_line() {
        let line = "6ec23923021cf3ffec47632106199cb7f496ce01 127.0.0.1:30005 slave 67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 0 1426238316232 5 connected";
        let node = NodeRecord::parse_line(line, 1).unwrap();
        assert!(node.is_slave());
        assert!(!node.is_master());
        assert_eq!(
            node.replica_of.as_deref(),
            Some("67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1")
        );
        assert_eq!(node.pong_recv, 1426238316232);
        assert_eq!(node.config_epoch, 5);
        assert!(node.slots.is_empty());
    }

    #[test]
    fn test_node_with_neither_role() {
        let line = "abc 10.0.0.1:6379 handshake - 0 0 0 disconnected";
        let node = NodeRecord::parse_line(line, 1).unwrap();
        assert!(!node.is_master());
        assert!(!node.is_slave());
        assert!(!node.is_connected());
    }

    #[test]
    fn test_node_with_both_roles_is_not_rejected() {
        let line = "abc 10.0.0.1:6379 master,slave - 0 0 0 connected 0-1";
        let node = NodeRecord::parse_line(line, 1).unwrap();
        assert!(node.is_master());
        assert!(node.is_slave());
    }

    #[test]
    fn test_parse_bus_port_and_hostname() {
        let line = "abc 10.0.0.1:6379@16379,valkey-0.valkey ping? - 0 0 0 connected";
        let node = NodeRecord::parse_line(line, 1).unwrap();
        assert_eq!(node.port, 6379);
        assert_eq!(node.cluster_bus_port, Some(16379));
        assert_eq!(node.announced_hostname.as_deref(), Some("valkey-0.valkey"));
    }

    #[test]
    fn test_parse_ipv6_address() {
        let line = "abc ::1:6379@16379 master - 0 0 0 connected";
        let node = NodeRecord::parse_line(line, 1).unwrap();
        assert_eq!(node.ip, "::1");
        assert_eq!(node.port, 6379);
    }

    #[test]
    fn test_slots_ignored_for_replicas() {
        let line = "abc 10.0.0.1:6379 slave def 0 0 0 connected not-a-slot";
        let node = NodeRecord::parse_line(line, 1).unwrap();
        assert!(node.slots.is_empty());
    }

    #[test]
    fn test_parse_slot_markers() {
        let line = "abc 10.0.0.1:6379 master - 0 0 1 connected 0-99 [100-<-def] [101->-ghi]";
        let node = NodeRecord::parse_line(line, 1).unwrap();
        assert_eq!(node.slots.len(), 3);
        assert_eq!(node.slots[1].transition, Some(SlotTransition::Importing));
        assert_eq!(node.slots[2].migrating_to.as_deref(), Some("ghi"));
    }

    #[test]
    fn test_non_numeric_port_fails() {
        let raw = "abc 10.0.0.1:6379 master - 0 0 1 connected\ndef 10.0.0.2:port master - 0 0 1 connected";
        let err = Topology::parse(raw).unwrap_err();
        match err {
            ParseError::InvalidField { line, field, .. } => {
                assert_eq!(line, 2);
                assert_eq!(field, "address");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_link_state_fails() {
        let err = Topology::parse("abc 10.0.0.1:6379 master - 0 0 1").unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingField {
                line: 1,
                field: "link_state"
            }
        );
    }

    #[test]
    fn test_invalid_counters_fail() {
        let err = Topology::parse("abc 10.0.0.1:6379 master - x 0 1 connected").unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "ping_sent", .. }));

        let err = Topology::parse("abc 10.0.0.1:6379 master - 0 0 -1 connected").unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "config_epoch", .. }));
    }

    #[test]
    fn test_unknown_link_state_fails() {
        let err = Topology::parse("abc 10.0.0.1:6379 master - 0 0 1 linked").unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { field: "link_state", .. }));
    }

    #[test]
    fn test_bad_slot_token_fails_whole_topology() {
        let raw = "abc 10.0.0.1:6379 master - 0 0 1 connected 0-10\ndef 10.0.0.2:6379 master - 0 0 2 connected 5461";
        let err = Topology::parse(raw).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField { line: 2, field: "slots", .. }));
    }

    #[test]
    fn test_empty_input() {
        assert!(Topology::parse("  \n").unwrap().nodes.is_empty());
    }

    #[test]
    fn test_master_of() {
        let topology = Topology::parse(NODES).unwrap();
        let replica = topology
            .get_node("6ec23923021cf3ffec47632106199cb7f496ce01")
            .unwrap();
        assert_eq!(
            topology.master_of(replica).id,
            "67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1"
        );

        let master = topology.myself().unwrap();
        assert_eq!(topology.master_of(master).id, master.id);
    }

    #[test]
    fn test_master_of_unknown_master_falls_back() {
        let topology =
            Topology::parse("abc 10.0.0.1:6379 slave missing 0 0 1 connected").unwrap();
        let node = &topology.nodes[0];
        assert_eq!(topology.master_of(node).id, "abc");
    }

    #[test]
    fn test_replicas_of() {
        let topology = Topology::parse(NODES).unwrap();
        let replicas = topology.replicas_of("e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca");
        assert_eq!(replicas.len(), 1);
        assert_eq!(replicas[0].port, 30004);
    }
}
