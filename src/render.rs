//! Text renderers for the CLI.
//!
//! Every renderer returns the full text with one trailing newline per line.

use crate::cluster::types::{NodeRecord, Topology};
use crate::slots::distribution::ShardStats;

const BRANCH: &str = "├─ ";
const LAST_BRANCH: &str = "└─ ";
const LEAF: &str = "├── ";
const LAST_LEAF: &str = "└── ";
const PIPE: &str = "│  ";
const GAP: &str = "    ";

fn node_summary(node: &NodeRecord) -> String {
    format!(
        "{} {}:{} [{}] {} {} {} {}",
        node.id,
        node.address,
        node.port,
        node.flags_display(),
        node.ping_sent,
        node.pong_recv,
        node.config_epoch,
        node.link_state
    )
}

fn slots_display(node: &NodeRecord) -> String {
    let ranges: Vec<String> = node.slots.iter().map(ToString::to_string).collect();
    format!("[{}]", ranges.join(" "))
}

fn finish(lines: Vec<String>) -> String {
    lines.into_iter().map(|line| line + "\n").collect()
}

/// Draw the cluster as a tree: every non-replica node is a root, its
/// replicas hang beneath it.
pub fn render_tree(topology: &Topology, masters_only: bool) -> String {
    let roots: Vec<&NodeRecord> = topology.nodes.iter().filter(|n| !n.is_slave()).collect();
    let mut lines = Vec::new();

    for (index, root) in roots.iter().enumerate() {
        let last_root = index + 1 == roots.len();
        let branch = if last_root { LAST_BRANCH } else { BRANCH };
        lines.push(format!("{branch}{} {}", node_summary(root), slots_display(root)));

        if masters_only {
            continue;
        }

        let replicas = topology.replicas_of(&root.id);
        for (r_index, replica) in replicas.iter().enumerate() {
            let trunk = if last_root { GAP } else { PIPE };
            let leaf = if r_index + 1 == replicas.len() {
                LAST_LEAF
            } else {
                LEAF
            };
            lines.push(format!("{trunk}{leaf}{}", node_summary(replica)));
        }
    }

    finish(lines)
}

fn whoami_entry(lines: &mut Vec<String>, indent: &str, first: &str, node: &NodeRecord) {
    lines.push(format!("{first}id: {}", node.id));
    lines.push(format!("{indent}host: {}", node.address));
    lines.push(format!("{indent}port: {}", node.port));
    lines.push(format!("{indent}flag: {}", node.flags_display()));
}

/// YAML-like description of the node that answered, plus its replicas or
/// its master. `None` when no node is flagged `myself`.
pub fn render_whoami(topology: &Topology) -> Option<String> {
    let myself = topology.myself()?;
    let mut lines = vec!["myself:".to_string()];
    whoami_entry(&mut lines, "  ", "  ", myself);

    if myself.is_master() {
        lines.push("  slaves:".to_string());
        for replica in topology.replicas_of(&myself.id) {
            whoami_entry(&mut lines, "    ", "  - ", replica);
        }
    }
    if myself.is_slave() {
        lines.push("  slaveof:".to_string());
        if let Some(master) = myself.replica_of.as_deref().and_then(|id| topology.get_node(id)) {
            whoami_entry(&mut lines, "    ", "  - ", master);
        }
    }

    Some(finish(lines))
}

/// Header line for one shard followed by its `rank` busiest slots.
pub fn render_shard_stats(
    node: &NodeRecord,
    stats: &ShardStats,
    used_memory: Option<&str>,
    rank: usize,
) -> String {
    let flags = format!("[{}]", node.flags_display());
    let avg = stats.average_keys_per_slot().unwrap_or(0);
    let mut lines = vec![format!(
        "{} {}:{} {flags:<16}slots:{:5} count:{:8} avg:{avg:5} used_memory:{:>12}",
        node.id,
        node.address,
        node.port,
        stats.slot_count,
        stats.key_count,
        used_memory.unwrap_or("-"),
    )];
    lines.extend(stats.top(rank).iter().map(ToString::to_string));
    finish(lines)
}
