//! Tests for per-shard and whole-cluster key distribution.

use crate::mock_node::{MockConnector, MockNode};
use valkey_cluster_admin::cluster::Topology;
use valkey_cluster_admin::slots::{
    AnalysisError, AnalyzeOptions, SlotBounds, SlotKeyCount, analyze_cluster, analyze_shard,
    fetch_used_memory,
};

const SHARDED: &str = "\
aaa 10.0.0.1:7000@17000 myself,master - 0 0 1 connected 0-100
bbb 10.0.0.2:7001@17001 master - 0 1700000000000 2 connected 101-200 [201->-aaa]
ccc 10.0.0.3:7002@17002 slave aaa 0 1700000000001 1 connected
";

fn topology() -> Topology {
    Topology::parse(SHARDED).unwrap()
}

// ============================================================================
// analyze_shard
// ============================================================================

/// The keyspace total and the per-slot total are separate signals: one
/// slot holding 42 keys does not change what INFO keyspace reports.
#[tokio::test]
async fn test_key_count_comes_from_keyspace_not_slot_counts() {
    let topology = topology();
    let conn = MockNode::new()
        .with_slot_count(50, 42)
        .with_keyspace("# Keyspace\r\ndb0:keys=7,expires=2,avg_ttl=0\r\n");

    let stats = analyze_shard(&topology, &topology.nodes[0], &AnalyzeOptions::new(3), &conn)
        .await
        .unwrap();

    assert_eq!(stats.master_id, "aaa");
    assert_eq!(stats.slot_count, 101);
    assert_eq!(stats.key_count, 7);
    assert_eq!(stats.expires_count, 2);
    assert_eq!(stats.slot_key_total, 42);
    assert_eq!(stats.ranked.len(), 101);
    assert_eq!(stats.ranked[0], SlotKeyCount::new(50, 42));
}

#[tokio::test]
async fn test_inclusive_bounds_walk_every_slot() {
    let topology = topology();
    let conn = MockNode::new();

    analyze_shard(&topology, &topology.nodes[0], &AnalyzeOptions::new(0), &conn)
        .await
        .unwrap();

    assert_eq!(conn.count_calls("CLUSTER COUNTKEYSINSLOT"), 101);
    assert_eq!(conn.count_calls("CLUSTER COUNTKEYSINSLOT 100"), 1);
}

#[tokio::test]
async fn test_exclusive_bounds_skip_range_end() {
    let topology = topology();
    let conn = MockNode::new();
    let options = AnalyzeOptions::new(0).with_slot_bounds(SlotBounds::Exclusive);

    let stats = analyze_shard(&topology, &topology.nodes[0], &options, &conn)
        .await
        .unwrap();

    assert_eq!(stats.slot_count, 100);
    assert_eq!(conn.count_calls("CLUSTER COUNTKEYSINSLOT 100"), 0);
}

#[tokio::test]
async fn test_migration_markers_are_not_counted() {
    let topology = topology();
    let conn = MockNode::new();

    let stats = analyze_shard(&topology, &topology.nodes[1], &AnalyzeOptions::new(0), &conn)
        .await
        .unwrap();

    assert_eq!(stats.slot_count, 100);
    assert_eq!(conn.count_calls("CLUSTER COUNTKEYSINSLOT 201"), 0);
}

#[tokio::test]
async fn test_without_rank_slots_stay_in_walk_order() {
    let topology = topology();
    let conn = MockNode::new().with_slot_count(60, 9);

    let stats = analyze_shard(&topology, &topology.nodes[0], &AnalyzeOptions::new(0), &conn)
        .await
        .unwrap();

    assert_eq!(stats.ranked[0], SlotKeyCount::new(0, 0));
    assert_eq!(stats.ranked[60], SlotKeyCount::new(60, 9));
}

#[tokio::test]
async fn test_replica_is_analyzed_through_its_master() {
    let topology = topology();
    let conn = MockNode::new();

    let stats = analyze_shard(&topology, &topology.nodes[2], &AnalyzeOptions::new(0), &conn)
        .await
        .unwrap();

    assert_eq!(stats.master_id, "aaa");
    assert_eq!(stats.slot_count, 101);
}

#[tokio::test]
async fn test_replica_with_unknown_master_falls_back_to_itself() {
    let topology = Topology::parse(
        "ccc 10.0.0.3:7002@17002 myself,slave zzz 0 1700000000001 1 connected",
    )
    .unwrap();
    let conn = MockNode::new().with_keyspace("db0:keys=4,expires=0,avg_ttl=0\r\n");

    let stats = analyze_shard(&topology, &topology.nodes[0], &AnalyzeOptions::new(5), &conn)
        .await
        .unwrap();

    assert_eq!(stats.master_id, "ccc");
    assert_eq!(stats.slot_count, 0);
    assert_eq!(stats.key_count, 4);
    assert!(stats.ranked.is_empty());
    assert_eq!(conn.count_calls("CLUSTER COUNTKEYSINSLOT"), 0);
}

#[tokio::test]
async fn test_totals_span_all_databases() {
    let topology = topology();
    let conn = MockNode::new().with_keyspace(
        "# Keyspace\r\ndb0:keys=5,expires=1,avg_ttl=0\r\ndb3:keys=10,expires=4,avg_ttl=120\r\n",
    );

    let stats = analyze_shard(&topology, &topology.nodes[0], &AnalyzeOptions::new(0), &conn)
        .await
        .unwrap();

    assert_eq!(stats.key_count, 15);
    assert_eq!(stats.expires_count, 5);
}

#[tokio::test]
async fn test_slot_count_failure_aborts_shard() {
    let topology = topology();
    let conn = MockNode::new().failing_on("CLUSTER COUNTKEYSINSLOT");

    let err = analyze_shard(&topology, &topology.nodes[0], &AnalyzeOptions::new(0), &conn)
        .await
        .unwrap_err();

    match err {
        AnalysisError::Rpc { operation, .. } => assert_eq!(operation, "CLUSTER COUNTKEYSINSLOT 0"),
        other => panic!("expected Rpc, got {other:?}"),
    }
    assert_eq!(conn.count_calls("CLUSTER COUNTKEYSINSLOT"), 1);
    assert_eq!(conn.count_calls("INFO keyspace"), 0);
}

#[tokio::test]
async fn test_malformed_keyspace_fails() {
    let topology = topology();
    let conn = MockNode::new().with_keyspace("db0:keys=lots,expires=0\r\n");

    let err = analyze_shard(&topology, &topology.nodes[0], &AnalyzeOptions::new(0), &conn)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::InvalidKeyspace(_)));
}

#[tokio::test]
async fn test_fetch_used_memory() {
    let conn = MockNode::new();
    assert_eq!(
        fetch_used_memory(&conn).await.unwrap().as_deref(),
        Some("1048576")
    );

    let conn = MockNode::new().with_memory("# Memory\r\n");
    assert_eq!(fetch_used_memory(&conn).await.unwrap(), None);

    let conn = MockNode::new().failing_on("INFO memory");
    assert!(matches!(
        fetch_used_memory(&conn).await.unwrap_err(),
        AnalysisError::Rpc { .. }
    ));
}

// ============================================================================
// analyze_cluster
// ============================================================================

const CLUSTER: &str = "\
aaa 10.0.0.1:7000@17000 myself,master - 0 0 1 connected 0-100
bbb 10.0.0.2:7001@17001 master - 0 1700000000000 2 connected 101-200
ccc 10.0.0.3:7002@17002 slave aaa 0 1700000000001 1 connected
ddd 10.0.0.4:7003@17003 master - 0 1700000000002 3 connected
eee 10.0.0.5:7004@17004 master - 0 1700000000003 4 connected 201-300
";

#[tokio::test]
async fn test_analyze_cluster_reports_each_master_in_order() {
    let topology = Topology::parse(CLUSTER).unwrap();
    let aaa = MockNode::new()
        .with_slot_count(7, 3)
        .with_keyspace("db0:keys=3,expires=0,avg_ttl=0\r\n");
    let bbb = MockNode::new()
        .with_slot_count(150, 11)
        .with_slot_count(151, 11)
        .with_keyspace("db0:keys=22,expires=1,avg_ttl=0\r\n")
        .with_memory("used_memory:2097152\r\n");
    let ddd = MockNode::new();
    let connector = MockConnector::new()
        .with_node("10.0.0.1:7000", aaa.clone())
        .with_node("10.0.0.2:7001", bbb.clone())
        .with_node("10.0.0.4:7003", ddd.clone());

    let reports = analyze_cluster(&topology, &AnalyzeOptions::new(2), &connector).await;

    let ids: Vec<&str> = reports.iter().map(|r| r.node.id.as_str()).collect();
    assert_eq!(ids, vec!["aaa", "bbb", "eee"]);
    assert_eq!(
        connector.connects(),
        vec!["10.0.0.1:7000", "10.0.0.2:7001", "10.0.0.5:7004"]
    );

    let first = reports[0].stats.as_ref().unwrap();
    assert_eq!(first.key_count, 3);
    assert_eq!(first.top(1), &[SlotKeyCount::new(7, 3)]);
    assert_eq!(reports[0].used_memory.as_deref(), Some("1048576"));
    assert_eq!(aaa.count_calls("INFO memory"), 1);

    let second = reports[1].stats.as_ref().unwrap();
    assert_eq!(second.slot_key_total, 22);
    assert_eq!(
        second.top(2),
        &[SlotKeyCount::new(150, 11), SlotKeyCount::new(151, 11)]
    );
    assert_eq!(reports[1].used_memory.as_deref(), Some("2097152"));

    assert_eq!(aaa.calls().last().map(String::as_str), Some("QUIT"));
    assert_eq!(bbb.count_calls("QUIT"), 1);
    assert!(ddd.calls().is_empty());
}

#[tokio::test]
async fn test_analyze_cluster_skips_masters_without_slots() {
    let topology = Topology::parse(CLUSTER).unwrap();
    let ddd = MockNode::new();
    let connector = MockConnector::new().with_node("10.0.0.4:7003", ddd.clone());

    let reports = analyze_cluster(&topology, &AnalyzeOptions::new(0), &connector).await;

    assert!(reports.iter().all(|r| r.node.id != "ddd"));
    assert!(!connector.connects().iter().any(|e| e == "10.0.0.4:7003"));
    assert!(ddd.calls().is_empty());
}

/// A master that failed and gave up its slots is unreachable. It must not
/// turn the run into a failure.
#[tokio::test]
async fn test_analyze_cluster_ignores_failed_slotless_master() {
    let topology = Topology::parse(
        "\
aaa 10.0.0.1:7000@17000 myself,master - 0 0 1 connected 0-10
old 10.0.0.9:7000@17000 master,fail - 1700000000000 0 2 disconnected",
    )
    .unwrap();
    let connector = MockConnector::new().with_node("10.0.0.1:7000", MockNode::new());

    let reports = analyze_cluster(&topology, &AnalyzeOptions::new(0), &connector).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].node.id, "aaa");
    assert!(reports[0].stats.is_ok());
    assert_eq!(connector.connects(), vec!["10.0.0.1:7000"]);
}

/// One unreachable shard is reported and the rest are still analyzed.
#[tokio::test]
async fn test_analyze_cluster_keeps_going_after_failure() {
    let topology = Topology::parse(CLUSTER).unwrap();
    let connector = MockConnector::new()
        .with_node("10.0.0.2:7001", MockNode::new())
        .with_node("10.0.0.5:7004", MockNode::new());

    let reports = analyze_cluster(&topology, &AnalyzeOptions::new(0), &connector).await;

    let ids: Vec<&str> = reports.iter().map(|r| r.node.id.as_str()).collect();
    assert_eq!(ids, vec!["aaa", "bbb", "eee"]);
    assert!(matches!(
        reports[0].stats,
        Err(AnalysisError::Rpc { ref operation, .. }) if operation == "connect 10.0.0.1:7000"
    ));
    assert!(reports[0].used_memory.is_none());
    assert!(reports[1].stats.is_ok());
    assert!(reports[2].stats.is_ok());
}

/// A shard whose walk fails still has its connection closed.
#[tokio::test]
async fn test_analyze_cluster_closes_connection_after_shard_error() {
    let topology = Topology::parse(CLUSTER).unwrap();
    let aaa = MockNode::new().failing_on("CLUSTER COUNTKEYSINSLOT");
    let connector = MockConnector::new().with_node("10.0.0.1:7000", aaa.clone());

    let reports = analyze_cluster(&topology, &AnalyzeOptions::new(0), &connector).await;

    assert!(matches!(
        reports[0].stats,
        Err(AnalysisError::Rpc { ref operation, .. }) if operation == "CLUSTER COUNTKEYSINSLOT 0"
    ));
    assert_eq!(aaa.count_calls("QUIT"), 1);
    assert_eq!(aaa.count_calls("INFO memory"), 0);
}
