// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for valkey-cluster-admin.
//!
//! These tests run without a Valkey server and exercise the public API of
//! individual components.

mod topology_tests {
    use valkey_cluster_admin::cluster::{LinkState, ParseError, Topology};
    use valkey_cluster_admin::slots::{SlotRange, SlotTransition};

    const THREE_SHARDS: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002 master - 0 1426238316232 2 connected 5461-10922
292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 127.0.0.1:30003@31003 master - 0 1426238318243 3 connected 10923-16383
6ec23923021cf3ffec47632106199cb7f496ce01 127.0.0.1:30005@31005 slave 67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 0 1426238316232 5 connected
824fe116063bc5fcf9f4ffd895bc17aee7731ac3 127.0.0.1:30006@31006 slave 292f8b365bb7edb5e285caf0b7e6ddc7265d2f4f 0 1426238317741 6 connected
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001@31001 myself,master - 0 0 1 connected 0-5460
";

    #[test]
    fn test_parse_three_shard_cluster() {
        let topology = Topology::parse(THREE_SHARDS).unwrap();

        assert_eq!(topology.nodes.len(), 6);
        assert_eq!(topology.masters().len(), 3);
        assert_eq!(topology.replicas().len(), 3);

        let myself = topology.myself().unwrap();
        assert_eq!(myself.port, 30001);
        assert_eq!(myself.cluster_bus_port, Some(31001));
        assert_eq!(myself.slots, vec![SlotRange::new(0, 5460)]);

        let replicas = topology.replicas_of(&myself.id);
        assert_eq!(replicas.len(), 1);
        assert_eq!(replicas[0].port, 30004);
    }

    #[test]
    fn test_nodes_keep_source_order() {
        let topology = Topology::parse(THREE_SHARDS).unwrap();
        let ports: Vec<u16> = topology.nodes.iter().map(|n| n.port).collect();
        assert_eq!(ports, vec![30004, 30002, 30003, 30005, 30006, 30001]);
    }

    #[test]
    fn test_master_of_replica() {
        let topology = Topology::parse(THREE_SHARDS).unwrap();
        let replica = &topology.nodes[3];
        assert_eq!(topology.master_of(replica).port, 30002);
    }

    #[test]
    fn test_migrating_slots() {
        let raw = "aaa 10.0.0.1:7000 myself,master - 0 0 1 connected 0-99 [100->-bbb] [101-<-ccc]";
        let topology = Topology::parse(raw).unwrap();
        let slots = &topology.nodes[0].slots;

        assert_eq!(slots.len(), 3);
        assert_eq!(slots[1], SlotRange::marker(100, SlotTransition::Migrating, "bbb"));
        assert_eq!(slots[2].migrating_to.as_deref(), Some("ccc"));
        assert_eq!(slots[2].end, 0);
    }

    #[test]
    fn test_disconnected_failed_node() {
        let raw = "aaa 10.0.0.1:7000 master,fail - 1700000000000 0 1 disconnected";
        let topology = Topology::parse(raw).unwrap();
        let node = &topology.nodes[0];

        assert_eq!(node.link_state, LinkState::Disconnected);
        assert!(node.node_flags.fail);
        assert!(!node.node_flags.pfail);
        assert_eq!(node.ping_sent, 1700000000000);
        assert!(node.slots.is_empty());
    }

    #[test]
    fn test_whole_topology_fails_on_one_bad_line() {
        let raw = "\
aaa 10.0.0.1:7000 master - 0 0 1 connected 0-8191
bbb 10.0.0.2:7001 master - 0 0 2 connected 8192-16383x";

        match Topology::parse(raw).unwrap_err() {
            ParseError::InvalidField { line, field, .. } => {
                assert_eq!(line, 2);
                assert_eq!(field, "slots");
            }
            other => panic!("expected InvalidField, got {other:?}"),
        }
    }

    #[test]
    fn test_topology_serializes_to_json() {
        let topology = Topology::parse(THREE_SHARDS).unwrap();
        let json = serde_json::to_value(&topology).unwrap();

        let first = &json["nodes"][0];
        assert_eq!(first["port"], 30004);
        assert_eq!(first["link_state"], "connected");
        assert!(first.get("node_flags").is_none());
    }
}

mod error_tests {
    use valkey_cluster_admin::cluster::ParseError;
    use valkey_cluster_admin::precondition::PreconditionError;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::MissingField {
            line: 3,
            field: "link_state",
        };
        assert_eq!(err.to_string(), "line 3: missing required field `link_state`");

        let err = ParseError::InvalidSlotToken {
            token: "x".to_string(),
            reason: "expected <start>-<end>".to_string(),
        };
        assert!(err.to_string().contains("\"x\""));
    }

    #[test]
    fn test_precondition_error_display() {
        let err = PreconditionError::NotEmpty {
            db_info: "db0:keys=1,expires=0,avg_ttl=0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("node is not empty"));
        assert!(msg.ends_with("db0:keys=1,expires=0,avg_ttl=0"));
    }
}

mod keyspace_tests {
    use valkey_cluster_admin::client::{DbKeyspace, KeyspaceInfo};

    #[test]
    fn test_keyspace_with_several_databases() {
        let raw = "# Keyspace\r\ndb0:keys=10,expires=2,avg_ttl=3000\r\ndb15:keys=1,expires=0,avg_ttl=0\r\n";
        let info = KeyspaceInfo::parse(raw).unwrap();

        assert_eq!(
            info.databases[0],
            DbKeyspace {
                db: 0,
                keys: 10,
                expires: 2,
                avg_ttl: Some(3000),
            }
        );
        assert_eq!(info.databases[1].db, 15);
        assert_eq!(info.total_keys(), Some(11));
        assert_eq!(info.total_expires(), Some(2));
    }

    #[test]
    fn test_empty_keyspace() {
        let info = KeyspaceInfo::parse("# Keyspace\r\n").unwrap();
        assert!(info.databases.is_empty());
        assert_eq!(info.total_keys(), Some(0));
    }
}

mod config_tests {
    use std::time::Duration;

    use valkey_cluster_admin::client::{ClientConfig, DEFAULT_ENDPOINT};

    #[test]
    fn test_default_endpoint_parses() {
        let config = ClientConfig::from_endpoint(DEFAULT_ENDPOINT).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6379);
    }

    #[test]
    fn test_ipv6_endpoint_splits_on_last_colon() {
        let config = ClientConfig::from_endpoint("::1:7000").unwrap();
        assert_eq!(config.host, "::1");
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn test_builder_chain() {
        let config = ClientConfig::from_endpoint("10.0.0.1:7000")
            .unwrap()
            .with_password(None)
            .with_tls(true)
            .with_command_timeout(Duration::from_secs(2));
        assert!(config.tls);
        assert_eq!(config.command_timeout, Duration::from_secs(2));
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
    }
}
