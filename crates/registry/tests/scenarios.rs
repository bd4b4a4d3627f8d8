//! End-to-end registry scenarios.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use relay_registry::{
    FileNodeStore, GeoInfo, NodeDescriptor, NodeId, NodeStore, NodeType, OwnerId,
    PersistenceConfig, RelayRegistry, RequestOutcome, SelectionQuery, StaticGeoLookup,
    spawn_persistence,
};

fn geo(country: &str, asn: Option<u32>) -> GeoInfo {
    let mut geo = GeoInfo::unknown();
    geo.country_code = country.to_string();
    geo.country_name = country.to_string();
    geo.asn = asn;
    geo
}

fn lookup() -> StaticGeoLookup {
    StaticGeoLookup::new()
        .with_entry("us.relay.example", geo("US", Some(701)))
        .with_entry("de.relay.example", geo("DE", Some(3320)))
        .with_entry("jp.relay.example", geo("JP", Some(2516)))
}

fn registry() -> RelayRegistry {
    RelayRegistry::with_defaults(Arc::new(lookup()))
}

fn descriptor(id: &str, host: &str, bandwidth: f64, node_type: NodeType) -> NodeDescriptor {
    NodeDescriptor::new("owner", host, 443, node_type)
        .with_id(id)
        .with_bandwidth(bandwidth)
        .with_uptime(100.0)
}

fn ids(nodes: &[relay_registry::Node]) -> Vec<&str> {
    nodes.iter().map(|n| n.id.as_str()).collect()
}

#[test]
fn scenario_a_all_successful() {
    let registry = registry();
    let id = registry
        .register(descriptor("a", "us.relay.example", 50.0, NodeType::Residential))
        .id;

    for _ in 0..10 {
        registry.record_request(&id, &RequestOutcome::success(80, 100_000));
    }

    let node = registry.get(&id).unwrap();
    assert_eq!(node.total_requests, 10);
    assert_eq!(node.successful_requests, 10);
    assert_eq!(node.failed_requests, 0);
    assert_eq!(node.success_rate, 1.0);
    assert_eq!(node.latency.p50, 80);
    assert_eq!(node.latency.p90, 80);
    assert_eq!(node.latency.p99, 80);
    assert_eq!(node.score, 99.0);
}

#[test]
fn scenario_b_one_failure() {
    let registry = registry();
    let id = registry
        .register(descriptor("b", "us.relay.example", 50.0, NodeType::Residential))
        .id;

    for _ in 0..10 {
        registry.record_request(&id, &RequestOutcome::success(80, 100_000));
    }
    registry.record_request(&id, &RequestOutcome::failure(80, "connection reset"));

    let node = registry.get(&id).unwrap();
    assert_eq!(node.consecutive_failures, 1);
    assert_eq!(node.total_requests, 11);
    assert!((node.success_rate - 10.0 / 11.0).abs() < 1e-12);
    // 36.36 from the success-rate term, the other terms unchanged.
    assert_eq!(node.score, 95.36);
}

#[test]
fn scenario_c_diverse_countries() {
    let registry = registry();
    // Scores: us1 62, us2 59, de1 58, us3 55, de2 54, us4 51.
    registry.register(descriptor("us1", "us.relay.example", 100.0, NodeType::Residential));
    registry.register(descriptor("us2", "us.relay.example", 50.0, NodeType::Residential));
    registry.register(descriptor("us3", "us.relay.example", 20.0, NodeType::Residential));
    registry.register(descriptor("us4", "us.relay.example", 5.0, NodeType::Residential));
    registry.register(descriptor("de1", "de.relay.example", 50.0, NodeType::Mobile));
    registry.register(descriptor("de2", "de.relay.example", 20.0, NodeType::Mobile));

    let query = SelectionQuery {
        count: 4,
        diverse_countries: true,
        ..Default::default()
    };
    let selected = registry.select(&query);

    // Top two regardless of country, then only unseen countries. Two
    // countries cannot fill four slots.
    assert_eq!(ids(&selected), ["us1", "us2", "de1"]);

    registry.register(descriptor("jp1", "jp.relay.example", 5.0, NodeType::Isp));
    let selected = registry.select(&query);
    assert_eq!(ids(&selected), ["us1", "us2", "de1", "jp1"]);

    let summaries = registry.select_summaries(&query);
    assert_eq!(summaries.len(), 4);
    assert_eq!(summaries[3].country_code, "JP");
}

#[test]
fn scenario_d_empty_stats() {
    let registry = registry();
    let stats = registry.recompute_stats();
    assert_eq!(stats.online_nodes, 0);
    assert_eq!(stats.average_latency_ms, 0.0);
    assert_eq!(stats.average_success_rate, 0.0);

    let id = registry
        .register(descriptor("off", "us.relay.example", 50.0, NodeType::Residential))
        .id;
    registry.heartbeat(&id, false);

    let stats = registry.recompute_stats();
    assert_eq!(stats.total_nodes, 1);
    assert_eq!(stats.online_nodes, 0);
    assert_eq!(stats.average_latency_ms, 0.0);
    assert_eq!(stats.average_success_rate, 0.0);
}

#[test]
fn scenario_e_concurrent_requests() {
    let registry = Arc::new(registry());
    let id = registry
        .register(descriptor("e", "us.relay.example", 50.0, NodeType::Residential))
        .id;

    const THREADS: usize = 16;
    const CALLS: usize = 500;

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            thread::spawn(move || {
                for i in 0..CALLS {
                    let outcome = if (t + i) % 5 == 0 {
                        RequestOutcome::failure(400, "timeout")
                    } else {
                        RequestOutcome::success(60, 1_000)
                    };
                    registry.record_request(&id, &outcome);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let node = registry.get(&id).unwrap();
    assert_eq!(node.total_requests, (THREADS * CALLS) as u64);
    assert_eq!(
        node.total_requests,
        node.successful_requests + node.failed_requests
    );
    assert_eq!(node.failed_requests, (THREADS * CALLS / 5) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_e_concurrent_tasks() {
    let registry = Arc::new(registry());
    let id = registry
        .register(descriptor("e", "us.relay.example", 50.0, NodeType::Residential))
        .id;

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    registry.record_request(&id, &RequestOutcome::success(90, 10));
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(registry.get(&id).unwrap().total_requests, 3_200);
}

#[test]
fn index_tracks_register_and_unregister() {
    let registry = registry();
    for i in 0..20 {
        let host = if i % 2 == 0 {
            "us.relay.example"
        } else {
            "de.relay.example"
        };
        registry.register(descriptor(&format!("n{i}"), host, 50.0, NodeType::Residential));
    }
    assert!(registry.indices_consistent());

    for i in (0..20).step_by(3) {
        assert!(registry.unregister(&NodeId::from(format!("n{i}"))));
    }
    assert!(registry.indices_consistent());

    let remaining: HashSet<NodeId> = registry.node_ids().into_iter().collect();
    let via_country: HashSet<NodeId> = registry
        .by_country("US")
        .into_iter()
        .chain(registry.by_country("DE"))
        .map(|n| n.id)
        .collect();
    assert_eq!(remaining, via_country);
    assert_eq!(registry.by_owner(&OwnerId::from("owner")).len(), remaining.len());
}

#[test]
fn diverse_selection_never_duplicates() {
    let registry = registry();
    for i in 0..30 {
        let host = match i % 3 {
            0 => "us.relay.example",
            1 => "de.relay.example",
            _ => "jp.relay.example",
        };
        registry.register(descriptor(&format!("n{i}"), host, f64::from(i * 5), NodeType::Mobile));
    }

    let query = SelectionQuery {
        count: 12,
        diverse_asns: true,
        diverse_countries: true,
        ..Default::default()
    };
    let selected = registry.select(&query);
    let unique: HashSet<_> = selected.iter().map(|n| n.id.clone()).collect();
    assert_eq!(unique.len(), selected.len());
    assert!(selected.len() <= 12);
}

#[tokio::test]
async fn persisted_registry_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nodes.json");

    let original = Arc::new(registry());
    let store = Arc::new(FileNodeStore::new(&path).unwrap());
    let handle = spawn_persistence(
        Arc::clone(&original),
        Arc::clone(&store),
        PersistenceConfig::default(),
    );

    let id = original
        .register(descriptor("p1", "us.relay.example", 50.0, NodeType::Residential))
        .id;
    original.register(descriptor("p2", "de.relay.example", 20.0, NodeType::Datacenter));
    for _ in 0..5 {
        original.record_request(&id, &RequestOutcome::success(120, 4_096));
    }
    tokio::task::yield_now().await;
    handle.shutdown().await;
    assert!(path.exists());

    let reloaded = registry();
    let store = FileNodeStore::new(&path).unwrap();
    assert_eq!(store.count().unwrap(), 2);
    assert_eq!(reloaded.load_from_store(&store).unwrap(), 2);

    assert!(reloaded.indices_consistent());
    assert_eq!(reloaded.node_ids(), original.node_ids());

    let before = original.get(&id).unwrap();
    let after = reloaded.get(&id).unwrap();
    assert_eq!(after.total_requests, 5);
    assert_eq!(after.latency_window, before.latency_window);
    assert_eq!(after.score, before.score);
}
