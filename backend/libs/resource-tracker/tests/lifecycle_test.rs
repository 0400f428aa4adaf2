//! Integration tests for resource lifecycle and cleanup
//!
//! These tests verify:
//! 1. WebSocket connections are reclaimed only by a consistent close
//! 2. Cross-user and cross-thread closes leak without tearing anything down
//! 3. Client teardown failures are marked leaked and reaped later
//! 4. Records rejected over their ids are flagged and force-reclaimable
//! 5. Failed connects leave nothing behind
//! 6. The sweeper reaps leaked records in the background and stops on drop

use async_trait::async_trait;
use id_correlation::{extract_service, extract_user, IdGenerator};
use resource_tracker::{
    CleanupCoordinator, CleanupOutcome, ClientConnector, ClientFactory, LeakReason,
    ResourceKind, ResourceRegistry, ResourceState, ServiceType, StaleSweeper, TrackerConfig,
    TrackerError, WebSocketConnectionFactory,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// In-memory connector with switchable failures
#[derive(Default)]
struct MockConnector {
    fail_connect: AtomicBool,
    fail_disconnect: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

#[async_trait]
impl ClientConnector for MockConnector {
    type Client = String;

    fn service_type(&self) -> ServiceType {
        ServiceType::Redis
    }

    async fn connect(&self, client_id: &str) -> anyhow::Result<String> {
        if self.fail_connect.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(format!("conn:{}", client_id))
    }

    async fn disconnect(&self, _client_id: &str, _client: String) -> anyhow::Result<()> {
        if self.fail_disconnect.load(Ordering::SeqCst) {
            anyhow::bail!("socket already closed");
        }
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    generator: Arc<IdGenerator>,
    registry: ResourceRegistry,
    coordinator: CleanupCoordinator,
}

fn harness() -> Harness {
    // leak warnings go to the test output; later calls find it installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();

    let registry = ResourceRegistry::new();
    let coordinator = CleanupCoordinator::new(
        registry.clone(),
        &TrackerConfig::for_component("lifecycle-test"),
    );
    Harness {
        generator: Arc::new(IdGenerator::new()),
        registry,
        coordinator,
    }
}

// ==================== WebSocket Tests ====================

#[tokio::test]
async fn test_websocket_open_broadcast_close() {
    let h = harness();
    let factory = WebSocketConnectionFactory::new(h.generator.clone(), h.coordinator.clone());
    let thread_id = h.generator.generate_thread_id();

    let mut first = factory.open("alice", &thread_id).await.unwrap();
    let mut second = factory.open("alice", &thread_id).await.unwrap();
    assert_eq!(h.registry.count_in_state(ResourceState::Active), 2);

    assert_eq!(factory.broadcast(&thread_id, "run started").await, 2);
    assert_eq!(first.receiver.recv().await.as_deref(), Some("run started"));
    assert_eq!(second.receiver.recv().await.as_deref(), Some("run started"));

    let outcome = factory
        .close("alice", &thread_id, &first.connection_id)
        .await;
    assert!(outcome.is_reclaimed());
    assert_eq!(h.registry.len(), 1);
    assert_eq!(factory.connection_count(&thread_id).await, 1);

    // the closed connection's sender is gone
    assert_eq!(first.receiver.recv().await, None);
}

#[tokio::test]
async fn test_cross_user_close_leaks_and_keeps_connection() {
    let h = harness();
    let factory = WebSocketConnectionFactory::new(h.generator.clone(), h.coordinator.clone());
    let thread_id = h.generator.generate_thread_id();
    let alice = factory.open("alice", &thread_id).await.unwrap();

    let outcome = factory.close("bob", &thread_id, &alice.connection_id).await;
    let event = outcome.leak().expect("cross-user close must leak");
    assert_eq!(
        event.reason,
        LeakReason::UserMismatch {
            owner: Some("alice".to_string())
        }
    );

    let record = h.registry.get(&alice.connection_id).unwrap();
    assert_eq!(record.state, ResourceState::Active);
    assert_eq!(factory.connection_count(&thread_id).await, 1);
}

#[tokio::test]
async fn test_close_with_wrong_thread_leaks() {
    let h = harness();
    let factory = WebSocketConnectionFactory::new(h.generator.clone(), h.coordinator.clone());
    let alice_thread = h.generator.generate_thread_id();
    let bob_thread = h.generator.generate_thread_id();
    let alice = factory.open("alice", &alice_thread).await.unwrap();
    let _bob = factory.open("bob", &bob_thread).await.unwrap();

    let outcome = factory
        .close("alice", &bob_thread, &alice.connection_id)
        .await;
    assert!(matches!(
        outcome.leak().map(|e| &e.reason),
        Some(LeakReason::InconsistentIds(_))
    ));
    assert_eq!(h.registry.len(), 2);
    assert_eq!(h.registry.count_in_state(ResourceState::Active), 2);
    assert_eq!(h.coordinator.leak_history().len(), 1);

    // flagged, so manual cleanup can take it without the right thread
    let leaked = h.registry.leaked();
    assert_eq!(leaked.len(), 1);
    assert_eq!(leaked[0].resource_id, alice.connection_id);

    let record = h.coordinator.force_reclaim(&alice.connection_id).unwrap();
    assert_eq!(record.state, ResourceState::Reclaimed);
    assert_eq!(h.registry.len(), 1);
    assert!(!h.registry.contains(&alice.connection_id));
}

#[tokio::test]
async fn test_registries_do_not_share_resources() {
    let a = harness();
    let b = harness();
    let factory_a = WebSocketConnectionFactory::new(a.generator.clone(), a.coordinator.clone());
    let factory_b = WebSocketConnectionFactory::new(b.generator.clone(), b.coordinator.clone());

    let thread_id = a.generator.generate_thread_id();
    let handle = factory_a.open("alice", &thread_id).await.unwrap();

    // the other registry never saw this connection
    let outcome = factory_b
        .close("alice", &thread_id, &handle.connection_id)
        .await;
    assert_eq!(
        outcome.leak().map(|e| e.reason.clone()),
        Some(LeakReason::NotRegistered)
    );
    assert_eq!(a.registry.len(), 1);
    assert!(b.registry.is_empty());
}

// ==================== Client Factory Tests ====================

#[tokio::test]
async fn test_client_acquire_and_release() {
    let h = harness();
    let factory = ClientFactory::new(
        MockConnector::default(),
        h.generator.clone(),
        h.coordinator.clone(),
    );
    let request_id = h.generator.generate_request_id(None).unwrap();

    let lease = factory.acquire("u1", &request_id).await.unwrap();
    assert_eq!(extract_service(&lease.client_id).as_deref(), Some("redis"));
    assert_eq!(extract_user(&lease.client_id).as_deref(), Some("u1"));
    assert_eq!(lease.client, format!("conn:{}", lease.client_id));

    let record = h.registry.get(&lease.client_id).unwrap();
    assert_eq!(record.state, ResourceState::Active);
    assert_eq!(record.kind, ResourceKind::DatabaseClient(ServiceType::Redis));

    let outcome = factory.release(&request_id, &lease.client_id).await;
    assert!(outcome.is_reclaimed());
    assert!(h.registry.is_empty());
    assert_eq!(factory.live_clients().await, 0);
    assert_eq!(factory.connector().disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_teardown_failure_is_leaked_then_reaped() {
    let h = harness();
    let factory = ClientFactory::new(
        MockConnector::default(),
        h.generator.clone(),
        h.coordinator.clone(),
    );
    let request_id = h.generator.generate_request_id(None).unwrap();
    let lease = factory.acquire("u1", &request_id).await.unwrap();

    factory
        .connector()
        .fail_disconnect
        .store(true, Ordering::SeqCst);
    let outcome = factory.release(&request_id, &lease.client_id).await;

    match outcome {
        CleanupOutcome::Leaked(event) => {
            assert_eq!(event.reason.label(), "teardown_failed");
        }
        CleanupOutcome::Reclaimed(_) => panic!("failed teardown must not reclaim"),
    }
    assert_eq!(h.registry.leaked().len(), 1);

    let reaped = h.coordinator.reap_aged(Duration::ZERO);
    assert_eq!(reaped.len(), 1);
    assert!(h.registry.is_empty());
}

#[tokio::test]
async fn test_client_release_with_foreign_request_leaks() {
    let h = harness();
    let factory = ClientFactory::new(
        MockConnector::default(),
        h.generator.clone(),
        h.coordinator.clone(),
    );
    let request_a = h.generator.generate_request_id(None).unwrap();
    let request_b = h.generator.generate_request_id(None).unwrap();
    let lease = factory.acquire("u1", &request_a).await.unwrap();

    let outcome = factory.release(&request_b, &lease.client_id).await;
    assert!(!outcome.is_reclaimed());
    assert_eq!(factory.live_clients().await, 1);
    assert_eq!(factory.connector().disconnects.load(Ordering::SeqCst), 0);
    let record = h.registry.get(&lease.client_id).unwrap();
    assert_eq!(record.state, ResourceState::Active);
    assert!(record.is_flagged());
}

#[tokio::test]
async fn test_service_mismatch_leaks() {
    let h = harness();
    let redis = ClientFactory::new(
        MockConnector::default(),
        h.generator.clone(),
        h.coordinator.clone(),
    );
    let request_id = h.generator.generate_request_id(None).unwrap();

    // a clickhouse client registered in the same registry
    let clickhouse_id = h
        .generator
        .generate_client_id("clickhouse", "u1", &request_id)
        .unwrap();
    h.registry
        .register(resource_tracker::ResourceRecord::new(
            &clickhouse_id,
            &request_id,
            ResourceKind::DatabaseClient(ServiceType::ClickHouse),
        ))
        .unwrap();

    let outcome = redis.release(&request_id, &clickhouse_id).await;
    assert_eq!(
        outcome.leak().map(|e| e.reason.clone()),
        Some(LeakReason::ServiceMismatch {
            found: Some("clickhouse".to_string())
        })
    );
    assert_eq!(
        h.registry.get(&clickhouse_id).unwrap().state,
        ResourceState::Minted
    );
}

#[tokio::test]
async fn test_connect_failure_leaves_registry_clean() {
    let h = harness();
    let connector = MockConnector::default();
    connector.fail_connect.store(true, Ordering::SeqCst);
    let factory = ClientFactory::new(connector, h.generator.clone(), h.coordinator.clone());
    let request_id = h.generator.generate_request_id(None).unwrap();

    let err = factory.acquire("u1", &request_id).await.unwrap_err();
    assert!(matches!(err, TrackerError::Connect { .. }));
    assert!(h.registry.is_empty());
    assert_eq!(factory.live_clients().await, 0);
}

// ==================== Sweeper Tests ====================

#[tokio::test]
async fn test_sweeper_reaps_leaked_records() {
    let h = harness();
    let factory = ClientFactory::new(
        MockConnector::default(),
        h.generator.clone(),
        h.coordinator.clone(),
    );
    let request_id = h.generator.generate_request_id(None).unwrap();
    let lease = factory.acquire("u1", &request_id).await.unwrap();
    factory
        .connector()
        .fail_disconnect
        .store(true, Ordering::SeqCst);
    factory.release(&request_id, &lease.client_id).await;
    assert_eq!(h.registry.leaked().len(), 1);

    let sweeper = StaleSweeper::spawn(
        h.coordinator.clone(),
        Duration::from_millis(10),
        Duration::ZERO,
    );
    assert!(sweeper.is_running());

    for _ in 0..100 {
        if h.registry.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.registry.is_empty());
    drop(sweeper);
}

#[tokio::test]
async fn test_sweeper_leaves_healthy_resources() {
    let h = harness();
    let factory = WebSocketConnectionFactory::new(h.generator.clone(), h.coordinator.clone());
    let thread_id = h.generator.generate_thread_id();
    let _handle = factory.open("alice", &thread_id).await.unwrap();

    let _sweeper = StaleSweeper::spawn(
        h.coordinator.clone(),
        Duration::from_millis(5),
        Duration::ZERO,
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.registry.count_in_state(ResourceState::Active), 1);
}

#[tokio::test]
async fn test_sweeper_stops_on_drop() {
    let h = harness();
    let sweeper = StaleSweeper::spawn(
        h.coordinator.clone(),
        Duration::from_millis(5),
        Duration::ZERO,
    );
    assert!(sweeper.is_running());
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(sweeper);

    let factory = ClientFactory::new(
        MockConnector::default(),
        h.generator.clone(),
        h.coordinator.clone(),
    );
    let request_id = h.generator.generate_request_id(None).unwrap();
    let lease = factory.acquire("u1", &request_id).await.unwrap();
    factory
        .connector()
        .fail_disconnect
        .store(true, Ordering::SeqCst);
    factory.release(&request_id, &lease.client_id).await;

    // many intervals later the leaked record is still there
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.registry.leaked().len(), 1);
    assert!(h.registry.contains(&lease.client_id));
}
