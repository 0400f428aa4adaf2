use crate::cleanup::{CleanupCoordinator, CleanupOutcome, CleanupRequest};
use crate::error::TrackerResult;
use crate::record::{ResourceKind, ResourceRecord};
use id_correlation::IdGenerator;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};

/// Sender side of one open connection
struct Slot {
    connection_id: String,
    user_id: String,
    sender: UnboundedSender<String>,
}

/// Receiving end handed to the socket task
#[derive(Debug)]
pub struct WebSocketHandle {
    pub connection_id: String,
    pub thread_id: String,
    pub user_id: String,
    pub receiver: UnboundedReceiver<String>,
}

/// Opens WebSocket connections whose ids are derived from the thread they serve
///
/// Every connection is registered with the shared registry on open and only
/// leaves it through the cleanup coordinator, so a close issued with the
/// wrong thread or user leaves the connection in place.
#[derive(Clone)]
pub struct WebSocketConnectionFactory {
    generator: Arc<IdGenerator>,
    coordinator: CleanupCoordinator,
    // thread_id -> open connections
    slots: Arc<RwLock<HashMap<String, Vec<Slot>>>>,
}

impl WebSocketConnectionFactory {
    pub fn new(generator: Arc<IdGenerator>, coordinator: CleanupCoordinator) -> Self {
        Self {
            generator,
            coordinator,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn coordinator(&self) -> &CleanupCoordinator {
        &self.coordinator
    }

    /// Mint, register and activate a connection for `user_id` on `thread_id`
    pub async fn open(&self, user_id: &str, thread_id: &str) -> TrackerResult<WebSocketHandle> {
        let connection_id = self.generator.generate_connection_id(Some(thread_id))?;

        let registry = self.coordinator.registry();
        registry.register(
            ResourceRecord::new(&connection_id, thread_id, ResourceKind::WebSocketConnection)
                .with_user(user_id),
        )?;
        registry.activate(&connection_id)?;

        let (tx, rx) = unbounded_channel();
        let mut guard = self.slots.write().await;
        let slots = guard.entry(thread_id.to_string()).or_default();
        slots.push(Slot {
            connection_id: connection_id.clone(),
            user_id: user_id.to_string(),
            sender: tx,
        });

        tracing::debug!(
            connection_id = %connection_id,
            thread_id = %thread_id,
            user_id = %user_id,
            total = slots.len(),
            "opened websocket connection"
        );

        Ok(WebSocketHandle {
            connection_id,
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
            receiver: rx,
        })
    }

    /// Deliver `msg` to every connection on `thread_id`
    ///
    /// Connections whose receiver is gone lose their slot and are cleaned up;
    /// a cleanup that leaks leaves the record for aged cleanup. Returns the
    /// number of connections the message reached.
    pub async fn broadcast(&self, thread_id: &str, msg: &str) -> usize {
        let (delivered, dead) = {
            let mut guard = self.slots.write().await;
            let Some(slots) = guard.get_mut(thread_id) else {
                return 0;
            };

            let (live, dead): (Vec<Slot>, Vec<Slot>) = slots
                .drain(..)
                .partition(|slot| slot.sender.send(msg.to_string()).is_ok());
            *slots = live;
            let delivered = slots.len();
            if slots.is_empty() {
                guard.remove(thread_id);
            }
            (delivered, dead)
        };

        if !dead.is_empty() {
            tracing::debug!(
                thread_id = %thread_id,
                dead = dead.len(),
                active = delivered,
                "broadcast found dead senders"
            );
        }
        for slot in dead {
            let request =
                CleanupRequest::new(thread_id, &slot.connection_id).with_user(&slot.user_id);
            match self.coordinator.cleanup(&request) {
                CleanupOutcome::Reclaimed(_) => tracing::debug!(
                    connection_id = %slot.connection_id,
                    thread_id = %thread_id,
                    "reclaimed dead connection"
                ),
                CleanupOutcome::Leaked(event) => tracing::debug!(
                    connection_id = %slot.connection_id,
                    thread_id = %thread_id,
                    reason = %event.reason,
                    "dead connection left for aged cleanup"
                ),
            }
        }

        delivered
    }

    /// Close a connection through the cleanup coordinator
    ///
    /// On a leak the sender slot is kept: the connection stays reachable
    /// until a consistent close or aged cleanup.
    pub async fn close(&self, user_id: &str, thread_id: &str, connection_id: &str) -> CleanupOutcome {
        let request = CleanupRequest::new(thread_id, connection_id).with_user(user_id);
        let outcome = self.coordinator.cleanup(&request);

        if outcome.is_reclaimed() {
            let mut guard = self.slots.write().await;
            if let Some(slots) = guard.get_mut(thread_id) {
                slots.retain(|slot| slot.connection_id != connection_id);
                if slots.is_empty() {
                    guard.remove(thread_id);
                }
            }
            tracing::debug!(
                connection_id = %connection_id,
                thread_id = %thread_id,
                "closed websocket connection"
            );
        }

        outcome
    }

    pub async fn connection_count(&self, thread_id: &str) -> usize {
        self.slots
            .read()
            .await
            .get(thread_id)
            .map(|slots| slots.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::registry::ResourceRegistry;

    fn factory() -> WebSocketConnectionFactory {
        let coordinator =
            CleanupCoordinator::new(ResourceRegistry::new(), &TrackerConfig::default());
        WebSocketConnectionFactory::new(Arc::new(IdGenerator::new()), coordinator)
    }

    #[tokio::test]
    async fn test_open_registers_active_connection() {
        let factory = factory();
        let handle = factory.open("alice", "thread_0_1_abcdef12").await.unwrap();

        let record = factory
            .coordinator()
            .registry()
            .get(&handle.connection_id)
            .unwrap();
        assert_eq!(record.parent_id, "thread_0_1_abcdef12");
        assert_eq!(record.user_id.as_deref(), Some("alice"));
        assert_eq!(factory.connection_count("thread_0_1_abcdef12").await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_dead_receivers() {
        let factory = factory();
        let thread_id = "thread_0_1_abcdef12";
        let mut alive = factory.open("alice", thread_id).await.unwrap();
        let dropped = factory.open("alice", thread_id).await.unwrap();
        drop(dropped.receiver);

        assert_eq!(factory.broadcast(thread_id, "hello").await, 1);
        assert_eq!(alive.receiver.recv().await.as_deref(), Some("hello"));
        assert_eq!(factory.connection_count(thread_id).await, 1);
        assert!(!factory
            .coordinator()
            .registry()
            .contains(&dropped.connection_id));
    }

    #[tokio::test]
    async fn test_broadcast_leaves_unreclaimed_dead_connection_reapable() {
        let factory = factory();
        let thread_id = "thread_0_1_abcdef12";
        let dropped = factory.open("alice", thread_id).await.unwrap();
        drop(dropped.receiver);

        // a close is already in flight for this connection
        let coordinator = factory.coordinator();
        coordinator
            .begin(&CleanupRequest::new(thread_id, &dropped.connection_id))
            .unwrap();

        assert_eq!(factory.broadcast(thread_id, "hello").await, 0);
        assert_eq!(factory.connection_count(thread_id).await, 0);

        let record = coordinator.registry().get(&dropped.connection_id).unwrap();
        assert!(record.is_flagged());
        let leak = coordinator.leak_history().pop().unwrap();
        assert_eq!(leak.resource_id, dropped.connection_id);
        assert_eq!(leak.reason.label(), "invalid_state");

        assert_eq!(coordinator.reap_aged(std::time::Duration::ZERO).len(), 1);
        assert!(coordinator.registry().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_to_unknown_thread() {
        let factory = factory();
        assert_eq!(factory.broadcast("thread_none", "hello").await, 0);
    }
}
