//! Relay hub: session lifecycle on top of the registry and the multiplexer.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use tokio::sync::mpsc;

use super::multiplexer::{Multiplexer, PollIntervals};
use super::registry::{SharedRegistry, push};
use super::types::{SessionId, SubscriptionKey, WsEvent};
use crate::catalog::Catalog;
use crate::container::ContainerRuntimeApi;

/// Tuning knobs of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub intervals: PollIntervals,
    /// Per-session outbox capacity. Updates beyond it are dropped.
    pub session_buffer: usize,
    pub ping_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            intervals: PollIntervals::default(),
            session_buffer: 64,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Point-in-time view of the relay for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelaySnapshot {
    pub sessions: usize,
    pub cycles: Vec<CycleSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSnapshot {
    pub key: String,
    pub subscribers: usize,
}

/// Owns every session and every polling cycle.
///
/// Registry changes and cycle reference counts move together: the registry
/// lock is held while the multiplexer is told about a transition, so the
/// subscriber count of a cycle always equals the number of sessions holding
/// its key.
pub struct RelayHub {
    registry: SharedRegistry,
    multiplexer: Multiplexer,
    config: RelayConfig,
}

impl RelayHub {
    pub fn new(
        source: Arc<dyn ContainerRuntimeApi>,
        catalog: Arc<Catalog>,
        config: RelayConfig,
    ) -> Self {
        let registry = SharedRegistry::new();
        let multiplexer = Multiplexer::new(
            source,
            catalog,
            Arc::new(registry.clone()),
            config.intervals,
        );
        Self {
            registry,
            multiplexer,
            config,
        }
    }

    pub fn ping_interval(&self) -> Duration {
        self.config.ping_interval
    }

    /// Open a session with no subscriptions.
    ///
    /// The returned receiver yields everything addressed to the session,
    /// starting with a `connected` event.
    pub async fn connect(&self) -> (SessionId, mpsc::Receiver<WsEvent>) {
        let (tx, rx) = mpsc::channel(self.config.session_buffer.max(1));
        let session_id = SessionId::new();

        push(session_id, &tx, WsEvent::Connected { session_id });
        self.registry.lock().await.register(session_id, tx);

        info!("Session {} connected", session_id);
        (session_id, rx)
    }

    /// Subscribe a session to `key`. Returns `true` if this was a new subscription.
    pub async fn subscribe(&self, session_id: SessionId, key: SubscriptionKey) -> bool {
        let mut registry = self.registry.lock().await;
        if !registry.contains(session_id) {
            debug!("Subscribe from unknown session {} ignored", session_id);
            return false;
        }
        if !registry.subscribe(session_id, &key) {
            return false;
        }
        self.multiplexer.ensure(&key).await;
        info!("Session {} subscribed to {}", session_id, key);
        true
    }

    /// Unsubscribe a session from `key`. Returns `true` if it was subscribed.
    pub async fn unsubscribe(&self, session_id: SessionId, key: SubscriptionKey) -> bool {
        let mut registry = self.registry.lock().await;
        if !registry.unsubscribe(session_id, &key) {
            return false;
        }
        self.multiplexer.release(&key).await;
        info!("Session {} unsubscribed from {}", session_id, key);
        true
    }

    pub async fn subscribe_containers(&self, session_id: SessionId) -> bool {
        self.subscribe(session_id, SubscriptionKey::ContainerList)
            .await
    }

    pub async fn unsubscribe_containers(&self, session_id: SessionId) -> bool {
        self.unsubscribe(session_id, SubscriptionKey::ContainerList)
            .await
    }

    pub async fn subscribe_stats(&self, session_id: SessionId, container_id: &str) -> bool {
        self.subscribe(session_id, SubscriptionKey::stats(container_id))
            .await
    }

    pub async fn unsubscribe_stats(&self, session_id: SessionId, container_id: &str) -> bool {
        self.unsubscribe(session_id, SubscriptionKey::stats(container_id))
            .await
    }

    /// Drop the session and release every subscription it held.
    ///
    /// Safe to call more than once. Returns the number of keys released.
    pub async fn disconnect(&self, session_id: SessionId) -> usize {
        let mut registry = self.registry.lock().await;
        let keys = registry.remove(session_id);
        for key in &keys {
            self.multiplexer.release(key).await;
        }
        drop(registry);

        info!(
            "Session {} disconnected, released {} subscription(s)",
            session_id,
            keys.len()
        );
        keys.len()
    }

    /// Send one event to one session, best effort.
    pub async fn send_to(&self, session_id: SessionId, event: WsEvent) -> bool {
        let outbox = self.registry.lock().await.outbox(session_id);
        match outbox {
            Some(outbox) => push(session_id, &outbox, event),
            None => false,
        }
    }

    pub async fn subscriptions(&self, session_id: SessionId) -> Vec<SubscriptionKey> {
        self.registry.lock().await.subscriptions(session_id)
    }

    pub async fn has_cycle(&self, key: &SubscriptionKey) -> bool {
        self.multiplexer.is_live(key).await
    }

    pub async fn snapshot(&self) -> RelaySnapshot {
        let sessions = self.registry.lock().await.session_count();
        let cycles = self
            .multiplexer
            .live_cycles()
            .await
            .into_iter()
            .map(|(key, subscribers)| CycleSnapshot {
                key: key.to_string(),
                subscribers,
            })
            .collect();
        RelaySnapshot { sessions, cycles }
    }

    /// Stop every polling cycle. Sessions stay registered until they close.
    pub async fn shutdown(&self) {
        self.multiplexer.shutdown().await;
        info!("Relay hub shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerState;
    use crate::ws::multiplexer::test_support::{FakeSource, container};

    fn hub(source: Arc<FakeSource>) -> RelayHub {
        RelayHub::new(source, Arc::new(Catalog::builtin()), RelayConfig::default())
    }

    async fn drain(rx: &mut mpsc::Receiver<WsEvent>) -> Vec<WsEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sends_session_id() {
        let hub = hub(Arc::new(FakeSource::default()));
        let (id, mut rx) = hub.connect().await;
        assert_eq!(
            rx.try_recv().unwrap(),
            WsEvent::Connected { session_id: id }
        );
        assert_eq!(hub.snapshot().await.sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustive_disconnect() {
        let source = Arc::new(FakeSource::default());
        let hub = hub(source.clone());
        let (id, _rx) = hub.connect().await;

        assert!(hub.subscribe_containers(id).await);
        for c in ["a", "b", "c"] {
            assert!(hub.subscribe_stats(id, c).await);
        }
        assert_eq!(hub.snapshot().await.cycles.len(), 4);

        assert_eq!(hub.disconnect(id).await, 4);
        let snapshot = hub.snapshot().await;
        assert_eq!(snapshot.sessions, 0);
        assert!(snapshot.cycles.is_empty());

        // No timers remain.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let calls = source.list_calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.list_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_disconnect_is_safe() {
        let hub = hub(Arc::new(FakeSource::default()));
        let (id, _rx) = hub.connect().await;
        hub.subscribe_containers(id).await;
        assert_eq!(hub.disconnect(id).await, 1);
        assert_eq!(hub.disconnect(id).await, 0);
        assert!(!hub.subscribe_containers(id).await);
        assert!(!hub.has_cycle(&SubscriptionKey::ContainerList).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_shared_between_sessions() {
        let source = Arc::new(FakeSource::default());
        let hub = hub(source.clone());
        let (a, _rx_a) = hub.connect().await;
        let (b, _rx_b) = hub.connect().await;

        hub.subscribe_containers(a).await;
        hub.subscribe_containers(b).await;
        // Repeated subscribe does not add a second reference.
        assert!(!hub.subscribe_containers(b).await);
        assert_eq!(
            hub.snapshot().await.cycles,
            vec![CycleSnapshot {
                key: "containers".to_string(),
                subscribers: 2,
            }]
        );

        hub.unsubscribe_containers(a).await;
        assert!(hub.has_cycle(&SubscriptionKey::ContainerList).await);
        hub.disconnect(b).await;
        assert!(!hub.has_cycle(&SubscriptionKey::ContainerList).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_scoping() {
        let source = Arc::new(FakeSource::with_containers(vec![container(
            "redis",
            ContainerState::Running,
        )]));
        let hub = hub(source);
        let (x, mut rx_x) = hub.connect().await;
        let (y, mut rx_y) = hub.connect().await;
        drain(&mut rx_x).await;
        drain(&mut rx_y).await;

        hub.subscribe_stats(x, "c1").await;
        hub.subscribe_stats(y, "c1").await;
        hub.subscribe_containers(y).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        drain(&mut rx_x).await;
        drain(&mut rx_y).await;

        hub.unsubscribe_stats(y, "c1").await;
        // Next stats tick at 2s, next container tick at 5s.
        tokio::time::sleep(Duration::from_secs(2)).await;

        let x_events = drain(&mut rx_x).await;
        assert_eq!(x_events.len(), 1);
        assert!(matches!(
            &x_events[0],
            WsEvent::StatsUpdate { container_id, .. } if container_id == "c1"
        ));
        assert!(drain(&mut rx_y).await.is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let y_events = drain(&mut rx_y).await;
        assert!(matches!(y_events[0], WsEvent::ContainersUpdate { .. }));
        assert!(matches!(y_events[1], WsEvent::ServicesUpdate { .. }));
        assert!(
            drain(&mut rx_x)
                .await
                .iter()
                .all(|e| matches!(e, WsEvent::StatsUpdate { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_mid_fetch_keeps_other_subscriber() {
        let source = Arc::new(FakeSource::default());
        *source.list_delay.lock().unwrap() = Some(Duration::from_secs(1));
        let hub = hub(source.clone());
        let (x, mut rx_x) = hub.connect().await;
        let (y, mut rx_y) = hub.connect().await;
        drain(&mut rx_x).await;
        drain(&mut rx_y).await;

        hub.subscribe_containers(x).await;
        hub.subscribe_containers(y).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.list_calls(), 1);

        // The first fetch is still in flight.
        hub.unsubscribe_containers(y).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let x_events = drain(&mut rx_x).await;
        assert_eq!(x_events.len(), 2);
        assert!(matches!(x_events[0], WsEvent::ContainersUpdate { .. }));
        assert!(matches!(x_events[1], WsEvent::ServicesUpdate { .. }));
        assert!(drain(&mut rx_y).await.is_empty());
        assert!(hub.has_cycle(&SubscriptionKey::ContainerList).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_to_unknown_session() {
        let hub = hub(Arc::new(FakeSource::default()));
        assert!(!hub.send_to(SessionId::new(), WsEvent::Ping).await);

        let (id, mut rx) = hub.connect().await;
        drain(&mut rx).await;
        assert!(hub.send_to(id, WsEvent::Ping).await);
        assert_eq!(rx.try_recv().unwrap(), WsEvent::Ping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_cycles() {
        let hub = hub(Arc::new(FakeSource::default()));
        let (id, _rx) = hub.connect().await;
        hub.subscribe_containers(id).await;
        hub.shutdown().await;
        assert!(hub.snapshot().await.cycles.is_empty());
    }
}
