//! Subscription multiplexer.
//!
//! Owns at most one polling cycle per subscription key, shared by every
//! session interested in that key. Poll interval is the staleness bound of
//! the whole relay: nothing is pushed by the daemon, each tick re-fetches the
//! full snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::types::{SubscriptionKey, WsEvent};
use crate::catalog::Catalog;
use crate::container::{ContainerResult, ContainerRuntimeApi};
use crate::status;

/// Shortest accepted poll interval.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Delivers one tick's events to the sessions subscribed to a key.
#[async_trait]
pub trait Fanout: Send + Sync + 'static {
    /// Returns the number of sessions that received every event.
    async fn deliver(&self, key: &SubscriptionKey, events: Vec<WsEvent>) -> usize;
}

/// Poll cadence per subscription kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub containers: Duration,
    pub stats: Duration,
}

impl PollIntervals {
    pub fn for_key(&self, key: &SubscriptionKey) -> Duration {
        let interval = match key {
            SubscriptionKey::ContainerList => self.containers,
            SubscriptionKey::Stats(_) => self.stats,
        };
        interval.max(MIN_INTERVAL)
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            containers: Duration::from_secs(5),
            stats: Duration::from_secs(2),
        }
    }
}

/// A running recurring poll bound to one key.
struct PollingCycle {
    subscribers: usize,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Everything a cycle task needs, cloned into each spawned task.
#[derive(Clone)]
struct CycleContext {
    source: Arc<dyn ContainerRuntimeApi>,
    catalog: Arc<Catalog>,
    fanout: Arc<dyn Fanout>,
}

pub struct Multiplexer {
    ctx: CycleContext,
    intervals: PollIntervals,
    cycles: Mutex<HashMap<SubscriptionKey, PollingCycle>>,
}

impl Multiplexer {
    pub fn new(
        source: Arc<dyn ContainerRuntimeApi>,
        catalog: Arc<Catalog>,
        fanout: Arc<dyn Fanout>,
        intervals: PollIntervals,
    ) -> Self {
        Self {
            ctx: CycleContext {
                source,
                catalog,
                fanout,
            },
            intervals,
            cycles: Mutex::new(HashMap::new()),
        }
    }

    /// Join the cycle for `key`, starting it if none is live.
    ///
    /// Returns `true` when a new cycle was created. The existence check and the
    /// spawn happen under one lock, so two calls never start two timers.
    pub async fn ensure(&self, key: &SubscriptionKey) -> bool {
        let mut cycles = self.cycles.lock().await;

        if let Some(cycle) = cycles.get_mut(key) {
            cycle.subscribers += 1;
            debug!("Cycle {} now has {} subscriber(s)", key, cycle.subscribers);
            return false;
        }

        let period = self.intervals.for_key(key);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_cycle(
            key.clone(),
            period,
            self.ctx.clone(),
            cancel.clone(),
        ));
        cycles.insert(
            key.clone(),
            PollingCycle {
                subscribers: 1,
                cancel,
                task,
            },
        );
        info!("Started polling cycle {} every {:?}", key, period);
        true
    }

    /// Leave the cycle for `key`, tearing it down at zero subscribers.
    ///
    /// Returns `true` when the cycle was torn down. Future ticks are cancelled
    /// before this returns; a tick already fetching is left to finish and its
    /// result is discarded.
    pub async fn release(&self, key: &SubscriptionKey) -> bool {
        let mut cycles = self.cycles.lock().await;

        let Some(cycle) = cycles.get_mut(key) else {
            debug!("Release of {} without a live cycle ignored", key);
            return false;
        };

        cycle.subscribers = cycle.subscribers.saturating_sub(1);
        if cycle.subscribers > 0 {
            debug!("Cycle {} now has {} subscriber(s)", key, cycle.subscribers);
            return false;
        }

        if let Some(cycle) = cycles.remove(key) {
            cycle.cancel.cancel();
        }
        info!("Stopped polling cycle {}", key);
        true
    }

    pub async fn is_live(&self, key: &SubscriptionKey) -> bool {
        self.cycles.lock().await.contains_key(key)
    }

    pub async fn subscriber_count(&self, key: &SubscriptionKey) -> usize {
        self.cycles
            .lock()
            .await
            .get(key)
            .map(|c| c.subscribers)
            .unwrap_or(0)
    }

    /// Live keys with their subscriber counts, sorted by key.
    pub async fn live_cycles(&self) -> Vec<(SubscriptionKey, usize)> {
        let mut live: Vec<(SubscriptionKey, usize)> = self
            .cycles
            .lock()
            .await
            .iter()
            .map(|(key, cycle)| (key.clone(), cycle.subscribers))
            .collect();
        live.sort();
        live
    }

    /// Cancel every cycle, aborting ticks that are still fetching.
    pub async fn shutdown(&self) {
        let mut cycles = self.cycles.lock().await;
        for (key, cycle) in cycles.drain() {
            cycle.cancel.cancel();
            cycle.task.abort();
            debug!("Cancelled polling cycle {} on shutdown", key);
        }
    }
}

/// Fetch one tick's data for `key` and turn it into outbound events.
///
/// Container-list ticks also run the service aggregation.
pub async fn poll_once(
    key: &SubscriptionKey,
    source: &dyn ContainerRuntimeApi,
    catalog: &Catalog,
) -> ContainerResult<Vec<WsEvent>> {
    match key {
        SubscriptionKey::ContainerList => {
            let containers = source.list_containers(true).await?;
            let services = status::aggregate(catalog, &containers);
            Ok(vec![
                WsEvent::ContainersUpdate { containers },
                WsEvent::ServicesUpdate { services },
            ])
        }
        SubscriptionKey::Stats(container_id) => {
            let stats = source.get_stats(container_id).await?;
            Ok(vec![WsEvent::StatsUpdate {
                container_id: container_id.clone(),
                stats,
            }])
        }
    }
}

async fn run_cycle(
    key: SubscriptionKey,
    period: Duration,
    ctx: CycleContext,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    // A slow tick delays the next one instead of bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let events = match poll_once(&key, ctx.source.as_ref(), &ctx.catalog).await {
            Ok(events) => events,
            Err(e) if e.is_not_found() => {
                warn!("Tick for {} skipped, container not found: {}", key, e);
                continue;
            }
            Err(e) => {
                warn!("Tick for {} skipped: {}", key, e);
                continue;
            }
        };

        if cancel.is_cancelled() {
            break;
        }

        let delivered = ctx.fanout.deliver(&key, events).await;
        debug!("Tick for {} delivered to {} session(s)", key, delivered);
    }

    debug!("Polling cycle {} exited", key);
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory Docker status source and recording fanout for relay tests.

    use super::*;
    use crate::container::{
        Container, ContainerError, ContainerState, ContainerStats, SystemInfo, RuntimeType,
    };
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct FakeSource {
        pub containers: StdMutex<Vec<Container>>,
        pub list_calls: AtomicUsize,
        pub stats_calls: StdMutex<HashMap<String, usize>>,
        /// 1-based list call numbers that fail.
        pub failing_list_calls: StdMutex<HashSet<usize>>,
        /// Container ids whose stats report not-found.
        pub missing: StdMutex<HashSet<String>>,
        /// Simulated daemon latency of every list call.
        pub list_delay: StdMutex<Option<Duration>>,
    }

    impl FakeSource {
        pub fn with_containers(containers: Vec<Container>) -> Self {
            let source = Self::default();
            *source.containers.lock().unwrap() = containers;
            source
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        pub fn stats_calls(&self, id: &str) -> usize {
            self.stats_calls
                .lock()
                .unwrap()
                .get(id)
                .copied()
                .unwrap_or(0)
        }
    }

    pub fn container(name: &str, state: ContainerState) -> Container {
        Container {
            id: format!("id-{name}"),
            names: vec![name.to_string()],
            image: "test:latest".to_string(),
            state,
            status: state.to_string(),
            created_at: String::new(),
            ports: String::new(),
            health: None,
        }
    }

    #[async_trait]
    impl ContainerRuntimeApi for FakeSource {
        async fn list_containers(&self, _all: bool) -> ContainerResult<Vec<Container>> {
            let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = *self.list_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing_list_calls.lock().unwrap().contains(&call) {
                return Err(ContainerError::CommandFailed {
                    command: "ps".to_string(),
                    message: "Cannot connect to the Docker daemon".to_string(),
                });
            }
            Ok(self.containers.lock().unwrap().clone())
        }

        async fn get_stats(&self, container_id: &str) -> ContainerResult<ContainerStats> {
            *self
                .stats_calls
                .lock()
                .unwrap()
                .entry(container_id.to_string())
                .or_default() += 1;
            if self.missing.lock().unwrap().contains(container_id) {
                return Err(ContainerError::ContainerNotFound(container_id.to_string()));
            }
            Ok(ContainerStats {
                container_id: container_id.to_string(),
                name: container_id.to_string(),
                cpu_percent: "0.50%".to_string(),
                mem_usage: "10MiB / 1GiB".to_string(),
                mem_percent: "1.00%".to_string(),
                net_io: "0B / 0B".to_string(),
                block_io: "0B / 0B".to_string(),
                pids: "3".to_string(),
            })
        }

        async fn start_container(&self, _container_id: &str) -> ContainerResult<()> {
            Ok(())
        }

        async fn stop_container(
            &self,
            _container_id: &str,
            _timeout_seconds: Option<u32>,
        ) -> ContainerResult<()> {
            Ok(())
        }

        async fn restart_container(&self, _container_id: &str) -> ContainerResult<()> {
            Ok(())
        }

        async fn remove_container(&self, _container_id: &str, _force: bool) -> ContainerResult<()> {
            Ok(())
        }

        async fn get_logs(&self, container_id: &str, _tail: Option<u32>) -> ContainerResult<String> {
            Ok(format!("{container_id} ready\n"))
        }

        async fn system_info(&self) -> ContainerResult<SystemInfo> {
            let containers = self.containers.lock().unwrap();
            Ok(SystemInfo {
                runtime: RuntimeType::Docker,
                version: "test".to_string(),
                containers_running: containers.iter().filter(|c| c.is_running()).count(),
                containers_total: containers.len(),
            })
        }
    }

    /// Records every delivery instead of sending it anywhere.
    #[derive(Default)]
    pub struct RecordingFanout {
        pub deliveries: StdMutex<Vec<(SubscriptionKey, Vec<WsEvent>)>>,
    }

    impl RecordingFanout {
        pub fn count(&self, key: &SubscriptionKey) -> usize {
            self.deliveries
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k == key)
                .count()
        }
    }

    #[async_trait]
    impl Fanout for RecordingFanout {
        async fn deliver(&self, key: &SubscriptionKey, events: Vec<WsEvent>) -> usize {
            self.deliveries.lock().unwrap().push((key.clone(), events));
            1
        }
    }
}
