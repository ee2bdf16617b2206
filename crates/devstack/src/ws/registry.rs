//! Connection registry: which session holds which subscriptions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;

use super::multiplexer::Fanout;
use super::types::{SessionId, SubscriptionKey, WsEvent};

/// A sender for WebSocket events to one session.
pub type WsSender = mpsc::Sender<WsEvent>;

#[derive(Debug)]
struct SessionEntry {
    outbox: WsSender,
    containers: bool,
    stats: HashSet<String>,
}

impl SessionEntry {
    fn holds(&self, key: &SubscriptionKey) -> bool {
        match key {
            SubscriptionKey::ContainerList => self.containers,
            SubscriptionKey::Stats(id) => self.stats.contains(id),
        }
    }

    fn keys(&self) -> Vec<SubscriptionKey> {
        let mut stats: Vec<&String> = self.stats.iter().collect();
        stats.sort();

        let mut keys = Vec::with_capacity(stats.len() + 1);
        if self.containers {
            keys.push(SubscriptionKey::ContainerList);
        }
        keys.extend(stats.into_iter().map(|id| SubscriptionKey::Stats(id.clone())));
        keys
    }
}

/// Session -> subscriptions index.
///
/// Pure bookkeeping: every operation is total and reports whether it changed
/// anything, so callers only touch polling cycles on real transitions.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<SessionId, SessionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty session record. Re-registering replaces the outbox only.
    pub fn register(&mut self, session_id: SessionId, outbox: WsSender) {
        self.sessions
            .entry(session_id)
            .and_modify(|entry| entry.outbox = outbox.clone())
            .or_insert_with(|| SessionEntry {
                outbox,
                containers: false,
                stats: HashSet::new(),
            });
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Returns `true` only when the session gained the subscription.
    pub fn subscribe(&mut self, session_id: SessionId, key: &SubscriptionKey) -> bool {
        let Some(entry) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        match key {
            SubscriptionKey::ContainerList => !std::mem::replace(&mut entry.containers, true),
            SubscriptionKey::Stats(id) => entry.stats.insert(id.clone()),
        }
    }

    /// Returns `true` only when the session held the subscription.
    pub fn unsubscribe(&mut self, session_id: SessionId, key: &SubscriptionKey) -> bool {
        let Some(entry) = self.sessions.get_mut(&session_id) else {
            return false;
        };
        match key {
            SubscriptionKey::ContainerList => std::mem::replace(&mut entry.containers, false),
            SubscriptionKey::Stats(id) => entry.stats.remove(id),
        }
    }

    /// Delete the session and return every key it held.
    pub fn remove(&mut self, session_id: SessionId) -> Vec<SubscriptionKey> {
        self.sessions
            .remove(&session_id)
            .map(|entry| entry.keys())
            .unwrap_or_default()
    }

    pub fn subscriptions(&self, session_id: SessionId) -> Vec<SubscriptionKey> {
        self.sessions
            .get(&session_id)
            .map(SessionEntry::keys)
            .unwrap_or_default()
    }

    /// Sessions currently holding `key`, with their outboxes.
    pub fn subscribers(&self, key: &SubscriptionKey) -> Vec<(SessionId, WsSender)> {
        self.sessions
            .iter()
            .filter(|(_, entry)| entry.holds(key))
            .map(|(id, entry)| (*id, entry.outbox.clone()))
            .collect()
    }

    pub fn outbox(&self, session_id: SessionId) -> Option<WsSender> {
        self.sessions.get(&session_id).map(|e| e.outbox.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Registry shared between the session handler and the polling tasks.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<ConnectionRegistry>>);

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ConnectionRegistry> {
        self.0.lock().await
    }
}

/// Best-effort push; a full or closed outbox drops the event.
pub(crate) fn push(session_id: SessionId, outbox: &WsSender, event: WsEvent) -> bool {
    match outbox.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Outbox of session {} is full, dropping update", session_id);
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Outbox of session {} is closed", session_id);
            false
        }
    }
}

#[async_trait]
impl Fanout for SharedRegistry {
    async fn deliver(&self, key: &SubscriptionKey, events: Vec<WsEvent>) -> usize {
        // Membership is read at delivery time so a session that unsubscribed
        // during the fetch gets nothing.
        let subscribers = self.lock().await.subscribers(key);

        let mut delivered = 0;
        for (session_id, outbox) in &subscribers {
            let mut ok = true;
            for event in &events {
                ok &= push(*session_id, outbox, event.clone());
            }
            if ok {
                delivered += 1;
            }
        }
        delivered
    }
}
