//! Auth state and its change notifications.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_signals::signal::{Mutable, MutableSignalCloned};
use serde::{Deserialize, Serialize};

/// Snapshot of the identity client's view of the session.
///
/// `None` in place of an `AuthState` means the client has not resolved the
/// session yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub is_authenticated: bool,
    /// Decoded token claims; opaque to the controller
    pub raw_claims: Option<serde_json::Value>,
}

impl AuthState {
    pub fn authenticated(raw_claims: Option<serde_json::Value>) -> Self {
        Self {
            is_authenticated: true,
            raw_claims,
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            is_authenticated: false,
            raw_claims: None,
        }
    }
}

pub type AuthStateListener = Arc<dyn Fn(Option<AuthState>) + Send + Sync>;

type ListenerMap = DashMap<u64, AuthStateListener>;

/// Publishes auth-state changes to subscribers.
///
/// Every `publish` notifies every listener, even if the state did not change.
#[derive(Clone)]
pub struct AuthStateEmitter {
    current: Mutable<Option<AuthState>>,
    listeners: Arc<ListenerMap>,
    next_id: Arc<AtomicU64>,
}

impl Default for AuthStateEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStateEmitter {
    pub fn new() -> Self {
        Self {
            current: Mutable::new(None),
            listeners: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn current(&self) -> Option<AuthState> {
        self.current.get_cloned()
    }

    pub fn publish(&self, state: AuthState) {
        self.current.set(Some(state.clone()));

        // Listeners run outside the map's shard locks so they may subscribe or unsubscribe.
        let listeners: Vec<AuthStateListener> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for listener in listeners {
            listener(Some(state.clone()));
        }
    }

    /// Registers `listener` and immediately hands it the current state.
    pub fn subscribe(&self, listener: AuthStateListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::clone(&listener));
        listener(self.current());

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Signal of the current state for signal-driven UIs.
    pub fn signal(&self) -> MutableSignalCloned<Option<AuthState>> {
        self.current.signal_cloned()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Unsubscribes its listener when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures_signals::signal::SignalExt;
    use std::sync::Mutex;

    fn recording_listener() -> (AuthStateListener, Arc<Mutex<Vec<Option<AuthState>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: AuthStateListener = Arc::new(move |state| sink.lock().unwrap().push(state));
        (listener, seen)
    }

    #[test]
    fn test_subscribe_delivers_current_state() {
        let emitter = AuthStateEmitter::new();
        let (listener, seen) = recording_listener();

        let _subscription = emitter.subscribe(listener);
        assert_eq!(*seen.lock().unwrap(), vec![None]);

        emitter.publish(AuthState::unauthenticated());
        emitter.publish(AuthState::unauthenticated());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], Some(AuthState::unauthenticated()));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let emitter = AuthStateEmitter::new();
        let (listener, seen) = recording_listener();

        let subscription = emitter.subscribe(listener);
        assert_eq!(emitter.listener_count(), 1);
        drop(subscription);
        assert_eq!(emitter.listener_count(), 0);

        emitter.publish(AuthState::authenticated(None));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_signal_follows_current_state() {
        let emitter = AuthStateEmitter::new();
        let mut stream = emitter.signal().to_stream();

        assert_eq!(stream.next().await, Some(None));

        emitter.publish(AuthState::authenticated(Some(serde_json::json!({"sub": "u1"}))));
        let next = stream.next().await.flatten().unwrap();
        assert!(next.is_authenticated);
    }
}
