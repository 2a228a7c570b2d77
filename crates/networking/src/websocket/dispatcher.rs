//! Fan-out of decoded gateway events to registered listeners

use potato_core::GatewayEvent;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tracing::warn;

/// A gateway event listener. Returning an error (or panicking) only affects
/// this listener's handling of the current event.
pub type Listener = Arc<dyn Fn(&GatewayEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(u64, Listener)>>,
}

impl Registry {
    fn remove(&self, id: u64) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }
}

/// Listener registry shared by the connection and its hosts
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<Registry>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it runs after every listener registered before it
    pub fn register<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&GatewayEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, Arc::new(listener)));

        ListenerHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every listener registered when the call starts.
    ///
    /// Listeners may register or unregister from inside their callback; the
    /// change takes effect on the next dispatch.
    pub fn dispatch(&self, event: &GatewayEvent) {
        let snapshot: Vec<(u64, Listener)> = self
            .registry
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    "Gateway listener {} failed on {}: {:#}",
                    id, event.event_type, e
                ),
                Err(_) => warn!("Gateway listener {} panicked on {}", id, event.event_type),
            }
        }
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.registry
            .listeners
            .read()
            .map(|l| l.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returned by [`EventDispatcher::register`]. Dropping the handle leaves the
/// listener registered; call [`ListenerHandle::unregister`] to remove it.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<Registry>,
}

impl ListenerHandle {
    /// Remove the listener. Returns `false` if it was already removed.
    pub fn unregister(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn event(t: &str) -> GatewayEvent {
        GatewayEvent::new(t, json!({}))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            dispatcher.register(move |e| {
                seen.lock().unwrap().push(format!("{}:{}", name, e.event_type));
                Ok(())
            });
        }

        dispatcher.dispatch(&event("PING"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:PING", "second:PING", "third:PING"]
        );
    }

    #[test]
    fn test_failing_listeners_are_isolated() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicU64::new(0));

        dispatcher.register(|_| anyhow::bail!("listener exploded"));
        dispatcher.register(|_| panic!("listener panicked"));
        let counter = calls.clone();
        dispatcher.register(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        dispatcher.dispatch(&event("MESSAGE_CREATE"));
        dispatcher.dispatch(&event("MESSAGE_CREATE"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unregister_during_dispatch_uses_snapshot() {
        let dispatcher = EventDispatcher::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let second_handle: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));

        // First listener removes the second one mid-dispatch
        {
            let calls = calls.clone();
            let second_handle = second_handle.clone();
            dispatcher.register(move |_| {
                calls.lock().unwrap().push("first");
                if let Some(handle) = second_handle.lock().unwrap().as_ref() {
                    handle.unregister();
                }
                Ok(())
            });
        }
        let handle = {
            let calls = calls.clone();
            dispatcher.register(move |_| {
                calls.lock().unwrap().push("second");
                Ok(())
            })
        };
        *second_handle.lock().unwrap() = Some(handle);

        dispatcher.dispatch(&event("A"));
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);

        dispatcher.dispatch(&event("B"));
        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "first"]);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_register_during_dispatch_takes_effect_next_time() {
        let dispatcher = EventDispatcher::new();
        let late_calls = Arc::new(AtomicU64::new(0));

        {
            let inner = dispatcher.clone();
            let late_calls = late_calls.clone();
            dispatcher.register(move |_| {
                let late_calls = late_calls.clone();
                if inner.len() == 1 {
                    inner.register(move |_| {
                        late_calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    });
                }
                Ok(())
            });
        }

        dispatcher.dispatch(&event("A"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        dispatcher.dispatch(&event("B"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let dispatcher = EventDispatcher::new();
        let handle = dispatcher.register(|_| Ok(()));
        assert!(handle.unregister());
        assert!(!handle.unregister());
        assert!(dispatcher.is_empty());
    }
}
