use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use hs_core::AgentId;

use crate::event::{SessionEvent, SessionListener};

/// Per-participant listener registration and synchronous event fanout.
///
/// Listener lists tolerate concurrent registration while a fanout is in
/// flight: `notify` snapshots each participant's list before calling out,
/// so a listener registered mid-delivery simply catches the next event.
/// No session semantics live here.
#[derive(Default)]
pub struct ListenerHub {
    listeners: DashMap<AgentId, Vec<Arc<dyn SessionListener>>>,
}

impl std::fmt::Debug for ListenerHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHub")
            .field("participants", &self.listeners.len())
            .finish()
    }
}

impl ListenerHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one participant. Idempotent: registering
    /// the same `Arc` twice keeps a single entry.
    pub fn register(&self, agent: AgentId, listener: Arc<dyn SessionListener>) {
        let mut entry = self.listeners.entry(agent).or_default();
        if !entry.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            entry.push(listener);
        }
    }

    /// Remove one listener for one participant. Unknown pairs are a no-op.
    pub fn unregister(&self, agent: AgentId, listener: &Arc<dyn SessionListener>) {
        if let Some(mut entry) = self.listeners.get_mut(&agent) {
            entry.retain(|l| !Arc::ptr_eq(l, listener));
        }
        self.listeners.remove_if(&agent, |_, list| list.is_empty());
    }

    /// Release everything registered for a departing participant.
    pub fn unregister_all(&self, agent: AgentId) {
        self.listeners.remove(&agent);
    }

    /// Number of listeners currently registered for a participant.
    pub fn listener_count(&self, agent: AgentId) -> usize {
        self.listeners.get(&agent).map_or(0, |l| l.len())
    }

    /// Deliver `event` to every listener of every recipient, best effort
    /// and in unspecified order. A panicking listener is isolated and
    /// logged; delivery to the rest continues.
    pub fn notify<I>(&self, recipients: I, event: &SessionEvent)
    where
        I: IntoIterator<Item = AgentId>,
    {
        for agent in recipients {
            let snapshot: Vec<Arc<dyn SessionListener>> = match self.listeners.get(&agent) {
                Some(list) => list.clone(),
                None => continue,
            };
            for listener in snapshot {
                let delivery = panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
                if delivery.is_err() {
                    warn!(%agent, session = %event.session(), "listener panicked during fanout");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use hs_core::SessionId;

    use super::*;

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl SessionListener for Counter {
        fn on_event(&self, _event: &SessionEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicker;

    impl SessionListener for Panicker {
        fn on_event(&self, _event: &SessionEvent) {
            panic!("bad listener");
        }
    }

    fn closed_event() -> SessionEvent {
        SessionEvent::SessionClosed {
            session: SessionId::new(),
        }
    }

    #[test]
    fn register_is_idempotent() {
        let hub = ListenerHub::new();
        let agent = AgentId::new();
        let listener: Arc<dyn SessionListener> = Arc::new(Counter::default());
        hub.register(agent, Arc::clone(&listener));
        hub.register(agent, Arc::clone(&listener));
        assert_eq!(hub.listener_count(agent), 1);
    }

    #[test]
    fn notify_reaches_all_recipients() {
        let hub = ListenerHub::new();
        let (a, b, c) = (AgentId::new(), AgentId::new(), AgentId::new());
        let counter = Arc::new(Counter::default());
        hub.register(a, counter.clone());
        hub.register(b, counter.clone());
        // c has no listeners; must not disturb delivery.
        hub.notify([a, b, c], &closed_event());
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let hub = ListenerHub::new();
        let agent = AgentId::new();
        let counter = Arc::new(Counter::default());
        hub.register(agent, Arc::new(Panicker));
        hub.register(agent, counter.clone());
        hub.notify([agent], &closed_event());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_removes_only_that_listener() {
        let hub = ListenerHub::new();
        let agent = AgentId::new();
        let keep = Arc::new(Counter::default());
        let drop_me: Arc<dyn SessionListener> = Arc::new(Counter::default());
        hub.register(agent, keep.clone());
        hub.register(agent, Arc::clone(&drop_me));
        hub.unregister(agent, &drop_me);
        assert_eq!(hub.listener_count(agent), 1);
        hub.notify([agent], &closed_event());
        assert_eq!(keep.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_all_releases_participant() {
        let hub = ListenerHub::new();
        let agent = AgentId::new();
        hub.register(agent, Arc::new(Counter::default()));
        hub.register(agent, Arc::new(Counter::default()));
        hub.unregister_all(agent);
        assert_eq!(hub.listener_count(agent), 0);
    }

    #[test]
    fn listener_registered_during_fanout_sees_next_event() {
        struct Registrar {
            hub: Arc<ListenerHub>,
            agent: AgentId,
            late: Mutex<Option<Arc<dyn SessionListener>>>,
        }

        impl SessionListener for Registrar {
            fn on_event(&self, _event: &SessionEvent) {
                if let Some(late) = self.late.lock().unwrap().take() {
                    self.hub.register(self.agent, late);
                }
            }
        }

        let hub = Arc::new(ListenerHub::new());
        let agent = AgentId::new();
        let late_counter = Arc::new(Counter::default());
        hub.register(
            agent,
            Arc::new(Registrar {
                hub: Arc::clone(&hub),
                agent,
                late: Mutex::new(Some(late_counter.clone() as Arc<dyn SessionListener>)),
            }),
        );

        hub.notify([agent], &closed_event());
        assert_eq!(late_counter.0.load(Ordering::SeqCst), 0);
        hub.notify([agent], &closed_event());
        assert_eq!(late_counter.0.load(Ordering::SeqCst), 1);
    }
}
