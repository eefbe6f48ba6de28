//! Lifecycle event bus: named listeners plus a broadcast channel.
//!
//! Built on `tokio::sync::broadcast`, the `EventBus` supports multiple
//! concurrent subscribers. Publishing with no active subscribers is a no-op.
//! Synchronous listeners registered with [`EventBus::on`] are invoked in
//! registration order before the event is broadcast.

use std::sync::{Arc, RwLock};

use orchestra_types::event::WorkflowEvent;
use tokio::sync::broadcast;

/// A synchronous observer of lifecycle events.
pub type EventListener = Arc<dyn Fn(&WorkflowEvent) + Send + Sync>;

/// Multi-consumer event bus for workflow lifecycle events.
///
/// Cloning the bus clones the sender and shares the listener registry, so every
/// clone publishes to the same audience.
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
    listeners: Arc<RwLock<Vec<(String, EventListener)>>>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Register a named listener.
    ///
    /// Registering a name that already exists replaces that listener in place,
    /// keeping its position in the call order. There is no unsubscribe.
    pub fn on<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        let name = name.into();
        let listener: EventListener = Arc::new(listener);
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match listeners.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = listener,
            None => listeners.push((name, listener)),
        }
    }

    /// Names of registered listeners, in call order.
    pub fn listener_names(&self) -> Vec<String> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Publish an event to all listeners, then to all current subscribers.
    pub fn publish(&self, event: WorkflowEvent) {
        // Snapshot so a listener may register others without deadlocking.
        let listeners: Vec<EventListener> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in &listeners {
            listener(&event);
        }

        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .field("listeners", &self.listener_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use orchestra_types::event::WorkflowEventKind;
    use serde_json::json;
    use uuid::Uuid;

    fn sample_event(kind: WorkflowEventKind) -> WorkflowEvent {
        WorkflowEvent::workflow(kind, Uuid::now_v7(), Uuid::now_v7(), json!({}))
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(sample_event(WorkflowEventKind::WorkflowStarted));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, WorkflowEventKind::WorkflowStarted);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(sample_event(WorkflowEventKind::WorkflowCompleted));

        assert_eq!(rx1.recv().await.unwrap().kind, WorkflowEventKind::WorkflowCompleted);
        assert_eq!(rx2.recv().await.unwrap().kind, WorkflowEventKind::WorkflowCompleted);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(sample_event(WorkflowEventKind::StepStarted));
        bus.publish(sample_event(WorkflowEventKind::StepCompleted));
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new(16);
        let calls = Arc::new(Mutex::new(Vec::new()));

        for name in ["audit", "ui", "metrics"] {
            let calls = Arc::clone(&calls);
            bus.on(name, move |_event| calls.lock().unwrap().push(name));
        }

        bus.publish(sample_event(WorkflowEventKind::StepFailed));
        assert_eq!(*calls.lock().unwrap(), vec!["audit", "ui", "metrics"]);
    }

    #[test]
    fn re_registering_a_name_replaces_in_place() {
        let bus = EventBus::new(16);
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c = Arc::clone(&calls);
        bus.on("first", move |_| c.lock().unwrap().push("first-v1"));
        let c = Arc::clone(&calls);
        bus.on("second", move |_| c.lock().unwrap().push("second"));
        let c = Arc::clone(&calls);
        bus.on("first", move |_| c.lock().unwrap().push("first-v2"));

        assert_eq!(bus.listener_names(), vec!["first", "second"]);
        bus.publish(sample_event(WorkflowEventKind::StepStarted));
        assert_eq!(*calls.lock().unwrap(), vec!["first-v2", "second"]);
    }

    #[test]
    fn clone_shares_channel_and_listeners() {
        let bus = EventBus::new(16);
        let bus2 = bus.clone();
        let mut rx = bus.subscribe();
        let seen = Arc::new(Mutex::new(0usize));
        let s = Arc::clone(&seen);
        bus.on("counter", move |_| *s.lock().unwrap() += 1);

        bus2.publish(sample_event(WorkflowEventKind::WorkflowStarted));

        assert!(rx.try_recv().is_ok());
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn debug_impl() {
        let bus = EventBus::new(16);
        let _rx = bus.subscribe();
        bus.on("log", |_| {});
        let debug = format!("{bus:?}");
        assert!(debug.contains("EventBus"));
        assert!(debug.contains("receiver_count"));
        assert!(debug.contains("log"));
    }
}
