//! Listener registry and notification fan-out.
//!
//! The [`EventBroker`] maps event names to ordered sequences of
//! [`Listener`]s. Registration is idempotent per `(event name, listener)`
//! pair and removal of an unknown target is a silent no-op.
//!
//! # Fan-out
//!
//! [`EventBroker::notify`] snapshots the sequence for an event name and
//! releases the registry lock before invoking anything, so a listener may
//! call back into the broker (or the facade) while it runs. Changes made
//! that way apply to the next notification, never to the one in progress.
//!
//! Every invocation is isolated: a listener that returns an error does not
//! stop its siblings. Failures are collected into one [`FanOutError`] that
//! is returned after the whole sequence has run.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use statebridge_types::ListenerId;
use tracing::{debug, trace};

/// Signature of a listener callback.
pub type ListenerFn = dyn Fn(&Value) -> Result<(), ListenerError> + Send + Sync;

/// Error returned by a listener that failed to handle a notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    /// Create a listener error with a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Aggregate of listener failures from a single fan-out.
#[derive(Debug, thiserror::Error)]
#[error("{} listener(s) failed for event `{event}` ({delivered} delivered)", .failures.len())]
pub struct FanOutError {
    /// The event name being delivered.
    pub event: String,
    /// Number of listeners that handled the notification successfully.
    pub delivered: usize,
    /// Each failing listener with the error it returned, in invocation order.
    pub failures: Vec<(ListenerId, ListenerError)>,
}

/// A callback registered against an event name.
///
/// Identity is the [`ListenerId`] assigned at construction. Clones share
/// it, so keep a clone around to pass to `off` later. Two listeners built
/// from the same closure are distinct.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    callback: Arc<ListenerFn>,
}

impl Listener {
    /// Wrap a fallible callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Value) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self {
            id: ListenerId::new(),
            callback: Arc::new(callback),
        }
    }

    /// Wrap a callback that cannot fail.
    pub fn infallible<F>(callback: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Self::new(move |args| {
            callback(args);
            Ok(())
        })
    }

    /// This listener's identity.
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    fn call(&self, args: &Value) -> Result<(), ListenerError> {
        (self.callback)(args)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Listener {}

impl core::fmt::Debug for Listener {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Registry of listeners keyed by event name.
#[derive(Debug, Default)]
pub struct EventBroker {
    registry: RwLock<BTreeMap<String, Vec<Listener>>>,
}

impl EventBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `event_name`.
    ///
    /// Registering a listener that is already present under the same name
    /// does nothing.
    pub fn on(&self, event_name: &str, listener: &Listener) {
        let mut registry = self.write();
        let listeners = registry.entry(event_name.to_owned()).or_default();
        if listeners.contains(listener) {
            trace!(event = event_name, listener = %listener.id, "listener already registered");
            return;
        }
        listeners.push(listener.clone());
        debug!(
            event = event_name,
            listener = %listener.id,
            listeners = listeners.len(),
            "listener registered"
        );
    }

    /// Remove `listener` from `event_name`.
    ///
    /// Unknown event names and absent listeners are ignored. A name whose
    /// last listener is removed is dropped from the registry.
    pub fn off(&self, event_name: &str, listener: &Listener) {
        let mut registry = self.write();
        let Some(listeners) = registry.get_mut(event_name) else {
            return;
        };
        let Some(position) = listeners.iter().position(|l| l == listener) else {
            return;
        };
        listeners.remove(position);
        let remaining = listeners.len();
        if remaining == 0 {
            registry.remove(event_name);
        }
        debug!(event = event_name, listener = %listener.id, remaining, "listener removed");
    }

    /// Deliver `args` to every listener registered under `event_name`.
    ///
    /// Listeners run synchronously in registration order. Returns the number
    /// of listeners that ran successfully; a notification with no listeners
    /// is dropped and reports zero.
    ///
    /// # Errors
    ///
    /// Returns [`FanOutError`] if any listener failed. All listeners still
    /// run before the error is returned.
    pub fn notify(&self, event_name: &str, args: &Value) -> Result<usize, FanOutError> {
        let snapshot = self.read().get(event_name).cloned();
        let Some(snapshot) = snapshot else {
            trace!(event = event_name, "no listeners, notification dropped");
            return Ok(0);
        };

        let mut failures = Vec::new();
        for listener in &snapshot {
            if let Err(error) = listener.call(args) {
                failures.push((listener.id, error));
            }
        }

        let delivered = snapshot.len().saturating_sub(failures.len());
        if failures.is_empty() {
            trace!(event = event_name, delivered, "notification delivered");
            Ok(delivered)
        } else {
            Err(FanOutError {
                event: event_name.to_owned(),
                delivered,
                failures,
            })
        }
    }

    /// Number of listeners currently registered under `event_name`.
    pub fn listener_count(&self, event_name: &str) -> usize {
        self.read().get(event_name).map_or(0, Vec::len)
    }

    /// Event names that have at least one listener, in sorted order.
    pub fn event_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Whether no listeners are registered at all.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panicking listener never runs under the lock, and every write
    // leaves the map consistent, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Vec<Listener>>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Vec<Listener>>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn recorder() -> (Listener, Arc<Mutex<Vec<Value>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let listener = Listener::infallible(move |args| sink.lock().unwrap().push(args.clone()));
        (listener, calls)
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let broker = EventBroker::new();
        let (listener, calls) = recorder();

        broker.on("e", &listener);
        broker.on("e", &listener);
        let delivered = broker.notify("e", &json!(7)).unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(*calls.lock().unwrap(), vec![json!(7)]);
        assert_eq!(broker.listener_count("e"), 1);
    }

    #[test]
    fn clones_share_identity() {
        let broker = EventBroker::new();
        let (listener, calls) = recorder();
        let copy = listener.clone();

        broker.on("e", &listener);
        broker.on("e", &copy);
        broker.notify("e", &Value::Null).unwrap();

        assert_eq!(calls.lock().unwrap().len(), 1);
        broker.off("e", &copy);
        assert!(broker.is_empty());
    }

    #[test]
    fn same_listener_under_two_names_is_two_registrations() {
        let broker = EventBroker::new();
        let (listener, calls) = recorder();

        broker.on("a", &listener);
        broker.on("b", &listener);
        broker.notify("a", &json!("a")).unwrap();
        broker.notify("b", &json!("b")).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec![json!("a"), json!("b")]);
    }

    #[test]
    fn removed_listener_is_not_invoked() {
        let broker = EventBroker::new();
        let (listener, calls) = recorder();

        broker.on("e", &listener);
        broker.off("e", &listener);
        let delivered = broker.notify("e", &json!(1)).unwrap();

        assert_eq!(delivered, 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_targets_are_no_ops() {
        let broker = EventBroker::new();
        let (kept, calls) = recorder();
        let (stranger, _) = recorder();
        broker.on("kept", &kept);

        broker.off("nonexistent", &kept);
        broker.off("kept", &stranger);
        assert_eq!(broker.notify("nonexistent", &json!(1)).unwrap(), 0);

        broker.notify("kept", &json!(2)).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![json!(2)]);
        assert_eq!(broker.event_names(), vec![String::from("kept")]);
    }

    #[test]
    fn fan_out_follows_registration_order() {
        let broker = EventBroker::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first_log = Arc::clone(&order);
        let second_log = Arc::clone(&order);
        let first = Listener::infallible(move |_| first_log.lock().unwrap().push("f1"));
        let second = Listener::infallible(move |_| second_log.lock().unwrap().push("f2"));

        broker.on("e", &first);
        broker.on("e", &second);
        broker.notify("e", &Value::Null).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["f1", "f2"]);
    }

    #[test]
    fn event_names_are_isolated() {
        let broker = EventBroker::new();
        let (listener, calls) = recorder();

        broker.on("A", &listener);
        broker.notify("B", &json!(1)).unwrap();

        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_listener_does_not_stop_siblings() {
        let broker = EventBroker::new();
        let (before, before_calls) = recorder();
        let failing = Listener::new(|_| Err(ListenerError::new("boom")));
        let (after, after_calls) = recorder();

        broker.on("e", &before);
        broker.on("e", &failing);
        broker.on("e", &after);
        let error = broker.notify("e", &json!(5)).unwrap_err();

        assert_eq!(error.event, "e");
        assert_eq!(error.delivered, 2);
        assert_eq!(error.failures.len(), 1);
        assert_eq!(error.failures[0].0, failing.id());
        assert_eq!(error.failures[0].1.message(), "boom");
        assert_eq!(*before_calls.lock().unwrap(), vec![json!(5)]);
        assert_eq!(*after_calls.lock().unwrap(), vec![json!(5)]);
    }

    #[test]
    fn fan_out_error_message_names_event() {
        let broker = EventBroker::new();
        broker.on("e", &Listener::new(|_| Err(ListenerError::new("x"))));
        broker.on("e", &Listener::new(|_| Err(ListenerError::new("y"))));

        let error = broker.notify("e", &Value::Null).unwrap_err();
        assert_eq!(
            error.to_string(),
            "2 listener(s) failed for event `e` (0 delivered)"
        );
    }

    #[test]
    fn removal_during_fan_out_applies_to_next_notification() {
        let broker = Arc::new(EventBroker::new());
        let (second, second_calls) = recorder();

        let remover_broker = Arc::clone(&broker);
        let target = second.clone();
        let remover = Listener::infallible(move |_| remover_broker.off("e", &target));

        broker.on("e", &remover);
        broker.on("e", &second);

        broker.notify("e", &json!(1)).unwrap();
        assert_eq!(*second_calls.lock().unwrap(), vec![json!(1)]);

        broker.notify("e", &json!(2)).unwrap();
        assert_eq!(*second_calls.lock().unwrap(), vec![json!(1)]);
    }

    #[test]
    fn registration_during_fan_out_applies_to_next_notification() {
        let broker = Arc::new(EventBroker::new());
        let (late, late_calls) = recorder();

        let adder_broker = Arc::clone(&broker);
        let adder = Listener::infallible(move |_| adder_broker.on("e", &late));
        broker.on("e", &adder);

        assert_eq!(broker.notify("e", &json!(1)).unwrap(), 1);
        assert!(late_calls.lock().unwrap().is_empty());

        assert_eq!(broker.notify("e", &json!(2)).unwrap(), 2);
        assert_eq!(*late_calls.lock().unwrap(), vec![json!(2)]);
    }

    #[test]
    fn emptied_event_names_are_pruned() {
        let broker = EventBroker::new();
        let (a, _) = recorder();
        let (b, _) = recorder();

        broker.on("e", &a);
        broker.on("e", &b);
        broker.off("e", &a);
        assert_eq!(broker.listener_count("e"), 1);

        broker.off("e", &b);
        assert_eq!(broker.listener_count("e"), 0);
        assert!(broker.event_names().is_empty());
    }
}
