//! The published state container facade.
//!
//! [`StateContainer`] is the only object callers interact with. It exposes
//! exactly four operations: [`on`](StateContainer::on),
//! [`off`](StateContainer::off), [`dispatch`](StateContainer::dispatch) and
//! [`get_state`](StateContainer::get_state). It has no public fields and
//! every operation takes `&self`, so the facade cannot be reshaped once it
//! is built; only the listener registry behind it changes.

use std::sync::Arc;

use serde_json::Value;
use statebridge_types::ActionRequest;
use tracing::debug;

use crate::broker::{EventBroker, Listener};
use crate::service::{ContainerService, NotificationSink};

/// Facade over one container service and its listener registry.
pub struct StateContainer {
    broker: Arc<EventBroker>,
    service: Box<dyn ContainerService>,
}

impl StateContainer {
    /// Wire a new container service to a fresh broker.
    ///
    /// `build` receives the sink the service must use for notifications and
    /// is called exactly once. Only [`Loader`](crate::loader::Loader) builds
    /// facades outside of tests.
    pub(crate) fn wire<S, F>(build: F) -> Self
    where
        S: ContainerService + 'static,
        F: FnOnce(NotificationSink) -> S,
    {
        let broker = Arc::new(EventBroker::new());
        let service = build(NotificationSink::new(Arc::clone(&broker)));
        Self {
            broker,
            service: Box::new(service),
        }
    }

    /// Subscribe `listener` to notifications named `event_name`.
    pub fn on(&self, event_name: &str, listener: &Listener) {
        self.broker.on(event_name, listener);
    }

    /// Unsubscribe `listener` from `event_name`.
    pub fn off(&self, event_name: &str, listener: &Listener) {
        self.broker.off(event_name, listener);
    }

    /// Forward an action to the container service.
    pub fn dispatch(&self, request: ActionRequest) {
        debug!(action = request.action, "dispatching action");
        self.service.dispatch(request);
    }

    /// The container service's current state, unmodified.
    pub fn get_state(&self) -> Value {
        self.service.get_state()
    }
}

impl core::fmt::Debug for StateContainer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StateContainer")
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}
