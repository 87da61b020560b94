//! External collaborators: the module initializer and the container service.
//!
//! The container service owns the real state and transition logic; this
//! crate only knows it through [`ContainerService`]. It is produced by a
//! [`ModuleInitializer`] once the external module has finished loading, and
//! reports internal events through the [`NotificationSink`] it was built
//! with.

use std::sync::Arc;

use serde_json::Value;
use statebridge_types::{ActionRequest, Notification};
use tracing::{trace, warn};

use crate::broker::EventBroker;

/// Errors reported by a [`ModuleInitializer`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModuleError {
    /// The module identifier did not resolve to anything loadable.
    #[error("module `{module}` not found")]
    NotFound {
        /// The identifier that was requested.
        module: String,
    },

    /// The module was found but failed while initializing.
    #[error("module `{module}` failed to initialize: {message}")]
    Failed {
        /// The identifier that was requested.
        module: String,
        /// Description of the failure.
        message: String,
    },
}

/// The opaque state container.
///
/// Implementations hold their own interior mutability. They must not hold
/// an internal lock while calling [`NotificationSink::deliver`], because
/// listeners may call back into [`ContainerService::get_state`].
pub trait ContainerService: Send + Sync {
    /// Apply an action. Any outcome is reported through notifications.
    fn dispatch(&self, request: ActionRequest);

    /// Current state as seen by the host.
    fn get_state(&self) -> Value;
}

/// Loads the external module and builds its container service.
pub trait ModuleInitializer: Send + Sync {
    /// The container service this module produces.
    type Service: ContainerService + 'static;

    /// Load the module named by `module_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError`] if the module cannot be loaded. The shape of
    /// the failure is up to the implementation.
    fn initialize(
        &self,
        module_id: &str,
    ) -> impl Future<Output = Result<(), ModuleError>> + Send;

    /// Build the container service. Called once, after a successful
    /// [`initialize`](Self::initialize).
    fn create_service(&self, sink: NotificationSink) -> Self::Service;
}

/// Callback handle given to the container service.
///
/// Every delivered notification is routed to the listeners registered
/// under its `action`. Listener failures are logged here; they never reach
/// the container service.
#[derive(Debug, Clone)]
pub struct NotificationSink {
    broker: Arc<EventBroker>,
}

impl NotificationSink {
    /// Create a sink feeding `broker`.
    pub const fn new(broker: Arc<EventBroker>) -> Self {
        Self { broker }
    }

    /// Route a notification to its listeners.
    pub fn deliver(&self, notification: Notification) {
        match self.broker.notify(&notification.action, &notification.args) {
            Ok(delivered) => {
                trace!(event = notification.action, delivered, "notification routed");
            }
            Err(error) => {
                for (listener, failure) in &error.failures {
                    warn!(
                        event = error.event,
                        listener = %listener,
                        error = %failure,
                        "listener failed"
                    );
                }
                warn!(
                    event = error.event,
                    delivered = error.delivered,
                    failed = error.failures.len(),
                    "notification fan-out had failures"
                );
            }
        }
    }
}
