//! In-process stand-ins for the external module and container service.
//!
//! [`StubModule`] initializes instantly (or after a configurable delay, or
//! with a configurable number of failures) and produces a
//! [`StubContainerService`]. The service keeps the last `args` seen for
//! each action as its state and announces every change with a
//! [`NEW_STATE_EVENT`] notification. Everything the stubs observe is
//! recorded in a shared [`StubJournal`], which also lets tests emit
//! notifications as if the container produced them internally.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{Map, Value};
use statebridge_types::{ActionRequest, Notification};
use tracing::debug;

use crate::service::{ContainerService, ModuleError, ModuleInitializer, NotificationSink};

/// Event emitted by [`StubContainerService`] after every dispatch.
pub const NEW_STATE_EVENT: &str = "NewState";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared record of everything the stubs were asked to do.
#[derive(Debug, Default)]
pub struct StubJournal {
    init_calls: AtomicUsize,
    services_created: AtomicUsize,
    module_ids: Mutex<Vec<String>>,
    dispatched: Mutex<Vec<ActionRequest>>,
    sink: Mutex<Option<NotificationSink>>,
}

impl StubJournal {
    /// Number of times [`ModuleInitializer::initialize`] ran.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::Acquire)
    }

    /// Number of container services built.
    pub fn services_created(&self) -> usize {
        self.services_created.load(Ordering::Acquire)
    }

    /// Module identifiers passed to `initialize`, in call order.
    pub fn module_ids(&self) -> Vec<String> {
        lock(&self.module_ids).clone()
    }

    /// Requests received by the container service, in call order.
    pub fn dispatched(&self) -> Vec<ActionRequest> {
        lock(&self.dispatched).clone()
    }

    /// Emit a notification through the most recently created service.
    ///
    /// Returns `false` if no service exists yet.
    pub fn emit(&self, notification: Notification) -> bool {
        let sink = lock(&self.sink).clone();
        let Some(sink) = sink else {
            return false;
        };
        sink.deliver(notification);
        true
    }
}

/// Module initializer backed by [`StubContainerService`].
#[derive(Debug, Default)]
pub struct StubModule {
    journal: Arc<StubJournal>,
    remaining_failures: AtomicUsize,
    delay: Duration,
}

impl StubModule {
    /// A module that initializes immediately and never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `count` initialization attempts.
    #[must_use]
    pub fn with_failures(self, count: usize) -> Self {
        self.remaining_failures.store(count, Ordering::Release);
        self
    }

    /// Wait `delay` before each initialization attempt completes.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The journal shared with every service this module creates.
    pub fn journal(&self) -> Arc<StubJournal> {
        Arc::clone(&self.journal)
    }

    fn take_failure(&self) -> bool {
        self.remaining_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl ModuleInitializer for StubModule {
    type Service = StubContainerService;

    fn initialize(
        &self,
        module_id: &str,
    ) -> impl Future<Output = Result<(), ModuleError>> + Send {
        async move {
            self.journal.init_calls.fetch_add(1, Ordering::AcqRel);
            lock(&self.journal.module_ids).push(module_id.to_owned());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.take_failure() {
                return Err(ModuleError::Failed {
                    module: module_id.to_owned(),
                    message: String::from("stub failure"),
                });
            }
            debug!(module = module_id, "stub module initialized");
            Ok(())
        }
    }

    fn create_service(&self, sink: NotificationSink) -> Self::Service {
        self.journal.services_created.fetch_add(1, Ordering::AcqRel);
        *lock(&self.journal.sink) = Some(sink.clone());
        StubContainerService::new(sink, Arc::clone(&self.journal))
    }
}

/// Container service that stores the last `args` per action.
#[derive(Debug)]
pub struct StubContainerService {
    sink: NotificationSink,
    journal: Arc<StubJournal>,
    state: RwLock<Map<String, Value>>,
}

impl StubContainerService {
    /// Create a service reporting to `sink` and recording into `journal`.
    pub fn new(sink: NotificationSink, journal: Arc<StubJournal>) -> Self {
        Self {
            sink,
            journal,
            state: RwLock::new(Map::new()),
        }
    }
}

impl ContainerService for StubContainerService {
    fn dispatch(&self, request: ActionRequest) {
        lock(&self.journal.dispatched).push(request.clone());
        let snapshot = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.insert(request.action, request.args);
            Value::Object(state.clone())
        };
        self.sink.deliver(Notification::new(NEW_STATE_EVENT, snapshot));
    }

    fn get_state(&self) -> Value {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Value::Object(state.clone())
    }
}
