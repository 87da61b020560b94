//! Composition root: loads the external module and publishes the facade.
//!
//! A [`Loader`] moves through `Uninitialized -> Initializing -> Ready`
//! exactly once. Attempts are serialized behind an async mutex and
//! numbered. A caller that arrives while attempt `n` is in flight joins it:
//! it receives the facade if `n` succeeds and the same [`LoadError`] if `n`
//! fails, without running the initializer again. Every call after `Ready`
//! returns the same [`StateContainer`]. A failed or timed-out attempt
//! returns the loader to `Uninitialized`; nothing is retried internally,
//! but a `load` that starts after the failure runs a fresh attempt.
//!
//! The facade is handed to callers as an `Arc` rather than stored in a
//! process-wide slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use statebridge_types::LifecycleState;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ModuleConfig;
use crate::facade::StateContainer;
use crate::service::{ModuleError, ModuleInitializer};

/// Errors surfaced by [`Loader::load`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    /// The module initializer failed.
    #[error("failed to initialize module `{module}`: {source}")]
    Initialization {
        /// The module identifier.
        module: String,
        /// The initializer's error.
        source: ModuleError,
    },

    /// The module initializer did not finish within the configured limit.
    #[error("module `{module}` did not initialize within {timeout_ms}ms")]
    Timeout {
        /// The module identifier.
        module: String,
        /// The configured limit in milliseconds.
        timeout_ms: u64,
    },
}

const UNINITIALIZED: u64 = 0;
const INITIALIZING: u64 = 1;
const READY: u64 = 2;
const STATE_BITS: u32 = 2;
const STATE_MASK: u64 = 0b11;

/// Attempt number and lifecycle state packed into one word, so a reader
/// never pairs the state of one attempt with the number of another.
const fn pack(attempt: u64, state: LifecycleState) -> u64 {
    let code = match state {
        LifecycleState::Uninitialized => UNINITIALIZED,
        LifecycleState::Initializing => INITIALIZING,
        LifecycleState::Ready => READY,
    };
    attempt.wrapping_shl(STATE_BITS) | code
}

const fn unpack(raw: u64) -> (u64, LifecycleState) {
    let state = match raw & STATE_MASK {
        INITIALIZING => LifecycleState::Initializing,
        READY => LifecycleState::Ready,
        _ => LifecycleState::Uninitialized,
    };
    (raw.wrapping_shr(STATE_BITS), state)
}

/// Outcome of the most recent failed attempt.
#[derive(Debug)]
struct Failure {
    attempt: u64,
    error: LoadError,
}

/// Loads a module once and hands out the resulting facade.
pub struct Loader<M: ModuleInitializer> {
    initializer: M,
    config: ModuleConfig,
    container: OnceLock<Arc<StateContainer>>,
    last_failure: Mutex<Option<Failure>>,
    lifecycle: AtomicU64,
}

impl<M: ModuleInitializer> Loader<M> {
    /// Create a loader in the `Uninitialized` state.
    pub fn new(initializer: M, config: ModuleConfig) -> Self {
        Self {
            initializer,
            config,
            container: OnceLock::new(),
            last_failure: Mutex::new(None),
            lifecycle: AtomicU64::new(pack(0, LifecycleState::Uninitialized)),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle().1
    }

    /// The facade, if loading has completed.
    pub fn get(&self) -> Option<Arc<StateContainer>> {
        self.container.get().cloned()
    }

    /// The module initializer.
    pub const fn initializer(&self) -> &M {
        &self.initializer
    }

    /// Load the module and publish the facade, or return the existing one.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Initialization`] if the module initializer fails
    /// and [`LoadError::Timeout`] if it exceeds `init_timeout_ms`. Callers
    /// that joined the same attempt all receive the same error.
    pub async fn load(&self) -> Result<Arc<StateContainer>, LoadError> {
        if let Some(container) = self.get() {
            return Ok(container);
        }

        let (seen, state) = self.lifecycle();
        let joined = matches!(state, LifecycleState::Initializing).then_some(seen);

        let mut last_failure = self.last_failure.lock().await;
        if let Some(container) = self.get() {
            return Ok(container);
        }
        if let Some(failure) = last_failure
            .as_ref()
            .filter(|failure| joined == Some(failure.attempt))
        {
            debug!(attempt = failure.attempt, "sharing failure of joined attempt");
            return Err(failure.error.clone());
        }

        let attempt = self.lifecycle().0.wrapping_add(1);
        self.set_lifecycle(attempt, LifecycleState::Initializing);
        match self.initialize(attempt).await {
            Ok(container) => {
                let published = Arc::clone(self.container.get_or_init(|| container));
                *last_failure = None;
                self.set_lifecycle(attempt, LifecycleState::Ready);
                Ok(published)
            }
            Err(error) => {
                *last_failure = Some(Failure {
                    attempt,
                    error: error.clone(),
                });
                self.set_lifecycle(attempt, LifecycleState::Uninitialized);
                Err(error)
            }
        }
    }

    async fn initialize(&self, attempt: u64) -> Result<Arc<StateContainer>, LoadError> {
        let module = self.config.identifier.as_str();
        info!(
            module,
            attempt,
            timeout_ms = self.config.init_timeout_ms,
            "initializing module"
        );

        let outcome = if self.config.init_timeout_ms == 0 {
            self.initializer.initialize(module).await
        } else {
            let limit = Duration::from_millis(self.config.init_timeout_ms);
            match tokio::time::timeout(limit, self.initializer.initialize(module)).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => {
                    warn!(
                        module,
                        attempt,
                        timeout_ms = self.config.init_timeout_ms,
                        "module initialization timed out"
                    );
                    return Err(LoadError::Timeout {
                        module: module.to_owned(),
                        timeout_ms: self.config.init_timeout_ms,
                    });
                }
            }
        };

        if let Err(source) = outcome {
            warn!(module, attempt, error = %source, "module initialization failed");
            return Err(LoadError::Initialization {
                module: module.to_owned(),
                source,
            });
        }

        let container = StateContainer::wire(|sink| self.initializer.create_service(sink));
        info!(module, attempt, "state container ready");
        Ok(Arc::new(container))
    }

    fn lifecycle(&self) -> (u64, LifecycleState) {
        unpack(self.lifecycle.load(Ordering::Acquire))
    }

    // Only called while `last_failure` is locked.
    fn set_lifecycle(&self, attempt: u64, state: LifecycleState) {
        self.lifecycle.store(pack(attempt, state), Ordering::Release);
    }
}

impl<M: ModuleInitializer> core::fmt::Debug for Loader<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Loader")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::stub::StubModule;

    fn config(timeout_ms: u64) -> ModuleConfig {
        ModuleConfig {
            identifier: String::from("test.wasm"),
            init_timeout_ms: timeout_ms,
        }
    }

    #[test]
    fn lifecycle_packing_keeps_attempt_and_state() {
        for state in [
            LifecycleState::Uninitialized,
            LifecycleState::Initializing,
            LifecycleState::Ready,
        ] {
            assert_eq!(unpack(pack(7, state)), (7, state));
        }
        assert_eq!(unpack(0), (0, LifecycleState::Uninitialized));
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let loader = Loader::new(StubModule::new(), config(0));
        assert_eq!(loader.state(), LifecycleState::Uninitialized);
        assert!(loader.get().is_none());
    }

    #[tokio::test]
    async fn load_reaches_ready() {
        let loader = Loader::new(StubModule::new(), config(0));

        let container = loader.load().await.unwrap();

        assert_eq!(loader.state(), LifecycleState::Ready);
        assert!(Arc::ptr_eq(&container, &loader.get().unwrap()));
        assert_eq!(loader.initializer().journal().init_calls(), 1);
        assert_eq!(
            loader.initializer().journal().module_ids(),
            vec![String::from("test.wasm")]
        );
    }

    #[tokio::test]
    async fn repeated_load_returns_same_instance() {
        let loader = Loader::new(StubModule::new(), config(0));

        let first = loader.load().await.unwrap();
        let second = loader.load().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.initializer().journal().init_calls(), 1);
        assert_eq!(loader.initializer().journal().services_created(), 1);
    }

    #[tokio::test]
    async fn failed_load_resets_and_can_be_retried() {
        let loader = Loader::new(StubModule::new().with_failures(1), config(0));

        let error = loader.load().await.unwrap_err();
        assert!(matches!(error, LoadError::Initialization { .. }));
        assert_eq!(loader.state(), LifecycleState::Uninitialized);
        assert!(loader.get().is_none());
        assert_eq!(loader.initializer().journal().services_created(), 0);

        loader.load().await.unwrap();
        assert_eq!(loader.state(), LifecycleState::Ready);
        assert_eq!(loader.initializer().journal().init_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_initializer_times_out() {
        let module = StubModule::new().with_delay(Duration::from_secs(5));
        let loader = Loader::new(module, config(100));

        let error = loader.load().await.unwrap_err();

        assert!(matches!(error, LoadError::Timeout { timeout_ms: 100, .. }));
        assert_eq!(loader.state(), LifecycleState::Uninitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_initializing_while_in_flight() {
        let module = StubModule::new().with_delay(Duration::from_millis(50));
        let loader = Arc::new(Loader::new(module, config(0)));

        let background = Arc::clone(&loader);
        let task = tokio::spawn(async move { background.load().await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(loader.state(), LifecycleState::Initializing);

        task.await.unwrap().unwrap();
        assert_eq!(loader.state(), LifecycleState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_loads_share_one_failure() {
        let module = StubModule::new()
            .with_failures(1)
            .with_delay(Duration::from_millis(50));
        let loader = Loader::new(module, config(0));

        let (first, second) = tokio::join!(loader.load(), loader.load());

        let first = first.unwrap_err();
        let second = second.unwrap_err();
        assert!(matches!(first, LoadError::Initialization { .. }));
        assert_eq!(first.to_string(), second.to_string());
        assert_eq!(loader.initializer().journal().init_calls(), 1);
        assert_eq!(loader.state(), LifecycleState::Uninitialized);

        loader.load().await.unwrap();
        assert_eq!(loader.initializer().journal().init_calls(), 2);
        assert_eq!(loader.state(), LifecycleState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_joining_from_another_task_shares_the_failure() {
        let module = StubModule::new()
            .with_failures(1)
            .with_delay(Duration::from_millis(50));
        let loader = Arc::new(Loader::new(module, config(0)));

        let background = Arc::clone(&loader);
        let first = tokio::spawn(async move { background.load().await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(loader.state(), LifecycleState::Initializing);

        let second = loader.load().await;

        assert!(first.await.unwrap().is_err());
        assert!(second.is_err());
        assert_eq!(loader.initializer().journal().init_calls(), 1);
        assert!(loader.get().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_loads_share_one_success() {
        let module = StubModule::new().with_delay(Duration::from_millis(50));
        let loader = Loader::new(module, config(0));

        let (first, second) = tokio::join!(loader.load(), loader.load());

        assert!(Arc::ptr_eq(&first.unwrap(), &second.unwrap()));
        assert_eq!(loader.initializer().journal().init_calls(), 1);
        assert_eq!(loader.initializer().journal().services_created(), 1);
    }

    #[test]
    fn error_messages_name_the_module() {
        let timeout = LoadError::Timeout {
            module: String::from("core.wasm"),
            timeout_ms: 250,
        };
        assert_eq!(
            timeout.to_string(),
            "module `core.wasm` did not initialize within 250ms"
        );
    }
}
