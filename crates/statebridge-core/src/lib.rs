//! Event broker, container facade, and module loader for statebridge.
//!
//! An external module owns the real state and its transition logic. This
//! crate loads that module, wires the container service it produces to a
//! listener registry, and hands callers a small facade with four
//! operations: subscribe, unsubscribe, dispatch, and read state.
//!
//! # Modules
//!
//! - [`broker`] -- [`EventBroker`] listener registry with isolated,
//!   snapshot-based fan-out.
//! - [`config`] -- Configuration loading from YAML into typed structs.
//! - [`facade`] -- [`StateContainer`], the published facade.
//! - [`loader`] -- [`Loader`], the once-only composition root.
//! - [`service`] -- [`ContainerService`] and [`ModuleInitializer`] traits
//!   for the external collaborators.
//! - [`stub`] -- In-process stand-ins for the external collaborators.
//!
//! [`EventBroker`]: broker::EventBroker
//! [`StateContainer`]: facade::StateContainer
//! [`Loader`]: loader::Loader
//! [`ContainerService`]: service::ContainerService
//! [`ModuleInitializer`]: service::ModuleInitializer

pub mod broker;
pub mod config;
pub mod facade;
pub mod loader;
pub mod service;
pub mod stub;

pub use broker::{EventBroker, FanOutError, Listener, ListenerError};
pub use facade::StateContainer;
pub use loader::{LoadError, Loader};
pub use service::{ContainerService, ModuleError, ModuleInitializer, NotificationSink};
