//! Shared type definitions for the statebridge state container facade.
//!
//! These are the values that cross the boundary between the facade, the
//! external container service, and the web host. Types flow downstream to
//! `TypeScript` via `ts-rs` so the host can type its `dispatch` calls and
//! listener payloads.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for listener identity
//! - [`enums`] -- Facade lifecycle states
//! - [`messages`] -- Action requests and notifications exchanged with the
//!   container service

pub mod enums;
pub mod ids;
pub mod messages;

// Re-export all public types at crate root for convenience.
pub use enums::LifecycleState;
pub use ids::ListenerId;
pub use messages::{ActionRequest, Notification};
