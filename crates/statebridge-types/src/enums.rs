//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Lifecycle of the published facade.
///
/// The only legal path is `Uninitialized -> Initializing -> Ready`. A failed
/// initialization falls back to `Uninitialized`; there is no transition out
/// of `Ready`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub enum LifecycleState {
    /// The module has not been loaded; no facade exists.
    #[default]
    Uninitialized,
    /// A load is in flight.
    Initializing,
    /// The facade is published and accepts all operations.
    Ready,
}

impl core::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}
