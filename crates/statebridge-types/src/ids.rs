//! Type-safe identifier wrapper around [`Uuid`].
//!
//! Closures have no identity of their own, so every listener registered
//! with the broker carries a [`ListenerId`]. Identity comparisons
//! (duplicate registration, removal) are made on this value. IDs use UUID
//! v7 so they sort in creation order in logs.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Unique identifier for a listener callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ListenerId(pub Uuid);

impl ListenerId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}
