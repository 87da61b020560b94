//! Values exchanged with the container service.
//!
//! Both directions share the `{action, args}` shape: the host sends an
//! [`ActionRequest`] through `dispatch`, and the container emits
//! [`Notification`]s that the broker routes to listeners by `action`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// A request forwarded verbatim to the container service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ActionRequest {
    /// Name of the action the container should perform.
    pub action: String,
    /// Action payload. Missing in JSON means `null`.
    #[serde(default)]
    pub args: Value,
}

impl ActionRequest {
    /// Build a request from an action name and payload.
    pub fn new(action: impl Into<String>, args: Value) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }
}

/// A notification emitted by the container service.
///
/// `action` doubles as the event name listeners subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Notification {
    /// Event name used for routing.
    pub action: String,
    /// Payload handed to every matching listener.
    #[serde(default)]
    pub args: Value,
}

impl Notification {
    /// Build a notification from an event name and payload.
    pub fn new(action: impl Into<String>, args: Value) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }
}
