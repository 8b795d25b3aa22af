//! Error types
//!
//! Construction-time configuration errors and event-bus misuse fail synchronously.
//! Microphone and hardware problems never surface here: they travel as
//! [`CaptureFault`] payloads on the `error` event.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid recorder, timer or event-bus configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported audio format \"{0}\" (expected one of the AudioFormat MIME types)")]
    UnsupportedFormat(String),

    #[error("invalid time \"{0}\", expected hh:mm:ss, mm:ss or ss (ex: \"1:53:40\")")]
    InvalidTime(String),

    #[error("invalid timer settings: max duration {max_ms}ms must exceed the {interval_ms}ms tick interval")]
    InvalidTimer { max_ms: u64, interval_ms: u64 },

    #[error("event name must not be empty")]
    EmptyEventName,

    #[error("event \"{0}\" is declared more than once")]
    DuplicateEvent(String),
}

/// Misuse of the event bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("the event type \"{0}\" does not exist")]
    UnknownEvent(String),

    #[error("handler {id} is not subscribed to \"{event}\"")]
    UnknownHandler { event: String, id: u64 },
}

/// Errors returned by the recorder handle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("recorder task is no longer running")]
    Closed,
}

/// Message used when the host denies microphone access without explaining why
pub const PERMISSION_DENIED_MESSAGE: &str = "The access to microphone has been denied.";

/// Host error names that mean the user refused microphone access
const PERMISSION_DENIED_NAMES: [&str; 2] = ["PermissionDeniedError", "NotAllowedError"];

/// A host-reported capture or permission failure (payload of the `error` event)
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct CaptureFault {
    pub name: String,
    pub message: String,
}

impl CaptureFault {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// A permission refusal as a host would report it
    pub fn permission_denied() -> Self {
        Self::new("NotAllowedError", "")
    }

    pub fn is_permission_denied(&self) -> bool {
        PERMISSION_DENIED_NAMES.contains(&self.name.as_str())
    }

    /// Fill in a readable message for denied-permission faults that arrive without one
    pub fn normalized(mut self) -> Self {
        if self.message.is_empty() && self.is_permission_denied() {
            self.message = PERMISSION_DENIED_MESSAGE.to_string();
        }
        self
    }
}
