//! Core traits for the native MIDI transport.
//!
//! Defines the capability the port layer consumes: a [`MidiBackend`] factory
//! producing one handle per direction. Both real drivers and the mock
//! implement these, so the lifecycle code never depends on a specific library.

use super::error::BackendError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Client name used when none is configured.
pub const DEFAULT_CLIENT_NAME: &str = "midi-port-driver";

/// Direction of a port. Input and output ports are numbered independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("in"),
            Self::Output => f.write_str("out"),
        }
    }
}

/// Classes of inbound messages a backend drops before they reach a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFilter {
    /// Deliver everything.
    #[default]
    None,
    /// Drop system exclusive messages.
    Sysex,
    /// Drop MIDI time code and clock messages.
    Time,
    /// Drop active sensing messages.
    ActiveSense,
    /// Drop all of the above.
    All,
}

impl std::str::FromStr for MessageFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "sysex" => Ok(Self::Sysex),
            "time" => Ok(Self::Time),
            "active_sense" | "active-sense" => Ok(Self::ActiveSense),
            "all" => Ok(Self::All),
            other => Err(format!("unknown message filter '{other}'")),
        }
    }
}

/// Callback installed on an input handle.
///
/// Receives the raw message bytes and the time since the previous message in
/// seconds. Runs on a thread owned by the native layer.
pub type InputCallback = Box<dyn FnMut(&[u8], f64) + Send + 'static>;

/// Operations shared by input and output handles.
///
/// A handle is created unopened. Enumeration queries work in that state;
/// `open_port` binds the handle to one port until `close`.
pub trait NativeHandle: Send + fmt::Debug {
    /// Number of ports currently available in this direction.
    fn port_count(&self) -> Result<usize, BackendError>;

    /// Display name of the port at `index`.
    fn port_name(&self, index: usize) -> Result<String, BackendError>;

    /// Bind this handle to the port at `index`.
    ///
    /// `client_name` identifies this application to the native layer.
    fn open_port(&mut self, index: usize, client_name: &str) -> Result<(), BackendError>;

    /// Release the port. The handle must not be used afterwards.
    fn close(&mut self) -> Result<(), BackendError>;
}

/// A native input handle.
pub trait InputHandle: NativeHandle {
    /// Start delivering inbound messages to `callback`.
    fn set_callback(&mut self, callback: InputCallback) -> Result<(), BackendError>;

    /// Stop delivering inbound messages. Must return promptly.
    fn cancel_callback(&mut self) -> Result<(), BackendError>;
}

/// A native output handle.
pub trait OutputHandle: NativeHandle {
    /// Write one complete message.
    fn send_message(&mut self, message: &[u8]) -> Result<(), BackendError>;
}

/// Factory for native handles.
///
/// Implementations must be shareable between threads; each handle they hand
/// out is owned exclusively by its caller.
pub trait MidiBackend: Send + Sync + fmt::Debug {
    /// Short name of the backend, used when displaying a driver.
    fn name(&self) -> &str;

    /// Create a fresh, unopened input handle.
    fn new_input(&self) -> Result<Box<dyn InputHandle>, BackendError>;

    /// Create a fresh, unopened output handle.
    fn new_output(&self) -> Result<Box<dyn OutputHandle>, BackendError>;
}
