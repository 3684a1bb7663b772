//! Driver and port error types.
//!
//! Every native failure that reaches a caller is wrapped here together with
//! the identity of the port it happened on.

use crate::port::{BackendError, Direction};
use thiserror::Error;

/// A specialized `Result` type for driver and port operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors returned by [`Driver`](crate::Driver), [`InPort`](crate::InPort) and
/// [`OutPort`](crate::OutPort).
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver was destroyed or the port is not open.
    #[error("MIDI driver or port is closed")]
    Closed,

    /// The native layer could not list the ports of a direction.
    #[error("Can't enumerate MIDI {direction} ports: {source}")]
    Enumeration {
        direction: Direction,
        #[source]
        source: BackendError,
    },

    /// Opening a port failed; no handle was kept.
    #[error("Can't open MIDI {direction} port {number} ({name}): {source}")]
    Open {
        direction: Direction,
        number: usize,
        name: String,
        #[source]
        source: BackendError,
    },

    /// Closing a port failed; the port is closed anyway.
    #[error("Can't close MIDI {direction} port {number} ({name}): {source}")]
    Close {
        direction: Direction,
        number: usize,
        name: String,
        #[source]
        source: BackendError,
    },

    /// A listener was attached to this input port before.
    #[error("Listener already set for MIDI in port {number} ({name})")]
    AlreadySet { number: usize, name: String },

    /// Writing to an output port failed; the port stays open.
    #[error("Could not send message to MIDI out {number} ({name}): {source}")]
    Send {
        number: usize,
        name: String,
        #[source]
        source: BackendError,
    },

    /// Attaching or detaching the native callback failed.
    #[error("Can't change listener on MIDI in port {number} ({name}): {source}")]
    Listen {
        number: usize,
        name: String,
        #[source]
        source: BackendError,
    },

    /// No port name matched a lookup.
    #[error("No MIDI {direction} port matching '{query}'")]
    NotFound { direction: Direction, query: String },
}

impl DriverError {
    /// Whether this is [`DriverError::Closed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Number of the port the error happened on, if it is port specific.
    pub fn port_number(&self) -> Option<usize> {
        match self {
            Self::Open { number, .. }
            | Self::Close { number, .. }
            | Self::AlreadySet { number, .. }
            | Self::Send { number, .. }
            | Self::Listen { number, .. } => Some(*number),
            Self::Closed | Self::Enumeration { .. } | Self::NotFound { .. } => None,
        }
    }
}
