//! Native-layer error types.
//!
//! Errors raised by a [`MidiBackend`](super::MidiBackend) and its handles. They
//! carry no port identity; the driver wraps them with the port number and name
//! before they reach a caller.

use thiserror::Error;

/// Errors that can occur inside the native MIDI transport.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The native client could not be created.
    #[error("Failed to initialise MIDI client: {0}")]
    Init(String),

    /// The requested port index does not exist (anymore).
    #[error("Port index {index} out of range ({count} ports available)")]
    PortOutOfRange { index: usize, count: usize },

    /// The handle has no port opened yet.
    #[error("Handle has no open port")]
    NotOpen,

    /// The handle already has a port opened.
    #[error("Handle already has an open port")]
    AlreadyOpen,

    /// Connecting to the port failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Writing a message to the port failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// Installing or removing the inbound callback failed.
    #[error("Callback error: {0}")]
    Callback(String),

    /// Anything else the native layer reports.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create an Init error from a message.
    pub fn init(message: impl Into<String>) -> Self {
        Self::Init(message.into())
    }

    /// Create a Connect error from a message.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect(message.into())
    }

    /// Create a Callback error from a message.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }

    /// Create an Other error from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[cfg(feature = "midir-backend")]
impl From<midir::InitError> for BackendError {
    fn from(e: midir::InitError) -> Self {
        Self::Init(e.to_string())
    }
}

#[cfg(feature = "midir-backend")]
impl From<midir::PortInfoError> for BackendError {
    fn from(e: midir::PortInfoError) -> Self {
        Self::Other(e.to_string())
    }
}

#[cfg(feature = "midir-backend")]
impl From<midir::SendError> for BackendError {
    fn from(e: midir::SendError) -> Self {
        Self::Send(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackendError::init("no ALSA sequencer");
        assert_eq!(
            err.to_string(),
            "Failed to initialise MIDI client: no ALSA sequencer"
        );

        let err = BackendError::PortOutOfRange { index: 4, count: 2 };
        assert_eq!(err.to_string(), "Port index 4 out of range (2 ports available)");

        let err = BackendError::NotOpen;
        assert_eq!(err.to_string(), "Handle has no open port");
    }

    #[test]
    fn test_other_is_transparent() {
        let err = BackendError::other("device unplugged");
        assert_eq!(err.to_string(), "device unplugged");
    }
}
