//! The lifecycle contract shared by input and output ports.

use crate::error::Result;
use crate::port::Direction;
use std::fmt;

/// A MIDI port obtained from a [`Driver`](crate::Driver).
///
/// A port starts closed, becomes open on [`open`](Port::open) and is closed
/// for good by [`close`](Port::close). Both transitions are idempotent. A
/// closed port cannot be reopened; enumerate again to get a fresh one.
pub trait Port: fmt::Display + fmt::Debug + Send + Sync {
    /// Open the port and register it with its driver.
    ///
    /// Opening an open port does nothing. Opening a port that was closed, or
    /// whose driver was closed, fails with [`DriverError::Closed`](crate::DriverError::Closed).
    fn open(&self) -> Result<()>;

    /// Close the port.
    ///
    /// Closing a port that is not open does nothing. If the native close
    /// fails the error is returned, but the port is closed regardless.
    fn close(&self) -> Result<()>;

    /// Whether the port currently holds an open native handle.
    fn is_open(&self) -> bool;

    /// Index of the port within its direction.
    ///
    /// Inputs and outputs are counted separately, so an input and an output
    /// may share a number without being related.
    fn number(&self) -> usize;

    /// Display name reported by the native layer, empty if unavailable.
    fn name(&self) -> &str;

    /// Direction of the port.
    fn direction(&self) -> Direction;
}
