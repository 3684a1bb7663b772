//! Output ports.

use crate::driver::DriverShared;
use crate::error::{DriverError, Result};
use crate::lifecycle::Port;
use crate::port::{BackendError, Direction, OutputHandle};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

#[derive(Default)]
struct OutState {
    handle: Option<Mutex<Box<dyn OutputHandle>>>,
    closed: bool,
}

struct OutPortInner {
    driver: Weak<DriverShared>,
    number: usize,
    name: String,
    state: RwLock<OutState>,
}

/// A MIDI output port.
///
/// Cloning gives another handle to the same port.
#[derive(Clone)]
pub struct OutPort {
    inner: Arc<OutPortInner>,
}

impl OutPort {
    pub(crate) fn new(driver: Weak<DriverShared>, number: usize, name: String) -> Self {
        Self {
            inner: Arc::new(OutPortInner {
                driver,
                number,
                name,
                state: RwLock::new(OutState::default()),
            }),
        }
    }

    /// Write `message` to the port as is.
    ///
    /// Fails with [`DriverError::Closed`] if the port is not open. A native
    /// failure is returned as [`DriverError::Send`] and leaves the port open.
    /// Sends from several threads are serialized; a concurrent close waits for
    /// an in-flight send to finish.
    pub fn send(&self, message: &[u8]) -> Result<()> {
        let state = self.inner.state.read();
        let Some(handle) = state.handle.as_ref() else {
            return Err(DriverError::Closed);
        };
        handle
            .lock()
            .send_message(message)
            .map_err(|source| DriverError::Send {
                number: self.inner.number,
                name: self.inner.name.clone(),
                source,
            })?;
        trace!(number = self.inner.number, len = message.len(), "sent MIDI message");
        Ok(())
    }

    /// Run `f` with exclusive access to the native handle.
    ///
    /// `f` receives `None` when the port is not open.
    pub fn with_underlying<R>(&self, f: impl FnOnce(Option<&mut Box<dyn OutputHandle>>) -> R) -> R {
        let mut state = self.inner.state.write();
        f(state.handle.as_mut().map(|handle| handle.get_mut()))
    }

    fn open_error(&self, source: BackendError) -> DriverError {
        DriverError::Open {
            direction: Direction::Output,
            number: self.inner.number,
            name: self.inner.name.clone(),
            source,
        }
    }
}

impl Port for OutPort {
    fn open(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let driver = self.inner.driver.upgrade().ok_or(DriverError::Closed)?;
        let mut state = self.inner.state.write();
        if state.closed {
            return Err(DriverError::Closed);
        }
        if state.handle.is_some() {
            return Ok(());
        }
        if driver.is_destroyed() {
            return Err(DriverError::Closed);
        }
        let mut handle = driver
            .backend()
            .new_output()
            .map_err(|source| self.open_error(source))?;
        handle
            .open_port(self.inner.number, driver.client_name())
            .map_err(|source| self.open_error(source))?;

        if let Err(e) = driver.register(Box::new(self.clone())) {
            if let Err(close_err) = handle.close() {
                warn!(number = self.inner.number, error = %close_err, "failed to release output handle");
            }
            return Err(e);
        }
        state.handle = Some(Mutex::new(handle));
        debug!(number = self.inner.number, name = %self.inner.name, "opened MIDI output");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        let Some(handle) = state.handle.take() else {
            return Ok(());
        };
        state.closed = true;
        let closed = handle.into_inner().close();
        drop(state);

        closed.map_err(|source| DriverError::Close {
            direction: Direction::Output,
            number: self.inner.number,
            name: self.inner.name.clone(),
            source,
        })?;
        debug!(number = self.inner.number, name = %self.inner.name, "closed MIDI output");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.state.read().handle.is_some()
    }

    fn number(&self) -> usize {
        self.inner.number
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn direction(&self) -> Direction {
        Direction::Output
    }
}

impl fmt::Display for OutPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl fmt::Debug for OutPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("OutPort")
            .field("number", &self.inner.number)
            .field("name", &self.inner.name)
            .field("open", &state.handle.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockBackend, MockFault, NativeHandle};
    use crate::Driver;

    fn setup() -> (MockBackend, Driver, OutPort) {
        let mock = MockBackend::new().with_outputs(&["Synth", "Drums"]);
        let driver = Driver::new(mock.clone());
        let port = driver.outs().unwrap().remove(1);
        (mock, driver, port)
    }

    #[test]
    fn test_send_requires_open_port() {
        let (mock, _driver, port) = setup();
        assert!(port.send(&[0x90, 60, 100]).unwrap_err().is_closed());
        assert!(mock.sent_messages().is_empty());
    }

    #[test]
    fn test_send_passes_bytes_through() {
        let (mock, _driver, port) = setup();
        port.open().unwrap();
        port.send(&[0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7]).unwrap();

        assert_eq!(
            mock.sent_messages(),
            vec![(1, vec![0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7])]
        );
    }

    #[test]
    fn test_send_failure_keeps_port_open() {
        let (mock, _driver, port) = setup();
        port.open().unwrap();
        mock.fail_port(Direction::Output, 1, MockFault::Send);

        let err = port.send(&[0x80, 60, 0]).unwrap_err();
        assert!(matches!(err, DriverError::Send { number: 1, .. }));
        assert!(port.is_open());
    }

    #[test]
    fn test_open_failure_keeps_nothing() {
        let (mock, driver, port) = setup();
        mock.fail_port(Direction::Output, 1, MockFault::Open);

        let err = port.open().unwrap_err();
        assert!(matches!(
            err,
            DriverError::Open {
                direction: Direction::Output,
                number: 1,
                ..
            }
        ));
        assert!(!port.is_open());
        assert_eq!(driver.opened_count(), 0);

        // The port was never opened, so it can be tried again.
        mock.clear_faults();
        port.open().unwrap();
        assert_eq!(driver.opened_count(), 1);
    }

    #[test]
    fn test_close_is_terminal() {
        let (_mock, _driver, port) = setup();
        port.open().unwrap();
        port.close().unwrap();
        port.close().unwrap();

        assert!(!port.is_open());
        assert!(port.open().unwrap_err().is_closed());
    }

    #[test]
    fn test_close_failure_still_closes() {
        let (mock, _driver, port) = setup();
        port.open().unwrap();
        mock.fail_port(Direction::Output, 1, MockFault::Close);

        assert!(matches!(port.close(), Err(DriverError::Close { .. })));
        assert!(!port.is_open());
        assert!(port.send(&[0xF8]).unwrap_err().is_closed());
    }

    #[test]
    fn test_with_underlying() {
        let (_mock, _driver, port) = setup();
        port.open().unwrap();
        let name = port.with_underlying(|h| h.map(|h| h.port_name(0).unwrap()));
        assert_eq!(name.as_deref(), Some("Synth"));
    }
}
