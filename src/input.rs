//! Input ports and listener delivery.

use crate::driver::DriverShared;
use crate::error::{DriverError, Result};
use crate::lifecycle::Port;
use crate::port::{BackendError, Direction, InputCallback, InputHandle};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Convert a native delta in seconds to whole microseconds, rounding to nearest.
///
/// ```
/// assert_eq!(midi_port_driver::delta_micros(0.0015), 1500);
/// assert_eq!(midi_port_driver::delta_micros(0.0), 0);
/// ```
pub fn delta_micros(delta_seconds: f64) -> i64 {
    (delta_seconds * 1_000_000.0).round() as i64
}

/// One inbound message as received through [`InPort::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Raw MIDI bytes, uninterpreted.
    pub bytes: Vec<u8>,
    /// Time since the previous message on this port, in microseconds.
    pub delta_micros: i64,
}

#[derive(Default)]
struct InState {
    handle: Option<Mutex<Box<dyn InputHandle>>>,
    closed: bool,
    listener_attached: bool,
    listening: bool,
    gate: Option<Arc<AtomicBool>>,
}

struct InPortInner {
    driver: Weak<DriverShared>,
    number: usize,
    name: String,
    state: RwLock<InState>,
}

/// A MIDI input port.
///
/// Cloning gives another handle to the same port; opening or closing through
/// any clone is seen by all of them.
#[derive(Clone)]
pub struct InPort {
    inner: Arc<InPortInner>,
}

impl InPort {
    pub(crate) fn new(driver: Weak<DriverShared>, number: usize, name: String) -> Self {
        Self {
            inner: Arc::new(InPortInner {
                driver,
                number,
                name,
                state: RwLock::new(InState::default()),
            }),
        }
    }

    /// Attach `listener` to receive every inbound message.
    ///
    /// The listener gets the raw bytes and the delta to the previous message in
    /// microseconds. It runs on a thread owned by the native layer.
    ///
    /// A port accepts one listener attempt in its lifetime. Any later call
    /// fails with [`DriverError::AlreadySet`], even if the first attempt
    /// failed or the listener was stopped.
    pub fn set_listener<F>(&self, listener: F) -> Result<()>
    where
        F: FnMut(&[u8], i64) + Send + 'static,
    {
        let mut state = self.inner.state.write();
        if state.handle.is_none() {
            return Err(DriverError::Closed);
        }
        if state.listener_attached {
            return Err(DriverError::AlreadySet {
                number: self.inner.number,
                name: self.inner.name.clone(),
            });
        }
        state.listener_attached = true;

        let gate = Arc::new(AtomicBool::new(true));
        let callback = forward(listener, Arc::clone(&gate));
        let attached = match state.handle.as_mut() {
            Some(handle) => handle.get_mut().set_callback(callback),
            None => return Err(DriverError::Closed),
        };
        attached.map_err(|source| self.listen_error(source))?;

        state.listening = true;
        state.gate = Some(gate);
        debug!(number = self.inner.number, name = %self.inner.name, "listener attached");
        Ok(())
    }

    /// Stop delivery to the listener.
    ///
    /// Fails with [`DriverError::Closed`] if the port is not open. Stopping
    /// does not reset the listener latch: the port can't get a new listener.
    pub fn stop_listening(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        let InState {
            handle,
            listening,
            gate,
            ..
        } = &mut *state;
        let Some(handle) = handle.as_mut() else {
            return Err(DriverError::Closed);
        };
        if let Some(gate) = gate.as_ref() {
            gate.store(false, Ordering::Release);
        }
        handle
            .get_mut()
            .cancel_callback()
            .map_err(|source| self.listen_error(source))?;
        *listening = false;
        debug!(number = self.inner.number, name = %self.inner.name, "listener stopped");
        Ok(())
    }

    /// Whether a listener is currently receiving messages.
    pub fn is_listening(&self) -> bool {
        let state = self.inner.state.read();
        state.handle.is_some() && state.listening
    }

    /// Whether a listener was ever attached (or attempted) on this port.
    pub fn has_listener(&self) -> bool {
        self.inner.state.read().listener_attached
    }

    /// Receive inbound messages on a bounded channel instead of a closure.
    ///
    /// Uses up this port's single listener. Messages that arrive while the
    /// channel is full are dropped.
    pub fn subscribe(&self, capacity: usize) -> Result<Receiver<InboundMessage>> {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let number = self.inner.number;
        self.set_listener(move |bytes, delta_micros| {
            let message = InboundMessage {
                bytes: bytes.to_vec(),
                delta_micros,
            };
            if let Err(e) = tx.try_send(message) {
                trace!(number, "dropping inbound MIDI message: {}", e);
            }
        })?;
        Ok(rx)
    }

    /// Run `f` with exclusive access to the native handle.
    ///
    /// `f` receives `None` when the port is not open. The port's lifecycle is
    /// blocked while `f` runs.
    pub fn with_underlying<R>(&self, f: impl FnOnce(Option<&mut Box<dyn InputHandle>>) -> R) -> R {
        let mut state = self.inner.state.write();
        f(state.handle.as_mut().map(|handle| handle.get_mut()))
    }

    fn open_error(&self, source: BackendError) -> DriverError {
        DriverError::Open {
            direction: Direction::Input,
            number: self.inner.number,
            name: self.inner.name.clone(),
            source,
        }
    }

    fn listen_error(&self, source: BackendError) -> DriverError {
        DriverError::Listen {
            number: self.inner.number,
            name: self.inner.name.clone(),
            source,
        }
    }
}

fn forward<F>(mut listener: F, gate: Arc<AtomicBool>) -> InputCallback
where
    F: FnMut(&[u8], i64) + Send + 'static,
{
    Box::new(move |bytes: &[u8], delta_seconds: f64| {
        if gate.load(Ordering::Acquire) {
            listener(bytes, delta_micros(delta_seconds));
        }
    })
}

impl Port for InPort {
    fn open(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        // Upgraded before locking so the port lock is released first if this
        // turns out to be the last reference to the driver.
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
            .new_input()
            .map_err(|source| self.open_error(source))?;
        handle
            .open_port(self.inner.number, driver.client_name())
            .map_err(|source| self.open_error(source))?;

        if let Err(e) = driver.register(Box::new(self.clone())) {
            if let Err(close_err) = handle.close() {
                warn!(number = self.inner.number, error = %close_err, "failed to release input handle");
            }
            return Err(e);
        }
        state.handle = Some(Mutex::new(handle));
        debug!(number = self.inner.number, name = %self.inner.name, "opened MIDI input");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        let Some(handle) = state.handle.take() else {
            return Ok(());
        };
        state.closed = true;
        if let Some(gate) = state.gate.take() {
            gate.store(false, Ordering::Release);
        }

        let mut handle = handle.into_inner();
        if state.listening {
            state.listening = false;
            if let Err(e) = handle.cancel_callback() {
                warn!(number = self.inner.number, error = %e, "failed to stop listener before close");
            }
        }
        let closed = handle.close();
        drop(state);

        closed.map_err(|source| DriverError::Close {
            direction: Direction::Input,
            number: self.inner.number,
            name: self.inner.name.clone(),
            source,
        })?;
        debug!(number = self.inner.number, name = %self.inner.name, "closed MIDI input");
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
        Direction::Input
    }
}

impl fmt::Display for InPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl fmt::Debug for InPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("InPort")
            .field("number", &self.inner.number)
            .field("name", &self.inner.name)
            .field("open", &state.handle.is_some())
            .field("closed", &state.closed)
            .field("listener_attached", &state.listener_attached)
            .finish()
    }
}
