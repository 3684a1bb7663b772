//! Mock MIDI backend for testing.
//!
//! Provides a `MockBackend` that simulates a native MIDI layer without
//! requiring hardware. Ports are configured by name, failures can be injected
//! per direction, port and operation, and inbound messages are delivered on
//! demand with [`MockBackend::deliver`].

use super::error::BackendError;
use super::traits::{
    Direction, InputCallback, InputHandle, MidiBackend, NativeHandle, OutputHandle,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Operation of the native layer that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFault {
    /// Creating a handle fails.
    NewHandle,
    /// Querying the number of ports fails.
    PortCount,
    /// Querying a port name fails.
    PortName,
    /// Opening a port fails.
    Open,
    /// Closing a port fails.
    Close,
    /// Sending a message fails.
    Send,
    /// Installing the inbound callback fails.
    SetCallback,
    /// Removing the inbound callback fails.
    CancelCallback,
}

/// Counters of native calls made in one direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Handles handed out by `new_input` / `new_output`.
    pub handles_created: usize,
    /// Successful and failed `open_port` calls.
    pub opens: usize,
    /// `close` calls on handles that were not closed yet.
    pub closes: usize,
    /// `send_message` calls.
    pub sends: usize,
    /// `set_callback` calls.
    pub callbacks_set: usize,
    /// `cancel_callback` calls.
    pub callbacks_cancelled: usize,
    /// Calls made on a handle after it was closed.
    pub use_after_close: usize,
}

type SharedCallback = Arc<Mutex<InputCallback>>;

struct Listener {
    handle_id: usize,
    index: usize,
    callback: SharedCallback,
}

#[derive(Default)]
struct MockState {
    inputs: Vec<String>,
    outputs: Vec<String>,
    /// (direction, port index or every port, operation)
    faults: HashSet<(Direction, Option<usize>, MockFault)>,
    input_stats: MockStats,
    output_stats: MockStats,
    open_inputs: usize,
    open_outputs: usize,
    listeners: Vec<Listener>,
    sent: Vec<(usize, Vec<u8>)>,
    /// (direction, port index, client name) of every successful open.
    opened_as: Vec<(Direction, usize, String)>,
    next_handle_id: usize,
}

impl MockState {
    fn ports(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    fn stats_mut(&mut self, direction: Direction) -> &mut MockStats {
        match direction {
            Direction::Input => &mut self.input_stats,
            Direction::Output => &mut self.output_stats,
        }
    }

    fn open_count_mut(&mut self, direction: Direction) -> &mut usize {
        match direction {
            Direction::Input => &mut self.open_inputs,
            Direction::Output => &mut self.open_outputs,
        }
    }

    fn faulted(&self, direction: Direction, index: Option<usize>, fault: MockFault) -> bool {
        self.faults.contains(&(direction, None, fault))
            || index.is_some_and(|i| self.faults.contains(&(direction, Some(i), fault)))
    }
}

/// Mock MIDI backend.
///
/// Cloning yields another view of the same simulated system, so a test can
/// keep one clone for inspection while the driver owns the other.
///
/// # Example
/// ```
/// use midi_port_driver::port::{Direction, MidiBackend, MockBackend, NativeHandle};
///
/// let backend = MockBackend::new().with_inputs(&["Keys", "Pads"]);
/// let handle = backend.new_input().unwrap();
/// assert_eq!(handle.port_count().unwrap(), 2);
/// assert_eq!(handle.port_name(1).unwrap(), "Pads");
/// assert_eq!(backend.stats(Direction::Input).handles_created, 1);
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create a mock with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add input ports with the given names.
    pub fn with_inputs(self, names: &[&str]) -> Self {
        self.state
            .lock()
            .inputs
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Add output ports with the given names.
    pub fn with_outputs(self, names: &[&str]) -> Self {
        self.state
            .lock()
            .outputs
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Make `fault` happen on every port of `direction`.
    pub fn fail(&self, direction: Direction, fault: MockFault) {
        self.state.lock().faults.insert((direction, None, fault));
    }

    /// Make `fault` happen on the port at `index` only.
    pub fn fail_port(&self, direction: Direction, index: usize, fault: MockFault) {
        self.state
            .lock()
            .faults
            .insert((direction, Some(index), fault));
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Deliver one inbound message to every callback listening on input `index`.
    ///
    /// Returns the number of callbacks invoked. Callbacks run on the calling
    /// thread, outside the mock's internal lock.
    pub fn deliver(&self, index: usize, message: &[u8], delta_seconds: f64) -> usize {
        let callbacks: Vec<SharedCallback> = {
            let state = self.state.lock();
            state
                .listeners
                .iter()
                .filter(|l| l.index == index)
                .map(|l| Arc::clone(&l.callback))
                .collect()
        };
        for callback in &callbacks {
            let mut callback = callback.lock();
            (*callback)(message, delta_seconds);
        }
        callbacks.len()
    }

    /// Whether any callback is installed on input `index`.
    pub fn is_listening(&self, index: usize) -> bool {
        self.state.lock().listeners.iter().any(|l| l.index == index)
    }

    /// All messages sent so far, as (output index, bytes).
    pub fn sent_messages(&self) -> Vec<(usize, Vec<u8>)> {
        self.state.lock().sent.clone()
    }

    /// Every successful open so far, as (direction, port index, client name).
    pub fn opened_ports(&self) -> Vec<(Direction, usize, String)> {
        self.state.lock().opened_as.clone()
    }

    /// Call counters for one direction.
    pub fn stats(&self, direction: Direction) -> MockStats {
        let state = self.state.lock();
        match direction {
            Direction::Input => state.input_stats.clone(),
            Direction::Output => state.output_stats.clone(),
        }
    }

    /// Number of handles of `direction` with an open port that were not closed.
    pub fn open_handles(&self, direction: Direction) -> usize {
        let state = self.state.lock();
        match direction {
            Direction::Input => state.open_inputs,
            Direction::Output => state.open_outputs,
        }
    }

    fn new_handle(&self, direction: Direction) -> Result<MockHandle, BackendError> {
        let mut state = self.state.lock();
        if state.faulted(direction, None, MockFault::NewHandle) {
            return Err(BackendError::init("injected handle creation failure"));
        }
        state.stats_mut(direction).handles_created += 1;
        state.next_handle_id += 1;
        Ok(MockHandle {
            id: state.next_handle_id,
            direction,
            state: Arc::clone(&self.state),
            index: None,
            closed: false,
        })
    }
}

impl MidiBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn new_input(&self) -> Result<Box<dyn InputHandle>, BackendError> {
        Ok(Box::new(self.new_handle(Direction::Input)?))
    }

    fn new_output(&self) -> Result<Box<dyn OutputHandle>, BackendError> {
        Ok(Box::new(self.new_handle(Direction::Output)?))
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockBackend")
            .field("inputs", &state.inputs)
            .field("outputs", &state.outputs)
            .field("open_inputs", &state.open_inputs)
            .field("open_outputs", &state.open_outputs)
            .finish()
    }
}

/// Handle handed out by [`MockBackend`]; serves both directions.
pub struct MockHandle {
    id: usize,
    direction: Direction,
    state: Arc<Mutex<MockState>>,
    index: Option<usize>,
    closed: bool,
}

impl MockHandle {
    fn check_alive(&self, state: &mut MockState) -> Result<(), BackendError> {
        if self.closed {
            state.stats_mut(self.direction).use_after_close += 1;
            return Err(BackendError::NotOpen);
        }
        Ok(())
    }
}

impl NativeHandle for MockHandle {
    fn port_count(&self) -> Result<usize, BackendError> {
        let mut state = self.state.lock();
        self.check_alive(&mut state)?;
        if state.faulted(self.direction, None, MockFault::PortCount) {
            return Err(BackendError::other("injected port count failure"));
        }
        Ok(state.ports(self.direction).len())
    }

    fn port_name(&self, index: usize) -> Result<String, BackendError> {
        let mut state = self.state.lock();
        self.check_alive(&mut state)?;
        if state.faulted(self.direction, Some(index), MockFault::PortName) {
            return Err(BackendError::other("injected port name failure"));
        }
        let ports = state.ports(self.direction);
        ports
            .get(index)
            .cloned()
            .ok_or(BackendError::PortOutOfRange {
                index,
                count: ports.len(),
            })
    }

    fn open_port(&mut self, index: usize, client_name: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        self.check_alive(&mut state)?;
        state.stats_mut(self.direction).opens += 1;
        if self.index.is_some() {
            return Err(BackendError::AlreadyOpen);
        }
        if state.faulted(self.direction, Some(index), MockFault::Open) {
            return Err(BackendError::connect("injected open failure"));
        }
        let count = state.ports(self.direction).len();
        if index >= count {
            return Err(BackendError::PortOutOfRange { index, count });
        }
        self.index = Some(index);
        *state.open_count_mut(self.direction) += 1;
        let direction = self.direction;
        state
            .opened_as
            .push((direction, index, client_name.to_string()));
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        self.check_alive(&mut state)?;
        self.closed = true;
        state.stats_mut(self.direction).closes += 1;
        let id = self.id;
        state.listeners.retain(|l| l.handle_id != id);
        let index = self.index.take();
        if index.is_some() {
            *state.open_count_mut(self.direction) -= 1;
        }
        // An injected close failure still releases the simulated port.
        if state.faulted(self.direction, index, MockFault::Close) {
            return Err(BackendError::other("injected close failure"));
        }
        Ok(())
    }
}

impl InputHandle for MockHandle {
    fn set_callback(&mut self, callback: InputCallback) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        self.check_alive(&mut state)?;
        state.input_stats.callbacks_set += 1;
        let Some(index) = self.index else {
            return Err(BackendError::NotOpen);
        };
        if state.faulted(Direction::Input, Some(index), MockFault::SetCallback) {
            return Err(BackendError::callback("injected set_callback failure"));
        }
        state.listeners.push(Listener {
            handle_id: self.id,
            index,
            callback: Arc::new(Mutex::new(callback)),
        });
        Ok(())
    }

    fn cancel_callback(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        self.check_alive(&mut state)?;
        state.input_stats.callbacks_cancelled += 1;
        let Some(index) = self.index else {
            return Err(BackendError::NotOpen);
        };
        if state.faulted(Direction::Input, Some(index), MockFault::CancelCallback) {
            return Err(BackendError::callback("injected cancel_callback failure"));
        }
        let id = self.id;
        state.listeners.retain(|l| l.handle_id != id);
        Ok(())
    }
}

impl OutputHandle for MockHandle {
    fn send_message(&mut self, message: &[u8]) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        self.check_alive(&mut state)?;
        state.output_stats.sends += 1;
        let Some(index) = self.index else {
            return Err(BackendError::NotOpen);
        };
        if state.faulted(Direction::Output, Some(index), MockFault::Send) {
            return Err(BackendError::Send("injected send failure".to_string()));
        }
        state.sent.push((index, message.to_vec()));
        Ok(())
    }
}

impl std::fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHandle")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("index", &self.index)
            .field("closed", &self.closed)
            .finish()
    }
}
