//! Native transport implemented with `midir`.
//!
//! Wraps `midir::MidiInput` / `midir::MidiOutput` in the [`InputHandle`] and
//! [`OutputHandle`] traits. midir has no separate "open" step for inputs: a
//! port is selected on `open_port` and only connected once a callback is set.

use super::error::BackendError;
use super::traits::{
    InputCallback, InputHandle, MessageFilter, MidiBackend, NativeHandle, OutputHandle,
    DEFAULT_CLIENT_NAME,
};
use midir::{
    Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
};
use std::fmt;
use std::mem;
use tracing::debug;

impl From<MessageFilter> for Ignore {
    fn from(filter: MessageFilter) -> Self {
        match filter {
            MessageFilter::None => Ignore::None,
            MessageFilter::Sysex => Ignore::Sysex,
            MessageFilter::Time => Ignore::Time,
            MessageFilter::ActiveSense => Ignore::ActiveSense,
            MessageFilter::All => Ignore::All,
        }
    }
}

/// Backend talking to the platform MIDI system (ALSA, CoreMIDI, WinMM).
#[derive(Debug, Clone)]
pub struct MidirBackend {
    client_name: String,
    filter: MessageFilter,
}

impl MidirBackend {
    /// Create a backend registering with the native layer as `client_name`.
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            filter: MessageFilter::None,
        }
    }

    /// Drop the given message classes on every input handle.
    pub fn with_filter(mut self, filter: MessageFilter) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for MidirBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_NAME)
    }
}

impl MidiBackend for MidirBackend {
    fn name(&self) -> &str {
        "midir"
    }

    fn new_input(&self) -> Result<Box<dyn InputHandle>, BackendError> {
        let mut input = MidiInput::new(&self.client_name)?;
        input.ignore(self.filter.into());
        Ok(Box::new(MidirInput {
            state: InputState::Idle(input),
        }))
    }

    fn new_output(&self) -> Result<Box<dyn OutputHandle>, BackendError> {
        let output = MidiOutput::new(&self.client_name)?;
        Ok(Box::new(MidirOutput {
            state: OutputState::Idle(output),
        }))
    }
}

enum InputState {
    Idle(MidiInput),
    Selected {
        input: MidiInput,
        port: MidiInputPort,
        index: usize,
        client_name: String,
    },
    Listening {
        connection: MidiInputConnection<()>,
        port: MidiInputPort,
        index: usize,
        client_name: String,
    },
    Closed,
}

/// Input handle backed by `midir::MidiInput`.
pub struct MidirInput {
    state: InputState,
}

impl MidirInput {
    fn enumerator(&self) -> Result<&MidiInput, BackendError> {
        match &self.state {
            InputState::Idle(input) | InputState::Selected { input, .. } => Ok(input),
            InputState::Listening { .. } => Err(BackendError::other(
                "port enumeration unavailable while listening",
            )),
            InputState::Closed => Err(BackendError::NotOpen),
        }
    }
}

impl NativeHandle for MidirInput {
    fn port_count(&self) -> Result<usize, BackendError> {
        Ok(self.enumerator()?.port_count())
    }

    fn port_name(&self, index: usize) -> Result<String, BackendError> {
        let input = self.enumerator()?;
        let ports = input.ports();
        let port = ports.get(index).ok_or(BackendError::PortOutOfRange {
            index,
            count: ports.len(),
        })?;
        Ok(input.port_name(port)?)
    }

    fn open_port(&mut self, index: usize, client_name: &str) -> Result<(), BackendError> {
        match mem::replace(&mut self.state, InputState::Closed) {
            InputState::Idle(input) => {
                let ports = input.ports();
                let Some(port) = ports.get(index).cloned() else {
                    let count = ports.len();
                    self.state = InputState::Idle(input);
                    return Err(BackendError::PortOutOfRange { index, count });
                };
                self.state = InputState::Selected {
                    input,
                    port,
                    index,
                    client_name: client_name.to_string(),
                };
                Ok(())
            }
            InputState::Closed => Err(BackendError::NotOpen),
            other => {
                self.state = other;
                Err(BackendError::AlreadyOpen)
            }
        }
    }

    fn close(&mut self) -> Result<(), BackendError> {
        match mem::replace(&mut self.state, InputState::Closed) {
            InputState::Listening { connection, .. } => {
                // Closing the connection stops the native callback thread.
                drop(connection.close());
            }
            InputState::Selected { .. } | InputState::Idle(_) | InputState::Closed => {}
        }
        Ok(())
    }
}

impl InputHandle for MidirInput {
    fn set_callback(&mut self, mut callback: InputCallback) -> Result<(), BackendError> {
        match mem::replace(&mut self.state, InputState::Closed) {
            InputState::Selected {
                input,
                port,
                index,
                client_name,
            } => {
                let mut last_stamp: Option<u64> = None;
                let result = input.connect(
                    &port,
                    &client_name,
                    move |stamp, message, _| {
                        // midir stamps are absolute microseconds; listeners get deltas.
                        let delta = match last_stamp.replace(stamp) {
                            Some(prev) => stamp.saturating_sub(prev) as f64 / 1_000_000.0,
                            None => 0.0,
                        };
                        callback(message, delta);
                    },
                    (),
                );
                match result {
                    Ok(connection) => {
                        debug!("midir input {} connected", index);
                        self.state = InputState::Listening {
                            connection,
                            port,
                            index,
                            client_name,
                        };
                        Ok(())
                    }
                    Err(e) => {
                        let message = e.to_string();
                        self.state = InputState::Selected {
                            input: e.into_inner(),
                            port,
                            index,
                            client_name,
                        };
                        Err(BackendError::callback(message))
                    }
                }
            }
            listening @ InputState::Listening { .. } => {
                self.state = listening;
                Err(BackendError::callback("a callback is already installed"))
            }
            other => {
                self.state = other;
                Err(BackendError::NotOpen)
            }
        }
    }

    fn cancel_callback(&mut self) -> Result<(), BackendError> {
        match mem::replace(&mut self.state, InputState::Closed) {
            InputState::Listening {
                connection,
                port,
                index,
                client_name,
            } => {
                let (input, ()) = connection.close();
                debug!("midir input {} disconnected", index);
                self.state = InputState::Selected {
                    input,
                    port,
                    index,
                    client_name,
                };
                Ok(())
            }
            selected @ InputState::Selected { .. } => {
                self.state = selected;
                Ok(())
            }
            other => {
                self.state = other;
                Err(BackendError::NotOpen)
            }
        }
    }
}

impl fmt::Debug for MidirInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            InputState::Idle(_) => "idle".to_string(),
            InputState::Selected { index, .. } => format!("selected({index})"),
            InputState::Listening { index, .. } => format!("listening({index})"),
            InputState::Closed => "closed".to_string(),
        };
        f.debug_struct("MidirInput").field("state", &state).finish()
    }
}

enum OutputState {
    Idle(MidiOutput),
    Connected {
        connection: MidiOutputConnection,
        index: usize,
    },
    Closed,
}

/// Output handle backed by `midir::MidiOutput`.
pub struct MidirOutput {
    state: OutputState,
}

impl MidirOutput {
    fn enumerator(&self) -> Result<&MidiOutput, BackendError> {
        match &self.state {
            OutputState::Idle(output) => Ok(output),
            OutputState::Connected { .. } => Err(BackendError::other(
                "port enumeration unavailable while connected",
            )),
            OutputState::Closed => Err(BackendError::NotOpen),
        }
    }
}

impl NativeHandle for MidirOutput {
    fn port_count(&self) -> Result<usize, BackendError> {
        Ok(self.enumerator()?.port_count())
    }

    fn port_name(&self, index: usize) -> Result<String, BackendError> {
        let output = self.enumerator()?;
        let ports = output.ports();
        let port = ports.get(index).ok_or(BackendError::PortOutOfRange {
            index,
            count: ports.len(),
        })?;
        Ok(output.port_name(port)?)
    }

    fn open_port(&mut self, index: usize, client_name: &str) -> Result<(), BackendError> {
        match mem::replace(&mut self.state, OutputState::Closed) {
            OutputState::Idle(output) => {
                let ports = output.ports();
                let Some(port) = ports.get(index).cloned() else {
                    let count = ports.len();
                    self.state = OutputState::Idle(output);
                    return Err(BackendError::PortOutOfRange { index, count });
                };
                match output.connect(&port, client_name) {
                    Ok(connection) => {
                        self.state = OutputState::Connected { connection, index };
                        Ok(())
                    }
                    Err(e) => {
                        let message = e.to_string();
                        self.state = OutputState::Idle(e.into_inner());
                        Err(BackendError::connect(message))
                    }
                }
            }
            OutputState::Closed => Err(BackendError::NotOpen),
            connected @ OutputState::Connected { .. } => {
                self.state = connected;
                Err(BackendError::AlreadyOpen)
            }
        }
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if let OutputState::Connected { connection, .. } =
            mem::replace(&mut self.state, OutputState::Closed)
        {
            drop(connection.close());
        }
        Ok(())
    }
}

impl OutputHandle for MidirOutput {
    fn send_message(&mut self, message: &[u8]) -> Result<(), BackendError> {
        match &mut self.state {
            OutputState::Connected { connection, .. } => Ok(connection.send(message)?),
            _ => Err(BackendError::NotOpen),
        }
    }
}

impl fmt::Debug for MidirOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            OutputState::Idle(_) => "idle".to_string(),
            OutputState::Connected { index, .. } => format!("connected({index})"),
            OutputState::Closed => "closed".to_string(),
        };
        f.debug_struct("MidirOutput").field("state", &state).finish()
    }
}
