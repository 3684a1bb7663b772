//! The driver: port enumeration and coordinated shutdown.
//!
//! A [`Driver`] wraps one [`MidiBackend`]. It hands out unopened ports on
//! every call to [`Driver::ins`] / [`Driver::outs`] and remembers every port
//! that was opened through it, so that [`Driver::close`] can release them all.
//!
//! # Architecture
//!
//! ```text
//! caller ──> Driver::ins/outs ──> MidiBackend (fresh handle, enumerate)
//!   │                                  │
//!   └──> InPort/OutPort::open ─────────┘ (own handle) ──> DriverShared::register
//! ```
//!
//! Ports keep a `Weak` reference to the driver's shared state; the driver's
//! registry keeps the ports alive until teardown.

use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::input::InPort;
use crate::lifecycle::Port;
use crate::output::OutPort;
use crate::port::{Direction, MidiBackend, NativeHandle, DEFAULT_CLIENT_NAME};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::mem;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Registry {
    opened: Vec<Box<dyn Port>>,
    destroyed: bool,
}

/// State shared between a driver and the ports it created.
pub(crate) struct DriverShared {
    backend: Arc<dyn MidiBackend>,
    config: DriverConfig,
    registry: RwLock<Registry>,
    /// Held for the whole of `Driver::close`, so a losing caller returns only
    /// after the winner's teardown has finished. Lock order: gate, then port.
    teardown_gate: Mutex<()>,
}

impl DriverShared {
    pub(crate) fn backend(&self) -> &dyn MidiBackend {
        &*self.backend
    }

    pub(crate) fn client_name(&self) -> &str {
        &self.config.client_name
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.registry.read().destroyed
    }

    /// Append an opened port to the registry.
    ///
    /// Fails with [`DriverError::Closed`] once teardown has started; the
    /// caller then owns the port's handle and must release it.
    pub(crate) fn register(&self, port: Box<dyn Port>) -> Result<()> {
        let mut registry = self.registry.write();
        if registry.destroyed {
            return Err(DriverError::Closed);
        }
        debug!(
            direction = %port.direction(),
            number = port.number(),
            name = port.name(),
            "registered opened port"
        );
        registry.opened.push(port);
        Ok(())
    }

    /// Mark the driver destroyed and take the registry snapshot to close.
    ///
    /// Returns `None` if another caller got there first.
    fn begin_teardown(&self) -> Option<Vec<Box<dyn Port>>> {
        let mut registry = self.registry.write();
        if registry.destroyed {
            return None;
        }
        registry.destroyed = true;
        Some(mem::take(&mut registry.opened))
    }

    /// Close every port of the snapshot, keeping the last error.
    fn teardown(&self, opened: Vec<Box<dyn Port>>) -> Result<()> {
        info!(
            backend = self.backend.name(),
            ports = opened.len(),
            "closing MIDI driver"
        );
        let mut last_error = None;
        for port in &opened {
            if let Err(e) = port.close() {
                warn!(
                    direction = %port.direction(),
                    number = port.number(),
                    name = port.name(),
                    error = %e,
                    "failed to close port during driver shutdown"
                );
                last_error = Some(e);
            }
        }
        info!(backend = self.backend.name(), "MIDI driver closed");
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn enumerate<H>(&self, direction: Direction, handle: &H) -> Result<Vec<(usize, String)>>
    where
        H: NativeHandle + ?Sized,
    {
        let count = handle
            .port_count()
            .map_err(|source| DriverError::Enumeration { direction, source })?;
        let ports = (0..count)
            .map(|index| {
                let name = handle.port_name(index).unwrap_or_else(|e| {
                    debug!(%direction, index, error = %e, "port name unavailable");
                    String::new()
                });
                (index, name)
            })
            .collect();
        Ok(ports)
    }
}

impl Drop for DriverShared {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        if registry.destroyed {
            return;
        }
        registry.destroyed = true;
        let opened = mem::take(&mut registry.opened);
        if !opened.is_empty() {
            warn!(
                ports = opened.len(),
                "MIDI driver dropped without close, closing its ports"
            );
        }
        let _ = self.teardown(opened);
    }
}

/// Entry point for enumerating MIDI ports and shutting them down together.
///
/// `Driver` is a cheap handle; clones share the same registry. When the last
/// clone is dropped without [`close`](Driver::close), the registered ports are
/// closed anyway.
///
/// # Example
/// ```
/// use midi_port_driver::port::MockBackend;
/// use midi_port_driver::{Driver, Port};
///
/// let driver = Driver::new(MockBackend::new().with_outputs(&["Synth"]));
/// let outs = driver.outs()?;
/// outs[0].open()?;
/// outs[0].send(&[0x90, 60, 100])?;
/// driver.close()?;
/// assert!(!outs[0].is_open());
/// # Ok::<(), midi_port_driver::DriverError>(())
/// ```
#[derive(Clone)]
pub struct Driver {
    shared: Arc<DriverShared>,
}

impl Driver {
    /// Create a driver over `backend` with the default client name.
    pub fn new(backend: impl MidiBackend + 'static) -> Self {
        Self::with_config(backend, &DriverConfig::default())
    }

    /// Create a driver over `backend` using the given settings.
    pub fn with_config(backend: impl MidiBackend + 'static, config: &DriverConfig) -> Self {
        Self::from_shared_backend(Arc::new(backend), config)
    }

    /// Create a driver over a backend that is shared with other code.
    pub fn from_shared_backend(backend: Arc<dyn MidiBackend>, config: &DriverConfig) -> Self {
        let mut config = config.clone();
        if config.client_name.is_empty() {
            config.client_name = DEFAULT_CLIENT_NAME.to_string();
        }
        Self {
            shared: Arc::new(DriverShared {
                backend,
                config,
                registry: RwLock::new(Registry::default()),
                teardown_gate: Mutex::new(()),
            }),
        }
    }

    /// Create a driver over the platform MIDI system.
    #[cfg(feature = "midir-backend")]
    pub fn midir(config: &DriverConfig) -> Self {
        let backend = crate::port::MidirBackend::new(config.client_name.clone())
            .with_filter(config.ignore);
        Self::with_config(backend, config)
    }

    /// List the available input ports. None of them is open.
    ///
    /// A port whose name can't be resolved gets an empty name.
    pub fn ins(&self) -> Result<Vec<InPort>> {
        let registry = self.shared.registry.read();
        if registry.destroyed {
            return Err(DriverError::Closed);
        }
        let handle = self
            .shared
            .backend
            .new_input()
            .map_err(|source| DriverError::Enumeration {
                direction: Direction::Input,
                source,
            })?;
        let ports = self.shared.enumerate(Direction::Input, &*handle)?;
        debug!(count = ports.len(), "enumerated MIDI input ports");
        Ok(ports
            .into_iter()
            .map(|(number, name)| InPort::new(Arc::downgrade(&self.shared), number, name))
            .collect())
    }

    /// List the available output ports. None of them is open.
    ///
    /// A port whose name can't be resolved gets an empty name.
    pub fn outs(&self) -> Result<Vec<OutPort>> {
        let registry = self.shared.registry.read();
        if registry.destroyed {
            return Err(DriverError::Closed);
        }
        let handle = self
            .shared
            .backend
            .new_output()
            .map_err(|source| DriverError::Enumeration {
                direction: Direction::Output,
                source,
            })?;
        let ports = self.shared.enumerate(Direction::Output, &*handle)?;
        debug!(count = ports.len(), "enumerated MIDI output ports");
        Ok(ports
            .into_iter()
            .map(|(number, name)| OutPort::new(Arc::downgrade(&self.shared), number, name))
            .collect())
    }

    /// First input port whose name contains `query`, ignoring case.
    ///
    /// `query` is looked up in the configured port aliases first.
    pub fn find_in(&self, query: &str) -> Result<InPort> {
        let needle = self.resolve_alias(query);
        self.ins()?
            .into_iter()
            .find(|p| p.name().to_lowercase().contains(&needle))
            .ok_or_else(|| DriverError::NotFound {
                direction: Direction::Input,
                query: query.to_string(),
            })
    }

    /// First output port whose name contains `query`, ignoring case.
    ///
    /// `query` is looked up in the configured port aliases first.
    pub fn find_out(&self, query: &str) -> Result<OutPort> {
        let needle = self.resolve_alias(query);
        self.outs()?
            .into_iter()
            .find(|p| p.name().to_lowercase().contains(&needle))
            .ok_or_else(|| DriverError::NotFound {
                direction: Direction::Output,
                query: query.to_string(),
            })
    }

    fn resolve_alias(&self, query: &str) -> String {
        self.shared.config.resolve_port(query).to_lowercase()
    }

    /// Close every port opened through this driver and destroy it.
    ///
    /// Only the first call does the work; later calls return
    /// [`DriverError::Closed`]. Every registered port gets a close attempt
    /// even if some fail. The last failure is returned and all of them are
    /// logged. A call that loses the race waits for the winning teardown to
    /// finish before returning [`DriverError::Closed`].
    pub fn close(&self) -> Result<()> {
        let _gate = self.shared.teardown_gate.lock();
        match self.shared.begin_teardown() {
            Some(opened) => self.shared.teardown(opened),
            None => Err(DriverError::Closed),
        }
    }

    /// Whether [`close`](Driver::close) has completed.
    ///
    /// Blocks while a teardown is in progress.
    pub fn is_closed(&self) -> bool {
        let _gate = self.shared.teardown_gate.lock();
        self.shared.is_destroyed()
    }

    /// Number of ports currently in the registry.
    pub fn opened_count(&self) -> usize {
        self.shared.registry.read().opened.len()
    }

    /// The client name handed to the native layer when opening ports.
    pub fn client_name(&self) -> &str {
        self.shared.client_name()
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}drv", self.shared.backend.name())
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.registry.read();
        f.debug_struct("Driver")
            .field("backend", &self.shared.backend.name())
            .field("client_name", &self.shared.client_name())
            .field("opened", &registry.opened.len())
            .field("destroyed", &registry.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockBackend, MockFault};

    fn backend() -> MockBackend {
        MockBackend::new()
            .with_inputs(&["A", "B"])
            .with_outputs(&["Synth"])
    }

    #[test]
    fn test_enumeration_returns_closed_ports() {
        let driver = Driver::new(backend());

        let ins = driver.ins().unwrap();
        assert_eq!(ins.len(), 2);
        assert_eq!(ins[1].number(), 1);
        assert_eq!(ins[1].name(), "B");
        assert!(ins.iter().all(|p| !p.is_open()));

        let outs = driver.outs().unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].number(), 0);
        assert_eq!(driver.opened_count(), 0);
    }

    #[test]
    fn test_enumeration_does_not_open_native_ports() {
        let mock = backend();
        let driver = Driver::new(mock.clone());
        driver.ins().unwrap();
        driver.outs().unwrap();

        assert_eq!(mock.stats(Direction::Input).opens, 0);
        assert_eq!(mock.stats(Direction::Output).opens, 0);
    }

    #[test]
    fn test_name_failure_degrades_to_empty() {
        let mock = backend();
        mock.fail_port(Direction::Input, 1, MockFault::PortName);
        let driver = Driver::new(mock);

        let ins = driver.ins().unwrap();
        assert_eq!(ins[0].name(), "A");
        assert_eq!(ins[1].name(), "");
    }

    #[test]
    fn test_port_count_failure_is_enumeration_error() {
        let mock = backend();
        mock.fail(Direction::Output, MockFault::PortCount);
        let driver = Driver::new(mock);

        let err = driver.outs().unwrap_err();
        assert!(matches!(
            err,
            DriverError::Enumeration {
                direction: Direction::Output,
                ..
            }
        ));
        assert!(driver.ins().is_ok());
    }

    #[test]
    fn test_handle_creation_failure_is_enumeration_error() {
        let mock = backend();
        mock.fail(Direction::Input, MockFault::NewHandle);
        let driver = Driver::new(mock);

        assert!(matches!(
            driver.ins(),
            Err(DriverError::Enumeration { .. })
        ));
    }

    #[test]
    fn test_closed_driver_rejects_everything() {
        let driver = Driver::new(backend());
        let ins = driver.ins().unwrap();

        driver.close().unwrap();
        assert!(driver.is_closed());
        assert!(driver.ins().unwrap_err().is_closed());
        assert!(driver.outs().unwrap_err().is_closed());
        assert!(ins[0].open().unwrap_err().is_closed());
        assert!(driver.close().unwrap_err().is_closed());
    }

    #[test]
    fn test_open_registers_once() {
        let driver = Driver::new(backend());
        let ins = driver.ins().unwrap();

        ins[0].open().unwrap();
        ins[0].open().unwrap();
        assert_eq!(driver.opened_count(), 1);
    }

    #[test]
    fn test_find_by_name_and_alias() {
        let mut config = DriverConfig::default();
        config
            .port_aliases
            .insert("keys".to_string(), "b".to_string());
        let driver = Driver::with_config(backend(), &config);

        assert_eq!(driver.find_out("syn").unwrap().name(), "Synth");
        assert_eq!(driver.find_in("keys").unwrap().number(), 1);
        assert!(matches!(
            driver.find_in("drums"),
            Err(DriverError::NotFound { .. })
        ));
    }

    #[test]
    fn test_display_and_client_name() {
        let driver = Driver::new(backend());
        assert_eq!(driver.to_string(), "mockdrv");
        assert_eq!(driver.client_name(), DEFAULT_CLIENT_NAME);
    }

    #[test]
    fn test_open_passes_client_name_to_native_layer() {
        let mock = backend();
        let driver = Driver::new(mock.clone());
        driver.ins().unwrap()[1].open().unwrap();

        assert_eq!(
            mock.opened_ports(),
            vec![(Direction::Input, 1, DEFAULT_CLIENT_NAME.to_string())]
        );
    }

    #[test]
    fn test_drop_closes_registered_ports() {
        let mock = backend();
        let outs = {
            let driver = Driver::new(mock.clone());
            let outs = driver.outs().unwrap();
            outs[0].open().unwrap();
            outs
        };

        assert!(!outs[0].is_open());
        assert_eq!(mock.open_handles(Direction::Output), 0);
    }
}
