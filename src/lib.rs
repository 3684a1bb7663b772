//! MIDI Port Driver Library
//!
//! Thread-safe, lifecycle-checked access to MIDI input and output ports on top
//! of a native MIDI layer.
//!
//! A [`Driver`] enumerates ports and closes every port opened through it in one
//! call. [`InPort`] and [`OutPort`] guard their native handle so that opening,
//! closing, sending and listener changes are safe from any thread, and so that
//! nothing touches a handle after it was closed.
//!
//! # Modules
//!
//! - `driver`: Port enumeration, the opened-port registry and bulk close
//! - `lifecycle`: The [`Port`] trait shared by both directions
//! - `input`: Input ports, listeners and channel subscription
//! - `output`: Output ports
//! - `port`: Native transport traits, the midir backend and a mock backend
//! - `error`: Unified error handling
//! - `config`: Configuration management with TOML support
//! - `logging`: Tracing subscriber setup
//!
//! # Example
//!
//! ```
//! use midi_port_driver::port::MockBackend;
//! use midi_port_driver::{Driver, Port};
//!
//! let mock = MockBackend::new().with_inputs(&["Keys"]);
//! let driver = Driver::new(mock.clone());
//!
//! let keys = driver.find_in("keys")?;
//! keys.open()?;
//! let rx = keys.subscribe(16)?;
//!
//! mock.deliver(0, &[0x90, 60, 100], 0.0);
//! assert_eq!(rx.try_recv().unwrap().bytes, vec![0x90, 60, 100]);
//!
//! driver.close()?;
//! # Ok::<(), midi_port_driver::DriverError>(())
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod logging;
pub mod output;
pub mod port;

// Re-export commonly used types for convenience
pub use driver::Driver;
pub use error::{DriverError, Result};
pub use input::{delta_micros, InPort, InboundMessage};
pub use lifecycle::Port;
pub use output::OutPort;
pub use port::{
    BackendError, Direction, InputCallback, InputHandle, MessageFilter, MidiBackend, MockBackend,
    NativeHandle, OutputHandle,
};

#[cfg(feature = "midir-backend")]
pub use port::MidirBackend;

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult, DriverConfig};
