//! Native transport layer.
//!
//! Provides the traits the port lifecycle consumes and the implementations
//! behind them: midir for real devices and a mock for tests.

pub mod error;
pub mod mock;
pub mod traits;

#[cfg(feature = "midir-backend")]
pub mod midir_backend;

pub use error::BackendError;
pub use mock::{MockBackend, MockFault, MockStats};
pub use traits::*;

#[cfg(feature = "midir-backend")]
pub use midir_backend::{MidirBackend, MidirInput, MidirOutput};
