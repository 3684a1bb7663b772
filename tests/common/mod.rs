//! Shared test utilities for midi_port_driver integration tests.
//!
//! This module provides common test infrastructure including:
//! - Mock backend setups with named ports
//! - Listener sinks that record what they receive
//! - Assertions over mock call statistics

#![allow(dead_code)]

use midi_port_driver::port::{Direction, MockBackend, MockStats};
use midi_port_driver::{Driver, InPort, OutPort};
use parking_lot::Mutex;
use std::sync::Arc;

/// Input port names used by most tests.
pub const INPUTS: &[&str] = &["A", "B"];

/// Output port names used by most tests.
pub const OUTPUTS: &[&str] = &["Synth", "Drums"];

/// Create a mock with the standard inputs and outputs and a driver over it.
///
/// The returned mock shares state with the driver's backend.
pub fn mock_driver() -> (MockBackend, Driver) {
    let mock = MockBackend::new().with_inputs(INPUTS).with_outputs(OUTPUTS);
    let driver = Driver::new(mock.clone());
    (mock, driver)
}

/// Enumerate and return input port `number`.
pub fn input(driver: &Driver, number: usize) -> InPort {
    driver.ins().expect("enumerate inputs").remove(number)
}

/// Enumerate and return output port `number`.
pub fn output(driver: &Driver, number: usize) -> OutPort {
    driver.outs().expect("enumerate outputs").remove(number)
}

/// Messages a listener received, as (bytes, delta microseconds).
pub type Received = Arc<Mutex<Vec<(Vec<u8>, i64)>>>;

/// Create a listener that records everything it receives.
pub fn recording_listener() -> (Received, impl FnMut(&[u8], i64) + Send + 'static) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let listener = move |bytes: &[u8], delta: i64| sink.lock().push((bytes.to_vec(), delta));
    (received, listener)
}

/// Assert that no native handle was used after being closed.
pub fn assert_no_use_after_close(mock: &MockBackend) {
    for direction in [Direction::Input, Direction::Output] {
        let stats: MockStats = mock.stats(direction);
        assert_eq!(
            stats.use_after_close, 0,
            "{} handle used after close: {:?}",
            direction, stats
        );
    }
}
