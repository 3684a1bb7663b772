//! Concurrency tests for driver teardown and port lifecycle races.
//!
//! Each test releases its threads together through a `Barrier` and checks that
//! every call returns and that no native handle is touched after its close.

mod common;

use common::{assert_no_use_after_close, input, mock_driver, output};
use crossbeam_channel::{bounded, Receiver, Sender};
use midi_port_driver::port::{
    BackendError, Direction, InputHandle, MidiBackend, MockBackend, NativeHandle, OutputHandle,
};
use midi_port_driver::{Driver, DriverConfig, DriverError, Port};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;

#[test]
fn test_concurrent_driver_close_tears_down_once() {
    for _ in 0..20 {
        let (mock, driver) = mock_driver();
        for port in driver.outs().unwrap() {
            port.open().unwrap();
        }
        for port in driver.ins().unwrap() {
            port.open().unwrap();
        }

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let driver = driver.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    driver.close()
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("close thread panicked"))
            .collect();

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(DriverError::Closed)))
            .count();
        assert_eq!(succeeded, 1);
        assert_eq!(rejected, THREADS - 1);

        assert_eq!(mock.stats(Direction::Input).closes, 2);
        assert_eq!(mock.stats(Direction::Output).closes, 2);
        assert_no_use_after_close(&mock);
    }
}

#[test]
fn test_concurrent_open_registers_once() {
    let (mock, driver) = mock_driver();
    let port = output(&driver, 0);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let port = port.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                port.open()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(mock.stats(Direction::Output).opens, 1);
    assert_eq!(driver.opened_count(), 1);
}

#[test]
fn test_concurrent_close_closes_once() {
    let (mock, driver) = mock_driver();
    let port = input(&driver, 0);
    port.open().unwrap();
    port.set_listener(|_, _| {}).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let port = port.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                port.close()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let stats = mock.stats(Direction::Input);
    assert_eq!(stats.closes, 1);
    assert_eq!(stats.callbacks_cancelled, 1);
    assert_no_use_after_close(&mock);
}

#[test]
fn test_send_racing_close_never_uses_closed_handle() {
    for _ in 0..20 {
        let (mock, driver) = mock_driver();
        let port = output(&driver, 0);
        port.open().unwrap();
        let barrier = Arc::new(Barrier::new(THREADS + 1));
        let sent = Arc::new(AtomicUsize::new(0));

        let senders: Vec<_> = (0..THREADS)
            .map(|i| {
                let port = port.clone();
                let barrier = Arc::clone(&barrier);
                let sent = Arc::clone(&sent);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..50 {
                        match port.send(&[0x90, i as u8, 100]) {
                            Ok(()) => {
                                sent.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(DriverError::Closed) => break,
                            Err(e) => panic!("unexpected send error: {}", e),
                        }
                    }
                })
            })
            .collect();

        barrier.wait();
        driver.close().unwrap();
        for sender in senders {
            sender.join().unwrap();
        }

        assert!(!port.is_open());
        assert_eq!(mock.sent_messages().len(), sent.load(Ordering::SeqCst));
        assert_no_use_after_close(&mock);
    }
}

#[test]
fn test_delivery_racing_close_stops_at_close() {
    for _ in 0..20 {
        let (mock, driver) = mock_driver();
        let port = input(&driver, 0);
        port.open().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            port.set_listener(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let barrier = Arc::new(Barrier::new(2));
        let feeder = {
            let mock = mock.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    mock.deliver(0, &[0xF8], 0.0);
                }
            })
        };

        barrier.wait();
        port.close().unwrap();
        feeder.join().unwrap();

        let settled = calls.load(Ordering::SeqCst);
        for _ in 0..10 {
            mock.deliver(0, &[0xF8], 0.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), settled);
        assert!(!mock.is_listening(0));
        assert_no_use_after_close(&mock);
    }
}

#[test]
fn test_open_racing_driver_close_leaks_nothing() {
    for _ in 0..20 {
        let (mock, driver) = mock_driver();
        let ports = driver.outs().unwrap();
        let barrier = Arc::new(Barrier::new(ports.len() + 1));

        let openers: Vec<_> = ports
            .iter()
            .cloned()
            .map(|port| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    port.open()
                })
            })
            .collect();

        barrier.wait();
        driver.close().unwrap();
        for opener in openers {
            match opener.join().unwrap() {
                Ok(()) | Err(DriverError::Closed) => {}
                Err(e) => panic!("unexpected open error: {}", e),
            }
        }

        // Whichever opens won the race were closed by teardown.
        assert!(ports.iter().all(|p| !p.is_open()));
        assert_eq!(mock.open_handles(Direction::Output), 0);
        assert_no_use_after_close(&mock);
    }
}

/// Backend whose output `close` parks until the test releases it.
#[derive(Debug)]
struct SlowCloseBackend {
    inner: MockBackend,
    entered: Sender<()>,
    release: Receiver<()>,
}

#[derive(Debug)]
struct SlowCloseOutput {
    inner: Box<dyn OutputHandle>,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl NativeHandle for SlowCloseOutput {
    fn port_count(&self) -> Result<usize, BackendError> {
        self.inner.port_count()
    }

    fn port_name(&self, index: usize) -> Result<String, BackendError> {
        self.inner.port_name(index)
    }

    fn open_port(&mut self, index: usize, client_name: &str) -> Result<(), BackendError> {
        self.inner.open_port(index, client_name)
    }

    fn close(&mut self) -> Result<(), BackendError> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        self.inner.close()
    }
}

impl OutputHandle for SlowCloseOutput {
    fn send_message(&mut self, message: &[u8]) -> Result<(), BackendError> {
        self.inner.send_message(message)
    }
}

impl MidiBackend for SlowCloseBackend {
    fn name(&self) -> &str {
        "slow"
    }

    fn new_input(&self) -> Result<Box<dyn InputHandle>, BackendError> {
        self.inner.new_input()
    }

    fn new_output(&self) -> Result<Box<dyn OutputHandle>, BackendError> {
        Ok(Box::new(SlowCloseOutput {
            inner: self.inner.new_output()?,
            entered: self.entered.clone(),
            release: self.release.clone(),
        }))
    }
}

#[test]
fn test_losing_driver_close_waits_for_teardown() {
    let mock = MockBackend::new().with_outputs(&["Synth"]);
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let backend = SlowCloseBackend {
        inner: mock.clone(),
        entered: entered_tx,
        release: release_rx,
    };
    let driver = Driver::with_config(backend, &DriverConfig::default());
    let port = driver.outs().unwrap().remove(0);
    port.open().unwrap();

    let first = {
        let driver = driver.clone();
        thread::spawn(move || driver.close())
    };
    // The first teardown is now parked inside the native close.
    entered_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("teardown never reached the native close");

    let second = {
        let driver = driver.clone();
        let mock = mock.clone();
        thread::spawn(move || {
            let result = driver.close();
            (result, mock.open_handles(Direction::Output))
        })
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!second.is_finished(), "second close returned during teardown");

    release_tx.send(()).unwrap();
    let (second_result, still_open) = second.join().unwrap();
    assert!(matches!(second_result, Err(DriverError::Closed)));
    assert_eq!(still_open, 0);
    first.join().unwrap().unwrap();

    assert!(driver.is_closed());
    assert!(!port.is_open());
    assert_eq!(mock.open_handles(Direction::Output), 0);
    assert_no_use_after_close(&mock);
}
