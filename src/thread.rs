//! Stoppable worker threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Shutdown flag shared between a `ThreadHandle` and its thread.
#[derive(Clone, Debug, Default)]
pub struct Signal {
    stop: Arc<AtomicBool>,
}

impl Signal {
    /// True once shutdown has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// A running worker thread.
#[derive(Debug)]
pub struct ThreadHandle {
    handle: thread::JoinHandle<()>,
    signal: Signal,
}

impl ThreadHandle {
    /// Join the thread, blocking until it exits.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("worker thread panicked");
        }
    }

    /// Ask the thread to stop and block until it has.
    ///
    /// The thread's body must poll its `Signal` for this to return.
    pub fn shutdown(self) {
        self.signal.stop();
        self.join();
    }
}

/// Spawn a thread running `f`, handing it the shutdown `Signal`.
pub fn spawn<F>(f: F) -> ThreadHandle
where
    F: Send + 'static + FnOnce(Signal) -> (),
{
    let signal = Signal::default();
    let thread_signal = signal.clone();
    ThreadHandle {
        handle: thread::spawn(move || f(thread_signal)),
        signal: signal,
    }
}

/// How often polling loops check their `Signal`.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Graceful shutdown support
///
/// Implemented by services that own a worker `ThreadHandle`, such as
/// `http::Server`, so callers can stop them without reaching for the thread
/// underneath. Both methods consume the service.
pub trait Stoppable {
    /// Block until the worker exits on its own.
    fn join(self);
    /// Ask the worker to stop and block until it has.
    fn shutdown(self);
}
