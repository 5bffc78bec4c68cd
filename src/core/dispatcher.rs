//! Main-context dispatcher: deferred work for the host's tick thread.
//!
//! Architecture:
//! - Any thread enqueues jobs through a cloneable [`Dispatcher`] handle
//! - Exactly one [`MainContext`] token exists per dispatcher; its holder
//!   drains the queue once per tick and hands each job `&mut dyn HostContext`
//! - [`Dispatcher::call_and_wait`] bridges a blocked worker thread to the
//!   tick thread with a one-shot result channel and a bounded wait
//!
//! Holding the `MainContext` is what "running on the main thread" means here;
//! there are no thread-id checks.
//!
//! Timeouts do not cancel work. A job whose caller gave up still runs on a
//! later tick and its result is dropped on the floor.
//!
//! Without a live `MainContext` nothing would ever drain the queue, so jobs
//! enqueued then are dropped on the spot. A waiting `call_and_wait` caller
//! sees that immediately instead of sitting out its timeout.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use log::{debug, error, trace, warn};
use once_cell::sync::Lazy;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::host::HostContext;
use crate::server::envelope::{self, StandardError};
use crate::utils::panic_message;

/// Work executed inside the host's execution context
pub type Job = Box<dyn FnOnce(&mut dyn HostContext) + Send + 'static>;

/// Default bound for [`Dispatcher::call_and_wait`]
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(200);

static GLOBAL: Lazy<Dispatcher> = Lazy::new(|| {
    debug!("Main-context dispatcher created");
    Dispatcher::new()
});

struct Shared {
    tx: Sender<Job>,
    rx: Receiver<Job>,
    consumer_held: AtomicBool,
}

/// Producer handle. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Private dispatcher (tests, multiple embedded hosts).
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                tx,
                rx,
                consumer_held: AtomicBool::new(false),
            }),
        }
    }

    /// Process-wide dispatcher, created on first use.
    pub fn global() -> &'static Dispatcher {
        &GLOBAL
    }

    /// Claim the single consumer token.
    ///
    /// Returns `None` while another `MainContext` for this dispatcher is alive.
    pub fn main_context(&self) -> Option<MainContext> {
        if self.shared.consumer_held.swap(true, Ordering::AcqRel) {
            warn!("Main context already claimed, refusing a second consumer");
            return None;
        }
        Some(MainContext {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Whether a `MainContext` is currently alive
    pub fn has_consumer(&self) -> bool {
        self.shared.consumer_held.load(Ordering::Acquire)
    }

    /// Queue work for the next drain.
    pub fn enqueue<F>(&self, work: F)
    where
        F: FnOnce(&mut dyn HostContext) + Send + 'static,
    {
        self.enqueue_job(Box::new(work));
    }

    /// Queue an already boxed job. Dropped unexecuted when no consumer is held.
    pub fn enqueue_job(&self, job: Job) {
        if !self.has_consumer() {
            debug!("No main context held, job dropped");
            return;
        }
        // Shared keeps a receiver alive, so this only fails if the channel is torn down
        if self.shared.tx.send(job).is_err() {
            warn!("Dispatcher queue closed, job dropped");
        }
    }

    /// Run `function` inside the execution context and wait for its body.
    ///
    /// - `Ok(body)` is returned as is
    /// - `Err` or a panic becomes an `INTERNAL_ERROR` envelope with the message as details
    /// - No result within `timeout`: `INTERNAL_ERROR` with `"Request timeout"`; the
    ///   queued job is not cancelled
    /// - Job discarded unexecuted (context released): `INTERNAL_ERROR` right away
    pub fn call_and_wait<F>(&self, function: F, timeout: Duration) -> String
    where
        F: FnOnce(&mut dyn HostContext) -> anyhow::Result<String> + Send + 'static,
    {
        let (result_tx, result_rx) = bounded::<String>(1);

        self.enqueue(move |host| {
            let body = match panic::catch_unwind(AssertUnwindSafe(|| function(host))) {
                Ok(Ok(body)) => body,
                Ok(Err(e)) => {
                    error!("Error executing on main context: {:#}", e);
                    envelope::standard_error(StandardError::InternalError, Some(&e.to_string()))
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    error!("Panic executing on main context: {}", msg);
                    envelope::standard_error(StandardError::InternalError, Some(&msg))
                }
            };
            // Receiver is gone if the caller already timed out
            let _ = result_tx.send(body);
        });

        match result_rx.recv_timeout(timeout) {
            Ok(body) => body,
            Err(RecvTimeoutError::Timeout) => {
                warn!("Main context execution timeout after {:?}", timeout);
                envelope::standard_error(StandardError::InternalError, Some("Request timeout"))
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Main context discarded the request before running it");
                envelope::standard_error(
                    StandardError::InternalError,
                    Some("Request dropped before execution"),
                )
            }
        }
    }

    /// Jobs waiting for the next drain
    pub fn pending(&self) -> usize {
        self.shared.rx.len()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .field("has_consumer", &self.has_consumer())
            .finish()
    }
}

/// Consumer token. Owned by the host's tick loop.
///
/// Dropping it discards every queued job without running it and frees the
/// token for a later `main_context()` call.
pub struct MainContext {
    shared: Arc<Shared>,
}

impl MainContext {
    /// Execute the jobs queued at this instant. Returns how many ran.
    ///
    /// Jobs enqueued while draining are left for the next tick. A panicking
    /// job is logged and the rest still run.
    pub fn drain(&mut self, host: &mut dyn HostContext) -> usize {
        let available = self.shared.rx.len();
        let mut executed = 0;

        for _ in 0..available {
            let Ok(job) = self.shared.rx.try_recv() else {
                break;
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| job(host))) {
                error!("Error executing main-context job: {}", panic_message(payload.as_ref()));
            }
            executed += 1;
        }

        if executed > 0 {
            trace!("Drained {} main-context jobs", executed);
        }
        executed
    }

    /// Jobs waiting for the next drain
    pub fn pending(&self) -> usize {
        self.shared.rx.len()
    }
}

impl Drop for MainContext {
    fn drop(&mut self) {
        // Release first so producers stop queueing, then discard what is left
        self.shared.consumer_held.store(false, Ordering::Release);

        let mut discarded = 0;
        while self.shared.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Main context released, {} pending jobs discarded", discarded);
        }
    }
}

impl fmt::Debug for MainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainContext")
            .field("pending", &self.pending())
            .finish()
    }
}
