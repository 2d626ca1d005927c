use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::config::BulkheadConfig;
use super::error::{BulkheadFullError, ConfigError, Error, ShutdownError};
use super::stats::BulkheadStats;

/// Limits how many calls to a named backend run at the same time.
///
/// Calls beyond `max_concurrent` wait in a FIFO queue of `max_queue_size` entries; once the queue
/// is full (or disabled with a zero size) they are rejected at once. A bulkhead is cheap to clone;
/// clones share the same slots.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: Arc<str>,
    config: BulkheadConfig,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    running: usize,
    queue: VecDeque<oneshot::Sender<()>>,
    executed: u64,
    rejected: u64,
    shutdown: bool,
}

/// A running call's hold on a slot. Dropping it admits the next waiter.
#[derive(Debug)]
struct Slot {
    inner: Arc<Inner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.inner.release();
    }
}

/// A queued caller. If it is dropped after being handed a slot, the slot is passed on.
#[derive(Debug)]
struct Waiter {
    rx: oneshot::Receiver<()>,
    inner: Arc<Inner>,
    admitted: bool,
}

impl Waiter {
    async fn admitted<E>(mut self) -> Result<Slot, Error<E>> {
        match (&mut self.rx).await {
            Ok(()) => {
                self.admitted = true;
                Ok(Slot {
                    inner: self.inner.clone(),
                })
            }
            Err(_) => Err(self.inner.shutdown_error()),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.admitted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.inner.release();
        }
    }
}

impl Inner {
    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(tx) = state.queue.pop_front() {
            // Hand the slot over; `running` stays the same.
            if tx.send(()).is_ok() {
                state.executed += 1;
                return;
            }
        }
        state.running = state.running.saturating_sub(1);
    }

    fn shutdown_error<E>(&self) -> Error<E> {
        Error::Shutdown(ShutdownError {
            name: self.name.to_string(),
        })
    }

    fn full_error<E>(&self) -> Error<E> {
        Error::BulkheadFull(BulkheadFullError {
            name: self.name.to_string(),
            max_concurrent: self.config.max_concurrent,
            max_queue_size: self.config.max_queue_size,
        })
    }
}

enum Admission {
    Running(Slot),
    Queued(Waiter),
}

impl Bulkhead {
    /// Creates a new bulkhead.
    pub fn new(name: impl Into<Arc<str>>, config: BulkheadConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Bulkhead {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                state: Mutex::new(State::default()),
            }),
        })
    }

    /// Returns the bulkhead's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the configuration the bulkhead was built with.
    #[inline]
    pub fn config(&self) -> &BulkheadConfig {
        &self.inner.config
    }

    /// Executes a given future once a slot is available.
    ///
    /// The slot is released when the future settles, whatever the outcome, or when the returned
    /// future is dropped.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _slot = match self.admit::<E>()? {
            Admission::Running(slot) => slot,
            Admission::Queued(waiter) => waiter.admitted::<E>().await?,
        };
        f().await.map_err(Error::Inner)
    }

    fn admit<E>(&self) -> Result<Admission, Error<E>> {
        let mut state = self.inner.state.lock();

        if state.shutdown {
            return Err(self.inner.shutdown_error());
        }

        if state.running < self.inner.config.max_concurrent {
            state.running += 1;
            state.executed += 1;
            return Ok(Admission::Running(Slot {
                inner: self.inner.clone(),
            }));
        }

        // Forget waiters that gave up.
        state.queue.retain(|tx| !tx.is_closed());

        if state.queue.len() < self.inner.config.max_queue_size {
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            debug!(
                bulkhead = %self.inner.name,
                queued = state.queue.len(),
                "call queued"
            );
            return Ok(Admission::Queued(Waiter {
                rx,
                inner: self.inner.clone(),
                admitted: false,
            }));
        }

        state.rejected += 1;
        debug!(bulkhead = %self.inner.name, "call rejected");
        Err(self.inner.full_error())
    }

    /// Returns a snapshot of the bulkhead's statistics.
    pub fn stats(&self) -> BulkheadStats {
        let state = self.inner.state.lock();
        BulkheadStats {
            name: self.inner.name.to_string(),
            running: state.running,
            queued: state.queue.iter().filter(|tx| !tx.is_closed()).count(),
            max_concurrent: self.inner.config.max_concurrent,
            max_queue_size: self.inner.config.max_queue_size,
            executed: state.executed,
            rejected: state.rejected,
        }
    }

    /// Cancels every queued caller and rejects later calls. Running calls finish normally.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        let cancelled = state.queue.len();
        state.queue.clear();
        info!(bulkhead = %self.inner.name, cancelled, "bulkhead shut down");
    }

    /// Returns `true` once `shutdown` was called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }
}
