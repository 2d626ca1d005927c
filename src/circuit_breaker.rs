use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::config::Config;
use super::error::{CircuitOpenError, ConfigError, Error, ShutdownError, TimeoutError};
use super::event::{BreakerEvent, Event};
use super::state_machine::{State, StateMachine, Transition};
use super::stats::Stats;

const EVENT_CAPACITY: usize = 64;

/// Guards calls to a single named backend.
///
/// A breaker is cheap to clone; clones share the same state.
///
/// # Example
///
/// ```no_run
/// use breakwater::{CircuitBreaker, Config, Error};
///
/// # async fn example() -> Result<(), Error<std::io::Error>> {
/// let breaker = CircuitBreaker::new("inventory", Config::default()).unwrap();
///
/// let _stock = breaker
///     .fire(|| async { Ok::<_, std::io::Error>(42) })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    name: Arc<str>,
    config: Config,
    enabled: AtomicBool,
    shutdown: AtomicBool,
    shared: Mutex<Shared>,
    events: broadcast::Sender<BreakerEvent>,
}

#[derive(Debug)]
struct Shared {
    machine: StateMachine,
    timers: Timers,
}

/// Wake-ups owned by the breaker. Replaced on every transition.
#[derive(Debug, Default)]
struct Timers {
    half_open: Option<JoinHandle<()>>,
    window_reset: Option<JoinHandle<()>>,
}

impl Timers {
    fn cancel(&mut self) {
        if let Some(handle) = self.half_open.take() {
            handle.abort();
        }
        if let Some(handle) = self.window_reset.take() {
            handle.abort();
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    HalfOpen,
    WindowReset,
}

impl CircuitBreaker {
    /// Creates a new closed circuit breaker.
    pub fn new(name: impl Into<Arc<str>>, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Inner {
            name: name.into(),
            enabled: AtomicBool::new(config.enabled),
            shutdown: AtomicBool::new(false),
            shared: Mutex::new(Shared {
                machine: StateMachine::new(config.clone()),
                timers: Timers::default(),
            }),
            config,
            events,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Returns the breaker's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the configuration the breaker was built with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Executes a given future within circuit breaker.
    ///
    /// Depending on the future's result the call is recorded as a success or a failure. A call
    /// that does not settle within `response_timeout` is dropped and recorded as a timeout.
    pub async fn fire<F, Fut, T, E>(&self, f: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.is_shutdown() {
            return Err(self.shutdown_error());
        }
        if !self.is_enabled() {
            return f().await.map_err(Error::Inner);
        }
        if !self.admit() {
            return Err(Error::CircuitOpen(CircuitOpenError {
                name: self.name().to_owned(),
            }));
        }
        self.invoke(f).await
    }

    /// Executes a given future within circuit breaker, running `fallback` instead when the
    /// circuit is open.
    ///
    /// The fallback's result or error is returned as is and never affects the breaker's state.
    pub async fn fire_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        f: F,
        fallback: G,
    ) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        if self.is_shutdown() {
            return Err(self.shutdown_error());
        }
        if !self.is_enabled() {
            return f().await.map_err(Error::Inner);
        }
        if !self.admit() {
            self.inner.shared.lock().machine.on_fallback();
            debug!(breaker = %self.inner.name, "invoking fallback");
            self.emit(Event::Fallback);
            return fallback().await.map_err(Error::Inner);
        }
        self.invoke(f).await
    }

    /// Returns the current state.
    pub fn state(&self) -> State {
        let mut shared = self.inner.shared.lock();
        if let Some(transition) = shared.machine.expire_open() {
            self.apply(&mut shared, transition);
        }
        shared.machine.state()
    }

    /// Returns a snapshot of the breaker's statistics.
    pub fn stats(&self) -> Stats {
        let enabled = self.is_enabled();
        let mut shared = self.inner.shared.lock();
        if let Some(transition) = shared.machine.expire_open() {
            self.apply(&mut shared, transition);
        }
        shared.machine.stats(&self.inner.name, enabled)
    }

    /// Subscribes to the breaker's events.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.inner.events.subscribe()
    }

    /// Returns `true` unless the breaker was disabled.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Resumes guarding calls.
    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Release);
        info!(breaker = %self.inner.name, "circuit breaker enabled");
    }

    /// Lets every call through to the operation, bypassing the breaker entirely.
    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::Release);
        info!(breaker = %self.inner.name, "circuit breaker disabled");
    }

    /// Returns the breaker to its original closed state, losing statistics.
    pub fn reset(&self) {
        {
            let mut shared = self.inner.shared.lock();
            shared.timers.cancel();
            shared.machine.reset();
        }
        info!(breaker = %self.inner.name, "circuit breaker reset");
        self.emit(Event::Reset);
    }

    /// Cancels pending timers and rejects every later call.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.enabled.store(false, Ordering::Release);
        self.inner.shared.lock().timers.cancel();
        info!(breaker = %self.inner.name, "circuit breaker shut down");
        self.emit(Event::Shutdown);
    }

    /// Returns `true` once `shutdown` was called.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    fn shutdown_error<E>(&self) -> Error<E> {
        Error::Shutdown(ShutdownError {
            name: self.name().to_owned(),
        })
    }

    /// Requests permission to call the backend.
    fn admit(&self) -> bool {
        let permitted = {
            let mut shared = self.inner.shared.lock();
            if let Some(transition) = shared.machine.expire_open() {
                self.apply(&mut shared, transition);
            }
            shared.machine.on_fire()
        };

        if !permitted {
            debug!(breaker = %self.inner.name, "call rejected");
            self.emit(Event::Reject);
        }
        permitted
    }

    async fn invoke<F, Fut, T, E>(&self, f: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let result = match self.inner.config.response_timeout {
            Some(timeout) => match time::timeout(timeout, f()).await {
                Ok(result) => result.map_err(Error::Inner),
                Err(_) => Err(Error::Timeout(TimeoutError {
                    name: self.name().to_owned(),
                    timeout,
                })),
            },
            None => f().await.map_err(Error::Inner),
        };

        let timed_out = match &result {
            Ok(_) => {
                self.record(StateMachine::on_success);
                false
            }
            Err(Error::Timeout(_)) => {
                self.record(|machine| machine.on_failure(true));
                true
            }
            Err(_) => {
                self.record(|machine| machine.on_failure(false));
                false
            }
        };

        if timed_out {
            debug!(breaker = %self.inner.name, "call timed out");
            self.emit(Event::Timeout);
        }

        result
    }

    fn record<F>(&self, f: F)
    where
        F: FnOnce(&mut StateMachine) -> Option<Transition>,
    {
        let mut shared = self.inner.shared.lock();
        if let Some(transition) = f(&mut shared.machine) {
            self.apply(&mut shared, transition);
        }
    }

    /// Reacts to a transition: replaces timers, logs and publishes the event.
    fn apply(&self, shared: &mut Shared, transition: Transition) {
        shared.timers.cancel();
        let epoch = shared.machine.epoch();

        match transition {
            Transition::Opened { until, delay } => {
                warn!(
                    breaker = %self.inner.name,
                    delay_ms = delay.as_millis() as u64,
                    "circuit breaker opened"
                );
                shared.timers.half_open = self.schedule(until, Timer::HalfOpen, epoch);
                self.emit(Event::Open);
            }
            Transition::HalfOpened => {
                info!(breaker = %self.inner.name, "circuit breaker half open");
                self.emit(Event::HalfOpen);
            }
            Transition::Closed { reset_after } => {
                info!(breaker = %self.inner.name, "circuit breaker closed");
                shared.timers.window_reset =
                    self.schedule(Instant::now() + reset_after, Timer::WindowReset, epoch);
                self.emit(Event::Close);
            }
        }
    }

    /// Spawns a wake-up on the current runtime.
    ///
    /// Without a runtime the open state still expires lazily on the next call.
    fn schedule(&self, deadline: Instant, timer: Timer, epoch: u64) -> Option<JoinHandle<()>> {
        let handle = Handle::try_current().ok()?;
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);

        Some(handle.spawn(async move {
            time::sleep_until(deadline).await;
            if let Some(inner) = inner.upgrade() {
                CircuitBreaker { inner }.on_timer(timer, epoch);
            }
        }))
    }

    fn on_timer(&self, timer: Timer, epoch: u64) {
        let mut shared = self.inner.shared.lock();
        match timer {
            Timer::HalfOpen => {
                // Keep the firing task out of `Timers::cancel`.
                shared.timers.half_open.take();
                if let Some(transition) = shared.machine.on_open_timer(epoch) {
                    self.apply(&mut shared, transition);
                }
            }
            Timer::WindowReset => {
                shared.timers.window_reset.take();
                if shared.machine.on_reset_timer(epoch) {
                    debug!(breaker = %self.inner.name, "rolling window cleared");
                }
            }
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.inner.events.send(BreakerEvent {
            name: self.inner.name.clone(),
            event,
        });
    }
}
