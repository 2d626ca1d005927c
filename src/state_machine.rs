use std::fmt::{self, Display};
use std::time::Duration;

use tokio::time::Instant;

use super::config::Config;
use super::rolling_window::{Outcome, RollingWindow};
use super::stats::{Counters, HalfOpenStats, Stats, WindowStats};

/// States of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// A closed breaker is operating normally and allowing.
    Closed,
    /// An open breaker has tripped and will not allow requests through until an interval expired.
    Open,
    /// A half open breaker has completed its wait interval and will allow requests to probe
    /// the backend.
    HalfOpen,
}

impl State {
    /// Returns a string value for the state identifier.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Open => "open",
            State::Closed => "closed",
            State::HalfOpen => "half_open",
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { until: Instant },
    HalfOpen,
}

/// A state change the owner of the state machine must react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Entered `Open`; a single move to `HalfOpen` is due at `until`.
    Opened { until: Instant, delay: Duration },
    /// Entered `HalfOpen`.
    HalfOpened,
    /// Entered `Closed` from `HalfOpen`; the window is due to be cleared after `reset_timeout`.
    Closed { reset_after: Duration },
}

/// A circuit breaker's state machine.
///
/// It is implemented via a finite state machine with three states: `Closed`, `Open` and
/// `HalfOpen`. The state machine does not know anything about the backend's state by itself,
/// but uses the information provided via `on_success` and `on_failure`. Before communicating
/// with the backend, the permission to do so must be obtained via `on_fire`.
///
/// The state changes from `Closed` to `Open` once the rolling window holds at least
/// `volume_threshold` outcomes and either the failure count or the failure percentage crosses its
/// threshold. All access to the backend is then blocked for `open_timeout`.
///
/// After `open_timeout` has elapsed the state changes to `HalfOpen`. A single failure in this
/// state reopens the breaker; `success_threshold` successes close it.
///
/// Every transition bumps an epoch. Deferred work scheduled by the owner carries the epoch it was
/// scheduled under and is ignored once the epoch moved on.
#[derive(Debug)]
pub(crate) struct StateMachine {
    config: Config,
    phase: Phase,
    window: RollingWindow,
    lifetime: Counters,
    half_open: HalfOpenStats,
    epoch: u64,
}

impl StateMachine {
    /// Creates a new closed state machine. `config` must be validated.
    pub(crate) fn new(config: Config) -> Self {
        let window = RollingWindow::new(config.rolling_window, config.window_buckets);
        StateMachine {
            config,
            phase: Phase::Closed,
            window,
            lifetime: Counters::default(),
            half_open: HalfOpenStats::default(),
            epoch: 0,
        }
    }

    #[inline]
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn state(&self) -> State {
        match self.phase {
            Phase::Closed => State::Closed,
            Phase::Open { .. } => State::Open,
            Phase::HalfOpen => State::HalfOpen,
        }
    }

    /// Moves an expired `Open` state to `HalfOpen`.
    pub(crate) fn expire_open(&mut self) -> Option<Transition> {
        match self.phase {
            Phase::Open { until } if Instant::now() >= until => Some(self.transit_to_half_open()),
            _ => None,
        }
    }

    /// The half open timer scheduled under `epoch` has fired.
    pub(crate) fn on_open_timer(&mut self, epoch: u64) -> Option<Transition> {
        match self.phase {
            Phase::Open { .. } if epoch == self.epoch => Some(self.transit_to_half_open()),
            _ => None,
        }
    }

    /// The deferred window reset scheduled under `epoch` has fired.
    pub(crate) fn on_reset_timer(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.window.reset();
        true
    }

    /// Accounts a call and tells whether it may reach the backend.
    ///
    /// Call `expire_open` first.
    pub(crate) fn on_fire(&mut self) -> bool {
        self.lifetime.fires += 1;
        if let Phase::Open { .. } = self.phase {
            self.lifetime.rejects += 1;
            return false;
        }
        true
    }

    /// Records a fallback invocation.
    #[inline]
    pub(crate) fn on_fallback(&mut self) {
        self.lifetime.fallbacks += 1;
    }

    /// Records a successful call.
    pub(crate) fn on_success(&mut self) -> Option<Transition> {
        self.lifetime.successes += 1;
        self.window.record(Outcome::Success);

        if let Phase::HalfOpen = self.phase {
            self.half_open.successes += 1;
            if self.half_open.successes >= self.config.success_threshold {
                return Some(self.transit_to_closed());
            }
        }
        None
    }

    /// Records a failed call. A timeout counts as a failure for the window.
    pub(crate) fn on_failure(&mut self, timed_out: bool) -> Option<Transition> {
        if timed_out {
            self.lifetime.timeouts += 1;
        } else {
            self.lifetime.failures += 1;
        }
        self.window.record(Outcome::Failure);

        match self.phase {
            Phase::Closed => {
                if self.should_trip() {
                    return Some(self.transit_to_open());
                }
                None
            }
            Phase::HalfOpen => {
                self.half_open.failures += 1;
                Some(self.transit_to_open())
            }
            // A call admitted before the trip; the breaker is already open.
            Phase::Open { .. } => None,
        }
    }

    /// Returns the state machine to its original closed state, losing statistics.
    pub(crate) fn reset(&mut self) {
        self.phase = Phase::Closed;
        self.window.reset();
        self.lifetime = Counters::default();
        self.half_open = HalfOpenStats::default();
        self.epoch += 1;
    }

    pub(crate) fn stats(&mut self, name: &str, enabled: bool) -> Stats {
        let counts = self.window.counts();
        Stats {
            name: name.to_owned(),
            state: self.state(),
            enabled,
            lifetime: self.lifetime,
            window: WindowStats {
                successes: counts.successes,
                failures: counts.failures,
                total: counts.total(),
                failure_rate: counts.failure_rate(),
            },
            half_open: self.half_open,
        }
    }

    fn should_trip(&mut self) -> bool {
        let counts = self.window.counts();
        if counts.total() < u64::from(self.config.volume_threshold) {
            return false;
        }
        counts.failures >= u64::from(self.config.failure_threshold)
            || counts.failure_rate() >= self.config.failure_threshold_percent
    }

    fn transit_to_open(&mut self) -> Transition {
        let delay = self.config.open_timeout;
        let until = Instant::now() + delay;
        self.phase = Phase::Open { until };
        self.epoch += 1;
        Transition::Opened { until, delay }
    }

    fn transit_to_half_open(&mut self) -> Transition {
        self.phase = Phase::HalfOpen;
        self.half_open = HalfOpenStats::default();
        self.epoch += 1;
        Transition::HalfOpened
    }

    fn transit_to_closed(&mut self) -> Transition {
        self.phase = Phase::Closed;
        self.epoch += 1;
        Transition::Closed {
            reset_after: self.config.reset_timeout,
        }
    }
}
