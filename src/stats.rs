use super::state_machine::State;

/// Lifetime counters of a circuit breaker. Only `reset` brings them back to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Calls made through `fire`.
    pub fires: u64,
    /// Calls that settled successfully.
    pub successes: u64,
    /// Calls that failed with the operation's own error.
    pub failures: u64,
    /// Calls that did not settle within the response timeout.
    pub timeouts: u64,
    /// Calls rejected because the circuit was open.
    pub rejects: u64,
    /// Fallbacks invoked in place of rejected calls.
    pub fallbacks: u64,
}

/// A view on the rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStats {
    /// Successful outcomes in the window.
    pub successes: u64,
    /// Failed outcomes in the window, timeouts included.
    pub failures: u64,
    /// All outcomes in the window.
    pub total: u64,
    /// Failure percentage in range [0;100].
    pub failure_rate: f64,
}

/// Counters tracked since the last entry into the half open state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HalfOpenStats {
    /// Successes since entering half open.
    pub successes: u32,
    /// Failures since entering half open.
    pub failures: u32,
}

/// A point in time snapshot of a circuit breaker.
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// The breaker's name.
    pub name: String,
    /// The breaker's state when the snapshot was taken.
    pub state: State,
    /// Whether the breaker is enabled.
    pub enabled: bool,
    /// Lifetime counters.
    pub lifetime: Counters,
    /// Current rolling window content.
    pub window: WindowStats,
    /// Half open counters.
    pub half_open: HalfOpenStats,
}

/// A point in time snapshot of a bulkhead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadStats {
    /// The bulkhead's name.
    pub name: String,
    /// Calls currently running.
    pub running: usize,
    /// Callers currently waiting for a slot.
    pub queued: usize,
    /// Configured concurrency ceiling.
    pub max_concurrent: usize,
    /// Configured queue capacity.
    pub max_queue_size: usize,
    /// Calls admitted so far.
    pub executed: u64,
    /// Calls rejected so far.
    pub rejected: u64,
}
