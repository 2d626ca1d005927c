use std::fmt::{self, Display};
use std::sync::Arc;

/// Something that happened to a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The breaker tripped.
    Open,
    /// The open timeout elapsed and the breaker started probing.
    HalfOpen,
    /// Probing succeeded and the breaker closed.
    Close,
    /// A call was rejected because the breaker is open.
    Reject,
    /// A call did not settle within the response timeout.
    Timeout,
    /// A fallback ran in place of a rejected call.
    Fallback,
    /// The breaker was reset by an operator.
    Reset,
    /// The breaker was shut down.
    Shutdown,
}

impl Event {
    /// Returns a string value for the event identifier.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Open => "open",
            Event::HalfOpen => "half_open",
            Event::Close => "close",
            Event::Reject => "reject",
            Event::Timeout => "timeout",
            Event::Fallback => "fallback",
            Event::Reset => "reset",
            Event::Shutdown => "shutdown",
        }
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event tagged with the name of the breaker that emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerEvent {
    /// The breaker's name.
    pub name: Arc<str>,
    /// What happened.
    pub event: Event,
}
