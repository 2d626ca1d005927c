//! Resilience primitives for calls to unreliable backends.
//!
//! * `CircuitBreaker` detects failures and stops calling a backend that keeps failing, giving it
//!   time to recover before probing it again.
//! * `RetryPolicy` retries transient failures with exponential backoff and jitter.
//! * `Bulkhead` caps how many calls to a backend run at once, queueing a bounded number of
//!   callers.
//! * `CircuitBreakerFactory` and `BulkheadRegistry` hand out named instances.
//!
//! See https://martinfowler.com/bliki/CircuitBreaker.html
//!
//! # Example
//!
//! ```no_run
//! use std::io;
//!
//! use breakwater::{CircuitBreakerFactory, Error, RetryConfig, RetryPolicy};
//!
//! async fn fetch_inventory() -> Result<u32, io::Error> {
//!     Ok(42)
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreakerFactory::global().get_default("inventory")?;
//! let retry = RetryPolicy::new(RetryConfig::default())?;
//!
//! let _stock: Result<u32, Error<io::Error>> = retry
//!     .execute(|| breaker.fire(fetch_inventory))
//!     .await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

mod bulkhead;
mod circuit_breaker;
mod classifier;
mod config;
mod error;
mod event;
mod factory;
mod registry;
mod retry;
mod rolling_window;
mod state_machine;
mod stats;

pub use self::bulkhead::Bulkhead;
pub use self::circuit_breaker::CircuitBreaker;
pub use self::classifier::{Always, DefaultClassifier, Never, RetryClassifier, Retryable};
pub use self::config::{BulkheadConfig, Config, ConfigOverrides, RetryConfig};
pub use self::error::{
    BulkheadFullError, CircuitOpenError, ConfigError, Error, ShutdownError, TimeoutError,
};
pub use self::event::{BreakerEvent, Event};
pub use self::factory::CircuitBreakerFactory;
pub use self::registry::BulkheadRegistry;
pub use self::retry::RetryPolicy;
pub use self::rolling_window::{Outcome, RollingWindow, WindowCounts};
pub use self::state_machine::State;
pub use self::stats::{BulkheadStats, Counters, HalfOpenStats, Stats, WindowStats};
