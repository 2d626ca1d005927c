use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::time::Duration;

/// A call was rejected because the circuit breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker '{name}' is open")]
pub struct CircuitOpenError {
    /// The breaker's name.
    pub name: String,
}

/// A call did not settle within the breaker's response timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker '{name}' timed out after {timeout:?}")]
pub struct TimeoutError {
    /// The breaker's name.
    pub name: String,
    /// The response timeout that elapsed.
    pub timeout: Duration,
}

/// A call was rejected because the bulkhead has no free slot and no room in its queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "bulkhead '{name}' is full (max_concurrent: {max_concurrent}, max_queue_size: {max_queue_size})"
)]
pub struct BulkheadFullError {
    /// The bulkhead's name.
    pub name: String,
    /// Configured concurrency ceiling.
    pub max_concurrent: usize,
    /// Configured queue capacity.
    pub max_queue_size: usize,
}

/// A call was rejected because the instance has been shut down.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{name}' has been shut down")]
pub struct ShutdownError {
    /// The instance's name.
    pub name: String,
}

/// A configuration value is out of its allowed range.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The value must be at least `min`.
    #[error("`{field}` must be at least {min}, got {value}")]
    TooSmall {
        /// Field name.
        field: &'static str,
        /// Minimum allowed value.
        min: f64,
        /// Provided value.
        value: f64,
    },
    /// The value must lie in `[min, max]`.
    #[error("`{field}` must be in range [{min}; {max}], got {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
        /// Provided value.
        value: f64,
    },
    /// Two durations are inconsistent with each other.
    #[error("`{field}` ({value:?}) must not exceed `{limit_field}` ({limit:?})")]
    Exceeds {
        /// Field name.
        field: &'static str,
        /// Provided value.
        value: Duration,
        /// The field it is bounded by.
        limit_field: &'static str,
        /// The bound.
        limit: Duration,
    },
}

/// An error returned by `CircuitBreaker::fire` and `Bulkhead::execute`.
#[derive(Debug, PartialEq)]
pub enum Error<E> {
    /// An error from inner call.
    Inner(E),
    /// The call was rejected because the circuit is open.
    CircuitOpen(CircuitOpenError),
    /// The call did not settle in time.
    Timeout(TimeoutError),
    /// The call was rejected by a bulkhead.
    BulkheadFull(BulkheadFullError),
    /// The instance has been shut down.
    Shutdown(ShutdownError),
}

impl<E> Error<E> {
    /// Returns `true` if the error was imposed by the guard itself and the operation was never
    /// invoked.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::CircuitOpen(_) | Error::BulkheadFull(_) | Error::Shutdown(_)
        )
    }

    /// Returns `true` for a response timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Returns the operation's own error, if that is what this is.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Error::Inner(err) => Some(err),
            _ => None,
        }
    }

    /// Maps the inner error, keeping rejections as they are.
    pub fn map_inner<F, U>(self, f: F) -> Error<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Error::Inner(err) => Error::Inner(f(err)),
            Error::CircuitOpen(err) => Error::CircuitOpen(err),
            Error::Timeout(err) => Error::Timeout(err),
            Error::BulkheadFull(err) => Error::BulkheadFull(err),
            Error::Shutdown(err) => Error::Shutdown(err),
        }
    }
}

impl<E> Error<Error<E>> {
    /// Collapses the nesting produced by running a circuit breaker inside a bulkhead.
    pub fn flatten(self) -> Error<E> {
        match self {
            Error::Inner(inner) => inner,
            Error::CircuitOpen(err) => Error::CircuitOpen(err),
            Error::Timeout(err) => Error::Timeout(err),
            Error::BulkheadFull(err) => Error::BulkheadFull(err),
            Error::Shutdown(err) => Error::Shutdown(err),
        }
    }
}

impl<E> Display for Error<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Inner(err) => write!(f, "{}", err),
            Error::CircuitOpen(err) => write!(f, "{}", err),
            Error::Timeout(err) => write!(f, "{}", err),
            Error::BulkheadFull(err) => write!(f, "{}", err),
            Error::Shutdown(err) => write!(f, "{}", err),
        }
    }
}

impl<E> StdError for Error<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Inner(ref err) => Some(err),
            _ => None,
        }
    }
}

impl<E> From<CircuitOpenError> for Error<E> {
    fn from(err: CircuitOpenError) -> Self {
        Error::CircuitOpen(err)
    }
}

impl<E> From<TimeoutError> for Error<E> {
    fn from(err: TimeoutError) -> Self {
        Error::Timeout(err)
    }
}

impl<E> From<BulkheadFullError> for Error<E> {
    fn from(err: BulkheadFullError) -> Self {
        Error::BulkheadFull(err)
    }
}

impl<E> From<ShutdownError> for Error<E> {
    fn from(err: ShutdownError) -> Self {
        Error::Shutdown(err)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn inner_error_is_surfaced_unchanged() {
        let err: Error<io::Error> = Error::Inner(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!("boom", err.to_string());
        assert!(err.source().is_some());
        assert!(!err.is_rejection());
        assert_eq!("boom", err.into_inner().unwrap().to_string());
    }

    #[test]
    fn rejections_have_no_source() {
        let err: Error<io::Error> = CircuitOpenError {
            name: "db".into(),
        }
        .into();
        assert!(err.is_rejection());
        assert!(err.source().is_none());
        assert_eq!("circuit breaker 'db' is open", err.to_string());
    }

    #[test]
    fn timeout_is_not_a_rejection() {
        let err: Error<()> = TimeoutError {
            name: "db".into(),
            timeout: Duration::from_secs(1),
        }
        .into();
        assert!(err.is_timeout());
        assert!(!err.is_rejection());
    }

    #[test]
    fn flatten_nested_errors() {
        let nested: Error<Error<&str>> = Error::Inner(Error::Inner("inner"));
        assert_eq!(Error::Inner("inner"), nested.flatten());

        let full = BulkheadFullError {
            name: "db".into(),
            max_concurrent: 1,
            max_queue_size: 0,
        };
        let nested: Error<Error<&str>> = Error::BulkheadFull(full.clone());
        assert_eq!(Error::BulkheadFull(full), nested.flatten());
    }
}
