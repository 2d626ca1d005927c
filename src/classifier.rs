use std::io;

use super::error::{BulkheadFullError, CircuitOpenError, Error, ShutdownError, TimeoutError};

/// Evaluates if an error is worth another attempt.
pub trait RetryClassifier<E> {
    /// Must return `true` if the call should be retried after this error.
    fn is_retryable(&self, err: &E) -> bool;
}

impl<E, F> RetryClassifier<E> for F
where
    F: Fn(&E) -> bool,
{
    fn is_retryable(&self, err: &E) -> bool {
        self(err)
    }
}

/// An error that knows whether it is transient.
pub trait Retryable {
    /// Returns `true` for transient errors: connection level failures, timeouts and circuit open
    /// rejections.
    fn is_retryable(&self) -> bool;
}

/// Delegates to the error's own `Retryable` implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl<E> RetryClassifier<E> for DefaultClassifier
where
    E: Retryable,
{
    fn is_retryable(&self, err: &E) -> bool {
        Retryable::is_retryable(err)
    }
}

/// Classify all error kinds as retryable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl<E> RetryClassifier<E> for Always {
    fn is_retryable(&self, _: &E) -> bool {
        true
    }
}

/// Classify all error kinds as permanent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl<E> RetryClassifier<E> for Never {
    fn is_retryable(&self, _: &E) -> bool {
        false
    }
}

impl Retryable for io::Error {
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::AddrNotAvailable
                | io::ErrorKind::TimedOut
        )
    }
}

impl Retryable for tokio::time::error::Elapsed {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for CircuitOpenError {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for TimeoutError {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for BulkheadFullError {
    fn is_retryable(&self) -> bool {
        false
    }
}

impl Retryable for ShutdownError {
    fn is_retryable(&self) -> bool {
        false
    }
}

impl<E> Retryable for Error<E>
where
    E: Retryable,
{
    fn is_retryable(&self) -> bool {
        match self {
            Error::Inner(err) => Retryable::is_retryable(err),
            Error::CircuitOpen(err) => err.is_retryable(),
            Error::Timeout(err) => err.is_retryable(),
            Error::BulkheadFull(err) => err.is_retryable(),
            Error::Shutdown(err) => err.is_retryable(),
        }
    }
}
