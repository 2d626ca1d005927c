use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;
use tracing::info;

use super::circuit_breaker::CircuitBreaker;
use super::config::{Config, ConfigOverrides};
use super::error::ConfigError;
use super::registry::Registry;
use super::stats::Stats;

/// Creates and keeps named circuit breakers.
///
/// A breaker is built the first time its name is requested, from the factory's defaults with the
/// caller's overrides merged on top. Later requests for the same name return that breaker as is,
/// whatever overrides they carry.
///
/// # Example
///
/// ```
/// use breakwater::{CircuitBreakerFactory, Config, ConfigOverrides};
///
/// let factory = CircuitBreakerFactory::new(Config::default());
/// let overrides = ConfigOverrides {
///     failure_threshold: Some(3),
///     ..Default::default()
/// };
///
/// let payments = factory.get("payments", Some(&overrides)).unwrap();
/// assert_eq!(3, payments.config().failure_threshold);
/// assert_eq!(1, factory.len());
/// ```
#[derive(Debug)]
pub struct CircuitBreakerFactory {
    defaults: RwLock<Config>,
    breakers: Registry<CircuitBreaker>,
}

impl Default for CircuitBreakerFactory {
    fn default() -> Self {
        CircuitBreakerFactory::new(Config::default())
    }
}

impl CircuitBreakerFactory {
    /// Creates an empty factory handing out breakers built from `defaults`.
    pub fn new(defaults: Config) -> Self {
        CircuitBreakerFactory {
            defaults: RwLock::new(defaults),
            breakers: Registry::default(),
        }
    }

    /// Returns the process wide factory, created with the default configuration on first use.
    pub fn global() -> &'static CircuitBreakerFactory {
        static GLOBAL: OnceLock<CircuitBreakerFactory> = OnceLock::new();
        GLOBAL.get_or_init(CircuitBreakerFactory::default)
    }

    /// Returns the breaker for `name`, building it on first request.
    ///
    /// Fails only when the merged configuration of a new breaker is invalid; in that case
    /// nothing is registered.
    pub fn get(
        &self,
        name: &str,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<CircuitBreaker, ConfigError> {
        self.breakers.get_or_try_insert(name, |name| {
            let defaults = self.defaults.read();
            let config = match overrides {
                Some(overrides) => overrides.merge(&defaults),
                None => defaults.clone(),
            };
            drop(defaults);

            info!(breaker = %name, "circuit breaker created");
            CircuitBreaker::new(name, config)
        })
    }

    /// Returns the breaker for `name`, building it from the defaults on first request.
    pub fn get_default(&self, name: &str) -> Result<CircuitBreaker, ConfigError> {
        self.get(name, None)
    }

    /// Returns the breaker for `name` without creating it.
    pub fn lookup(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.get(name)
    }

    /// Returns the names of every registered breaker, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.breakers.names()
    }

    /// Replaces the defaults. Breakers that already exist keep their configuration.
    pub fn set_default_config(&self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        *self.defaults.write() = config;
        Ok(())
    }

    /// Returns a copy of the current defaults.
    pub fn default_config(&self) -> Config {
        self.defaults.read().clone()
    }

    /// Forgets the breaker for `name`. Clones held elsewhere keep working.
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.remove(name)
    }

    /// Shuts down the breaker for `name` and forgets it.
    ///
    /// Returns `false` if no such breaker was registered.
    pub fn shutdown(&self, name: &str) -> bool {
        match self.breakers.remove(name) {
            Some(breaker) => {
                breaker.shutdown();
                true
            }
            None => false,
        }
    }

    /// Returns statistics of every breaker.
    ///
    /// Snapshots are taken one breaker at a time, so entries may be slightly apart in time.
    pub fn get_all_stats(&self) -> HashMap<String, Stats> {
        self.breakers
            .snapshot()
            .into_iter()
            .map(|(name, breaker)| (name.to_string(), breaker.stats()))
            .collect()
    }

    /// Resets every breaker.
    pub fn reset_all(&self) {
        for (_, breaker) in self.breakers.snapshot() {
            breaker.reset();
        }
    }

    /// Shuts down every breaker and empties the factory.
    pub fn shutdown_all(&self) {
        let breakers = self.breakers.drain();
        info!(count = breakers.len(), "shutting down circuit breakers");
        for breaker in breakers {
            breaker.shutdown();
        }
    }

    /// Returns the number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns `true` if no breaker is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
