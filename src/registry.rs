use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::bulkhead::Bulkhead;
use super::config::BulkheadConfig;
use super::error::ConfigError;
use super::stats::BulkheadStats;

/// Named instances, constructed at most once per name.
#[derive(Debug)]
pub(crate) struct Registry<V> {
    entries: RwLock<HashMap<Arc<str>, V>>,
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Registry {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Registry<V>
where
    V: Clone,
{
    /// Returns the entry for `name`, building it with `make` if there is none yet.
    ///
    /// `make` runs under the write lock, so concurrent callers never build twice.
    pub(crate) fn get_or_try_insert<F, E>(&self, name: &str, make: F) -> Result<V, E>
    where
        F: FnOnce(Arc<str>) -> Result<V, E>,
    {
        if let Some(value) = self.entries.read().get(name) {
            return Ok(value.clone());
        }

        let mut entries = self.entries.write();
        if let Some(value) = entries.get(name) {
            return Ok(value.clone());
        }

        let key: Arc<str> = Arc::from(name);
        let value = make(key.clone())?;
        entries.insert(key, value.clone());
        Ok(value)
    }

    pub(crate) fn get(&self, name: &str) -> Option<V> {
        self.entries.read().get(name).cloned()
    }

    pub(crate) fn remove(&self, name: &str) -> Option<V> {
        self.entries.write().remove(name)
    }

    /// Empties the registry, handing back what it held.
    pub(crate) fn drain(&self) -> Vec<V> {
        self.entries.write().drain().map(|(_, value)| value).collect()
    }

    /// Clones every entry out so callers can work on them without holding the lock.
    pub(crate) fn snapshot(&self) -> Vec<(Arc<str>, V)> {
        self.entries
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.read().keys().map(|name| name.to_string()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }
}

/// Named bulkheads created lazily on first use.
///
/// The first construction of a name wins; later configurations for it are ignored.
#[derive(Debug)]
pub struct BulkheadRegistry {
    defaults: RwLock<BulkheadConfig>,
    bulkheads: Registry<Bulkhead>,
}

impl Default for BulkheadRegistry {
    fn default() -> Self {
        BulkheadRegistry::new(BulkheadConfig::default())
    }
}

impl BulkheadRegistry {
    /// Creates an empty registry.
    pub fn new(defaults: BulkheadConfig) -> Self {
        BulkheadRegistry {
            defaults: RwLock::new(defaults),
            bulkheads: Registry::default(),
        }
    }

    /// Returns the bulkhead for `name`, creating it from `config` or the defaults.
    pub fn get(
        &self,
        name: &str,
        config: Option<BulkheadConfig>,
    ) -> Result<Bulkhead, ConfigError> {
        self.bulkheads.get_or_try_insert(name, |name| {
            let config = config.unwrap_or_else(|| self.defaults.read().clone());
            Bulkhead::new(name, config)
        })
    }

    /// Returns the bulkhead for `name` if it exists.
    pub fn lookup(&self, name: &str) -> Option<Bulkhead> {
        self.bulkheads.get(name)
    }

    /// Replaces the defaults used for bulkheads created from now on.
    pub fn set_default_config(&self, config: BulkheadConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.defaults.write() = config;
        Ok(())
    }

    /// Returns the statistics of every registered bulkhead.
    pub fn get_all_stats(&self) -> HashMap<String, BulkheadStats> {
        self.bulkheads
            .snapshot()
            .into_iter()
            .map(|(name, bulkhead)| (name.to_string(), bulkhead.stats()))
            .collect()
    }

    /// Shuts down the bulkhead for `name` and forgets it.
    pub fn shutdown(&self, name: &str) -> bool {
        match self.bulkheads.remove(name) {
            Some(bulkhead) => {
                bulkhead.shutdown();
                true
            }
            None => false,
        }
    }

    /// Shuts down every bulkhead and empties the registry.
    pub fn shutdown_all(&self) {
        for bulkhead in self.bulkheads.drain() {
            bulkhead.shutdown();
        }
    }

    /// Returns the number of registered bulkheads.
    pub fn len(&self) -> usize {
        self.bulkheads.len()
    }

    /// Returns `true` if no bulkhead is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
