use crate::error::{ConnectorError, Result};
use crate::websocket::Socket;
use log::{debug, error};
use moka::sync::Cache;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Limits for one method's result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Maximum number of keys kept, `0` for no limit.
    pub max: usize,
    /// Maximum age of a cached result, `None` for no expiry.
    pub max_age: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            max: 100,
            max_age: Some(Duration::from_secs(300)),
        }
    }
}

impl CacheOptions {
    /// Builds an empty size-bounded store with expiring entries.
    fn build(&self) -> Cache<String, Value> {
        let mut builder = Cache::builder();
        if self.max > 0 {
            builder = builder.max_capacity(self.max as u64);
        }
        if let Some(age) = self.max_age {
            builder = builder.time_to_live(age);
        }
        builder.build()
    }
}

/// Collection of result caches for socket method calls, keyed by method
/// name and then by the single parameter of the call.
pub struct MethodCache {
    socket: Option<Socket>,
    defaults: CacheOptions,
    results: Mutex<HashMap<String, Cache<String, Value>>>,
}

impl MethodCache {
    /// Cache collection calling methods on `socket` for misses.
    pub fn new(socket: Option<Socket>) -> Self {
        MethodCache {
            socket,
            defaults: CacheOptions::default(),
            results: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the socket to call methods on.
    pub fn use_socket(&mut self, socket: Socket) -> &mut Self {
        self.socket = Some(socket);
        self
    }

    fn results(&self) -> MutexGuard<'_, HashMap<String, Cache<String, Value>>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when a cache exists for the method, created manually or by a
    /// prior call.
    pub fn has(&self, method: &str) -> bool {
        self.results().contains_key(method)
    }

    /// Sets up an empty cache for a method, replacing any existing one.
    pub fn create(&self, method: &str, options: Option<CacheOptions>) {
        let options = options.unwrap_or(self.defaults);
        debug!(
            "[cache] Creating cache for {} (max {}, age {:?})",
            method, options.max, options.max_age
        );
        self.results().insert(method.to_string(), options.build());
    }

    /// Returns the cached result of `method(key)`, or calls the method and
    /// caches its result for next time.
    pub async fn call(&self, method: &str, key: &str) -> Result<Value> {
        let Some(socket) = self.socket.as_ref() else {
            error!("[cache] Cache called before used with socket");
            return Err(ConnectorError::NotConnected);
        };
        let cache = self
            .results()
            .entry(method.to_string())
            .or_insert_with(|| self.defaults.build())
            .clone();
        if let Some(value) = cache.get(key) {
            debug!("[cache] Returning cached {}({})", method, key);
            return Ok(value);
        }
        debug!("[cache] Caching new results of {}({})", method, key);
        let result = socket.call(method, vec![Value::from(key)]).await?;
        cache.insert(key.to_string(), result.clone());
        Ok(result)
    }

    /// Result of a prior call, if still cached.
    pub fn get(&self, method: &str, key: &str) -> Option<Value> {
        self.results().get(method)?.get(key)
    }

    /// Number of results cached for a method.
    pub fn len(&self, method: &str) -> usize {
        let Some(cache) = self.results().get(method).cloned() else {
            return 0;
        };
        cache.run_pending_tasks();
        cache.entry_count() as usize
    }

    /// Clears a method's cached results, or only the one for `key`.
    pub fn reset(&self, method: &str, key: Option<&str>) {
        if let Some(cache) = self.results().get(method) {
            match key {
                Some(key) => cache.invalidate(key),
                None => cache.invalidate_all(),
            }
        }
    }

    /// Clears cached results for all methods, keeping their caches.
    pub fn reset_all(&self) {
        for cache in self.results().values() {
            cache.invalidate_all();
        }
    }
}
