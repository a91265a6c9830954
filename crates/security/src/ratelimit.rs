//! Sliding-window rate limiter.
//!
//! Tracks request timestamps per key (`user:<id>` or `user:<sender>`).
//! Thread-safe via `std::sync::Mutex` (non-async, held briefly).

use pincer_config::RateLimitConfig;
use pincer_core::gate::RateGate;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Evict idle keys once the map grows past this many entries.
const CLEANUP_THRESHOLD: usize = 10_000;

pub struct SlidingWindowLimiter {
    enabled: bool,
    max_requests: usize,
    window: Duration,
    overrides: HashMap<String, usize>,
    clients: Mutex<HashMap<String, Vec<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            enabled: true,
            max_requests,
            window,
            overrides: HashMap::new(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// A limiter that admits everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0, Duration::ZERO)
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        let mut limiter = Self::new(config.max_requests, Duration::from_secs(config.window_secs));
        limiter.overrides = config.overrides.clone();
        limiter
    }

    /// Give `key` its own request budget per window.
    pub fn with_override(mut self, key: impl Into<String>, max_requests: usize) -> Self {
        self.overrides.insert(key.into(), max_requests);
        self
    }

    fn limit_for(&self, key: &str) -> usize {
        self.overrides.get(key).copied().unwrap_or(self.max_requests)
    }

    /// Admit one request for `key` if the window has room. When it does
    /// not, also report how long until the oldest request expires.
    pub fn allow_with_wait(&self, key: &str) -> (bool, Duration) {
        if !self.enabled {
            return (true, Duration::ZERO);
        }

        let now = Instant::now();
        let limit = self.limit_for(key);
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > CLEANUP_THRESHOLD {
            Self::evict_stale(&mut clients, now, self.window);
        }

        let timestamps = clients.entry(key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= limit {
            let wait = timestamps
                .first()
                .map(|oldest| (*oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            debug!(key = %key, limit, wait_ms = wait.as_millis() as u64, "Rate limit exceeded");
            return (false, wait);
        }

        timestamps.push(now);
        (true, Duration::ZERO)
    }

    /// Requests still available for `key` in the current window.
    /// `None` when limiting is disabled.
    pub fn remaining(&self, key: &str) -> Option<usize> {
        if !self.enabled {
            return None;
        }
        let now = Instant::now();
        let clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let used = clients
            .get(key)
            .map(|ts| ts.iter().filter(|t| now.duration_since(**t) < self.window).count())
            .unwrap_or(0);
        Some(self.limit_for(key).saturating_sub(used))
    }

    /// Forget all requests recorded for `key`.
    pub fn reset(&self, key: &str) {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    /// Drop expired timestamps and keys with no live requests.
    pub fn cleanup(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        Self::evict_stale(&mut clients, Instant::now(), self.window);
    }

    fn evict_stale(clients: &mut HashMap<String, Vec<Instant>>, now: Instant, window: Duration) {
        clients.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < window);
            !timestamps.is_empty()
        });
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl RateGate for SlidingWindowLimiter {
    fn allow(&self, key: &str) -> bool {
        self.allow_with_wait(key).0
    }
}
