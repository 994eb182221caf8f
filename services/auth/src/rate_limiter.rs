//! Login attempt limiter for slowing down password guessing

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Past this many tracked keys, stale entries are swept on the next failure
const SWEEP_THRESHOLD: usize = 10_000;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failed attempts allowed inside one window
    pub max_failures: u32,
    /// Window in which failures are counted
    pub window: Duration,
    /// How long a key stays blocked once over the limit
    pub block: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window: Duration::from_secs(300),
            block: Duration::from_secs(900),
        }
    }
}

#[derive(Debug)]
struct Entry {
    failures: u32,
    window_start: Instant,
    blocked_until: Option<Instant>,
}

impl Entry {
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        let block_over = self.blocked_until.is_none_or(|until| now >= until);
        block_over && now.duration_since(self.window_start) >= window
    }
}

/// Limiter key for a login attempt
///
/// Failures are counted per username and client address, so guessing from
/// one address does not lock the user out everywhere. `-` stands in for an
/// unknown client; neither form of address contains `/`.
pub fn attempt_key(username: &str, client: Option<IpAddr>) -> String {
    match client {
        Some(ip) => format!("{ip}/{username}"),
        None => format!("-/{username}"),
    }
}

/// Tracks failed logins per key (see [`attempt_key`])
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `key` may attempt a login right now
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let blocked_until = match entries.get(key) {
            Some(entry) => entry.blocked_until,
            None => return true,
        };

        match blocked_until {
            Some(until) if now < until => false,
            Some(_) => {
                entries.remove(key);
                true
            }
            None => true,
        }
    }

    /// Count a failed attempt for `key`
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if entries.len() >= SWEEP_THRESHOLD {
            let window = self.config.window;
            entries.retain(|_, entry| !entry.is_stale(now, window));
        }

        let entry = entries.entry(key.to_string()).or_insert(Entry {
            failures: 0,
            window_start: now,
            blocked_until: None,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.failures = 0;
            entry.window_start = now;
        }

        entry.failures += 1;
        if entry.failures >= self.config.max_failures {
            entry.blocked_until = Some(now + self.config.block);
            warn!(
                "Blocked logins for {} for {} seconds after {} failures",
                key,
                self.config.block.as_secs(),
                entry.failures
            );
        }
    }

    /// Forget past failures for `key`, after a successful login
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}
