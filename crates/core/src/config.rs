//! Dispatch configuration shared by the publish pipeline and the dispatcher.

use std::time::Duration;

use crate::retry::BackoffPolicy;

/// Routing engine configuration, passed explicitly at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Separately configured broker: `postgres://...` for a durable queue in
    /// another database or `memory://` for a process-local development
    /// queue. `None` keeps dispatch jobs in the `dispatch_jobs` table of the
    /// notification database.
    pub broker_url: Option<String>,
    /// Total number of sends before an attempt becomes terminal.
    pub max_delivery_attempts: u32,
    /// First retry delay; doubles on every further failure.
    pub backoff_base_ms: u64,
    /// Upper bound for a single retry delay.
    pub backoff_cap_ms: u64,
    /// Hard timeout for one outbound callback request.
    pub delivery_timeout_ms: u64,
    /// Number of concurrent dispatch job consumers.
    pub dispatch_concurrency: usize,
    /// How long an idle consumer waits before polling the broker again.
    pub poll_interval_ms: u64,
    /// How often due retries are scanned for.
    pub retry_scan_interval_ms: u64,
    /// Maximum age of a cached channel partition in the subscription index.
    pub index_staleness_ms: u64,
}

pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 60_000;
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 4;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_RETRY_SCAN_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_INDEX_STALENESS_MS: u64 = 1_000;

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            broker_url: None,
            max_delivery_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
            dispatch_concurrency: DEFAULT_DISPATCH_CONCURRENCY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retry_scan_interval_ms: DEFAULT_RETRY_SCAN_INTERVAL_MS,
            index_staleness_ms: DEFAULT_INDEX_STALENESS_MS,
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default     |
    /// |--------------------------|-------------|
    /// | `BROKER_URL`             | unset       |
    /// | `MAX_DELIVERY_ATTEMPTS`  | `5`         |
    /// | `BACKOFF_BASE_MS`        | `1000`      |
    /// | `BACKOFF_CAP_MS`         | `60000`     |
    /// | `DELIVERY_TIMEOUT_MS`    | `10000`     |
    /// | `DISPATCH_CONCURRENCY`   | `4`         |
    /// | `POLL_INTERVAL_MS`       | `1000`      |
    /// | `RETRY_SCAN_INTERVAL_MS` | `1000`      |
    /// | `INDEX_STALENESS_MS`     | `1000`      |
    ///
    /// # Panics
    ///
    /// Panics if a variable is set but cannot be parsed, or if
    /// `MAX_DELIVERY_ATTEMPTS` / `DISPATCH_CONCURRENCY` is zero.
    pub fn from_env() -> Self {
        let config = Self {
            broker_url: std::env::var("BROKER_URL").ok().filter(|url| !url.trim().is_empty()),
            max_delivery_attempts: env_or("MAX_DELIVERY_ATTEMPTS", DEFAULT_MAX_DELIVERY_ATTEMPTS),
            backoff_base_ms: env_or("BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_cap_ms: env_or("BACKOFF_CAP_MS", DEFAULT_BACKOFF_CAP_MS),
            delivery_timeout_ms: env_or("DELIVERY_TIMEOUT_MS", DEFAULT_DELIVERY_TIMEOUT_MS),
            dispatch_concurrency: env_or("DISPATCH_CONCURRENCY", DEFAULT_DISPATCH_CONCURRENCY),
            poll_interval_ms: env_or("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            retry_scan_interval_ms: env_or("RETRY_SCAN_INTERVAL_MS", DEFAULT_RETRY_SCAN_INTERVAL_MS),
            index_staleness_ms: env_or("INDEX_STALENESS_MS", DEFAULT_INDEX_STALENESS_MS),
        };

        assert!(config.max_delivery_attempts > 0, "MAX_DELIVERY_ATTEMPTS must be at least 1");
        assert!(config.dispatch_concurrency > 0, "DISPATCH_CONCURRENCY must be at least 1");
        config
    }

    /// Jobs live next to the notifications, so publishing can record both
    /// in one transaction.
    pub fn uses_store_queue(&self) -> bool {
        self.broker_url.is_none()
    }

    /// An explicitly configured process-local queue. Jobs in it do not
    /// survive a restart.
    pub fn uses_memory_broker(&self) -> bool {
        self.broker_url
            .as_deref()
            .is_some_and(|url| url.starts_with("memory://"))
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
            self.max_delivery_attempts,
        )
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Lease placed on an attempt while it is in flight. Twice the request
    /// timeout, so a live dispatcher always finishes before the lease ends.
    pub fn delivery_lease(&self) -> Duration {
        self.delivery_timeout().saturating_mul(2)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_scan_interval(&self) -> Duration {
        Duration::from_millis(self.retry_scan_interval_ms)
    }

    pub fn index_staleness(&self) -> Duration {
        Duration::from_millis(self.index_staleness_ms)
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid number: {e}")),
        Err(_) => default,
    }
}
