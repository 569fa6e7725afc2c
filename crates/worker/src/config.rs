use nrc_core::config::DispatchConfig;
use nrc_events::alerts::DEFAULT_FAILURE_THRESHOLD;
use nrc_events::retention::DEFAULT_RETENTION_DAYS;

/// Configuration of the background delivery services.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Dispatcher, broker and retry settings.
    pub dispatch: DispatchConfig,
    /// Settled notifications older than this are purged.
    pub retention_days: i64,
    /// Consecutive terminal failures before an endpoint is reported.
    pub alert_threshold: u32,
    /// How long in-flight deliveries may take to finish on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            retention_days: DEFAULT_RETENTION_DAYS,
            alert_threshold: DEFAULT_FAILURE_THRESHOLD,
            shutdown_timeout_secs: 30,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `NOTIFICATION_RETENTION_DAYS` | `30`    |
    /// | `ALERT_FAILURE_THRESHOLD`     | `3`     |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`    |
    ///
    /// Dispatch settings are read by [`DispatchConfig::from_env`].
    pub fn from_env() -> Self {
        let retention_days: i64 = std::env::var("NOTIFICATION_RETENTION_DAYS")
            .unwrap_or_else(|_| DEFAULT_RETENTION_DAYS.to_string())
            .parse()
            .expect("NOTIFICATION_RETENTION_DAYS must be a valid i64");

        let alert_threshold: u32 = std::env::var("ALERT_FAILURE_THRESHOLD")
            .unwrap_or_else(|_| DEFAULT_FAILURE_THRESHOLD.to_string())
            .parse()
            .expect("ALERT_FAILURE_THRESHOLD must be a valid u32");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            dispatch: DispatchConfig::from_env(),
            retention_days,
            alert_threshold,
            shutdown_timeout_secs,
        }
    }
}
