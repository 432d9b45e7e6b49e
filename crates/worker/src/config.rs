use std::time::Duration;

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of job runners spawned in this process (default: `1`).
    pub concurrency: usize,
    /// Upper bound on pooled database connections (default: `20`).
    pub max_connections: u32,
    /// Sleep after finding the queue empty (default: 5s).
    pub idle_interval: Duration,
    /// Sleep after a store failure before the next claim (default: 10s).
    pub error_backoff: Duration,
    /// How often a running job's row is re-read for a cancel request
    /// (default: 1s).
    pub cancel_poll_interval: Duration,
    /// How long shutdown waits for in-flight jobs (default: 30s).
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_connections: solver_db::DEFAULT_MAX_CONNECTIONS,
            idle_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(10),
            cancel_poll_interval: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default |
    /// |-----------------------------|---------|
    /// | `WORKER_CONCURRENCY`        | `1`     |
    /// | `DB_MAX_CONNECTIONS`        | `20`    |
    /// | `WORKER_IDLE_INTERVAL_SECS` | `5`     |
    /// | `WORKER_ERROR_BACKOFF_SECS` | `10`    |
    /// | `WORKER_CANCEL_POLL_MS`     | `1000`  |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`    |
    ///
    /// Panics on unparsable values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let concurrency: usize = env_or("WORKER_CONCURRENCY", "1")
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");

        let max_connections: u32 = env_or("DB_MAX_CONNECTIONS", "20")
            .parse()
            .expect("DB_MAX_CONNECTIONS must be a valid u32");

        let idle_secs: u64 = env_or("WORKER_IDLE_INTERVAL_SECS", "5")
            .parse()
            .expect("WORKER_IDLE_INTERVAL_SECS must be a valid u64");

        let backoff_secs: u64 = env_or("WORKER_ERROR_BACKOFF_SECS", "10")
            .parse()
            .expect("WORKER_ERROR_BACKOFF_SECS must be a valid u64");

        let cancel_poll_ms: u64 = env_or("WORKER_CANCEL_POLL_MS", "1000")
            .parse()
            .expect("WORKER_CANCEL_POLL_MS must be a valid u64");

        let shutdown_secs: u64 = env_or("SHUTDOWN_TIMEOUT_SECS", "30")
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            concurrency: concurrency.max(1),
            max_connections,
            idle_interval: Duration::from_secs(idle_secs),
            error_backoff: Duration::from_secs(backoff_secs),
            cancel_poll_interval: Duration::from_millis(cancel_poll_ms.max(1)),
            shutdown_timeout: Duration::from_secs(shutdown_secs),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}
