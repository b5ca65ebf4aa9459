//! Worker configuration loaded from environment variables.

/// Worker process configuration.
///
/// All fields except `database_url` have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Postgres connection string (required).
    pub database_url: String,
    /// Base URL of the generation gateway.
    pub generator_url: String,
    /// Maximum pooled database connections.
    pub max_db_connections: u32,
    /// Dispatcher polling interval in seconds.
    pub poll_interval_secs: u64,
    /// Age after which an untouched `processing` job is requeued.
    pub stale_after_secs: u64,
    /// Blind retries per step after a failed validation.
    pub max_step_retries: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                 |
    /// |-----------------------|-------------------------|
    /// | `DATABASE_URL`        | (required)              |
    /// | `GENERATOR_URL`       | `http://localhost:8080` |
    /// | `MAX_DB_CONNECTIONS`  | `5`                     |
    /// | `POLL_INTERVAL_SECS`  | `1`                     |
    /// | `STALE_AFTER_SECS`    | `900`                   |
    /// | `MAX_STEP_RETRIES`    | `2`                     |
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let generator_url = std::env::var("GENERATOR_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into());

        let max_db_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("MAX_DB_CONNECTIONS must be a valid u32");

        let poll_interval_secs: u64 = std::env::var("POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("POLL_INTERVAL_SECS must be a valid u64");

        let stale_after_secs: u64 = std::env::var("STALE_AFTER_SECS")
            .unwrap_or_else(|_| "900".into())
            .parse()
            .expect("STALE_AFTER_SECS must be a valid u64");

        let max_step_retries: u32 = std::env::var("MAX_STEP_RETRIES")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("MAX_STEP_RETRIES must be a valid u32");

        Self {
            database_url,
            generator_url,
            max_db_connections,
            poll_interval_secs,
            stale_after_secs,
            max_step_retries,
        }
    }
}
