//! database (db) connection and transient-failure policy.
use std::future::Future;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Database as DatabaseConfig;

pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: u64 = 100; // milliseconds.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry policy applied to transient connectivity failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_DELAY),
        }
    }
}

impl From<&DatabaseConfig> for RetryPolicy {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_retries: config.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            base_delay: Duration::from_millis(
                config.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY),
            ),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Whether `err` is worth retrying: connectivity, never query or constraint
/// failures.
pub fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_)
    )
}

/// Run `operation` again while it fails with a transient error.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Err(err) if is_transient(&err) && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                tracing::warn!(error = %err, attempt, ?delay, "transient database failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            result => return result,
        }
    }
}

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
    pub retry: RetryPolicy,
}

impl Database {
    /// Init database connections.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let retry_policy = RetryPolicy::from(config);
        let pool_size = config.pool_size.unwrap_or(DEFAULT_POOL_SIZE);

        let postgres = retry(retry_policy, || {
            PgPoolOptions::new()
                .max_connections(pool_size)
                .acquire_timeout(ACQUIRE_TIMEOUT)
                .connect(&config.connection_string)
        })
        .await?;

        match url::Url::parse(&config.connection_string) {
            Ok(url) => tracing::info!(
                hostname = url.host_str().unwrap_or_default(),
                db = url.path().trim_start_matches('/'),
                pool_size,
                "postgres connected"
            ),
            Err(_) => tracing::info!(pool_size, "postgres connected"),
        }

        Ok(Self {
            postgres,
            retry: retry_policy,
        })
    }

    /// Execute migrations scripts.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.postgres).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        }
    }

    fn io_error() -> sqlx::Error {
        sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = retry(fast(), || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(io_error())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = retry(fast(), || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(sqlx::Error::PoolTimedOut)
            }
        })
        .await;

        assert!(matches!(result, Err(sqlx::Error::PoolTimedOut)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = retry(fast(), || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(sqlx::Error::RowNotFound)
            }
        })
        .await;

        assert!(matches!(result, Err(sqlx::Error::RowNotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }
}
