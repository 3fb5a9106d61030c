use crate::error::{CoreError, CoreResult};
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub type DbPool = Arc<Pool<AsyncPgConnection>>;
pub type DbConn = Object<AsyncPgConnection>;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 50;

pub fn connect(database_url: &str) -> DbPool {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Arc::new(
        Pool::builder(manager)
            .build()
            .expect("Failed to create pool."),
    )
}

pub async fn get_conn(pool: &DbPool) -> CoreResult<DbConn> {
    Ok(pool.get().await?)
}

/// Re-runs an operation that failed with a transient error (serialization
/// failure, deadlock, pool exhaustion) up to 3 times with exponential jitter.
/// Business-rule errors surface immediately and are never retried.
pub async fn with_retries<T, Fut, F>(mut op: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                attempt += 1;
                let backoff = BACKOFF_BASE_MS * (1u64 << attempt)
                    + rand::thread_rng().gen_range(0..BACKOFF_BASE_MS);
                warn!(attempt, backoff_ms = backoff, "retrying transient failure: {err}");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Conflict;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_up_to_limit() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = with_retries(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::unavailable("db down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_business_errors() {
        let calls = AtomicU32::new(0);
        let result: CoreResult<()> = with_retries(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::from(Conflict::MaxSpinsReached)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retries(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CoreError::unavailable("serialization failure"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }
}
