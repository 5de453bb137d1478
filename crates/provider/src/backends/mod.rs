//! Backend implementations.
//!
//! Each backend satisfies the same [`DatabaseProvider`] contract with a
//! different capability ceiling:
//!
//! | backend    | raw SQL | transactions | schema | auth | storage |
//! |------------|---------|--------------|--------|------|---------|
//! | `postgres` | yes     | yes          | yes    | no   | no      |
//! | `supabase` | no      | no           | no     | yes  | yes     |
//! | `memory`   | no      | yes          | no     | no   | no      |
//!
//! [`DatabaseProvider`]: crate::core::DatabaseProvider

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "supabase")]
pub mod supabase;

use std::future::Future;

use crate::error::{BackendError, ProviderError, ProviderResult};

/// Retries an operation on transient failures only.
///
/// Runs `attempt` up to `retries + 1` times. Non-transient errors propagate
/// immediately; a transient error that survives the final attempt is
/// wrapped with the operation name so the exhaustion is attributable.
pub async fn retry_transient<T, F, Fut>(
    operation: &str,
    retries: u32,
    mut attempt: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut remaining = retries;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && remaining > 0 => {
                remaining -= 1;
                tracing::warn!(
                    operation,
                    error = %err,
                    remaining,
                    "transient failure, retrying"
                );
            }
            Err(err) if err.is_transient() && retries > 0 => {
                return Err(ProviderError::Backend(BackendError::Query {
                    operation: operation.to_string(),
                    message: format!("retries exhausted after {} attempts", retries + 1),
                    source: Some(Box::new(err)),
                }));
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AccessError, TransientError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ProviderError {
        ProviderError::Transient(TransientError::Network {
            operation: "query".to_string(),
            message: "connection reset".to_string(),
        })
    }

    #[tokio::test]
    async fn test_fail_twice_then_succeed_with_two_retries() {
        let calls = AtomicU32::new(0);
        let result = retry_transient("query", 2, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(vec!["row".to_string()])
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), vec!["row".to_string()]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_with_operation() {
        let result: ProviderResult<()> = retry_transient("query deliveries", 1, || async {
            Err(transient())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("query deliveries"));
        assert!(err.to_string().contains("retries exhausted"));
    }

    #[tokio::test]
    async fn test_access_denied_never_retried() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> = retry_transient("check", 5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ProviderError::Access(AccessError::ClientAccessDenied {
                    user_id: "u1".to_string(),
                    client_id: "c1".to_string(),
                }))
            }
        })
        .await;

        assert!(result.unwrap_err().is_access_denied());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_returns_bare_error() {
        let result: ProviderResult<()> = retry_transient("query", 0, || async { Err(transient()) }).await;
        // Without opt-in retries the transient error is not wrapped.
        assert!(result.unwrap_err().is_transient());
    }
}
