use std::{error::Error, future::Future, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("concurrency conflict")]
pub struct ConflictError;

const MAX_RETRIES: u64 = 10;
const BACKOFF_STEP: Duration = Duration::from_millis(25);

/// This function implements a retry loop for concurrency conflicts. It will keep retrying the
/// callback as long as the callback returns an error whose chain includes [`ConflictError`].
/// After [`MAX_RETRIES`] attempts the last result is returned as is, conflict or not.
///
/// Every attempt must be a complete unit of work: the callback opens its own database
/// transaction, so a conflicting attempt has already been rolled back when it is retried.
pub async fn retry_loop<F: Future<Output = Result<T, E>>, T, E: Error + 'static>(
    mut cb: impl FnMut() -> F,
) -> Result<T, E> {
    for i in 1..MAX_RETRIES {
        match cb().await {
            Ok(result) => return Ok(result),
            Err(e) if is_conflict(Some(&e)) => {
                let timeout = BACKOFF_STEP * i as u32;
                log::info!("got a conflict error, sleeping for {:?}", timeout);
                tokio::time::sleep(timeout).await;
            }
            Err(e) => return Err(e),
        }
    }
    cb().await
}

pub(crate) fn is_conflict(e: Option<&(dyn Error + 'static)>) -> bool {
    e.map(|e| e.is::<ConflictError>() || is_conflict(e.source()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Error)]
    enum WorkflowError {
        #[error("{0}")]
        Conflict(#[from] ConflictError),
        #[error("not found")]
        NotFound,
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let attempts = AtomicUsize::new(0);
        let result = retry_loop(|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(WorkflowError::Conflict(ConflictError))
            } else {
                Ok("settled")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "settled");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), _> = retry_loop(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(WorkflowError::NotFound)
        })
        .await;
        assert!(matches!(result, Err(WorkflowError::NotFound)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn conflicts_are_found_through_the_source_chain() {
        let e = WorkflowError::Conflict(ConflictError);
        assert!(is_conflict(Some(&e)));
        assert!(!is_conflict(Some(&WorkflowError::NotFound)));
    }
}
