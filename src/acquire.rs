use log::{info, warn};
use std::future::Future;
use std::time::Duration;

use crate::error::{SourceError, SourceKind};

/// Run a device/network acquisition with a hard deadline.
///
/// An elapsed deadline maps to [`SourceError::Timeout`]. The pending future
/// is dropped at that point, which releases any partially opened handle it
/// owned.
pub async fn acquire<T, F>(kind: SourceKind, timeout: Duration, future: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, SourceError>>,
{
    info!("Acquiring {} (timeout {} ms)", kind, timeout.as_millis());
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => {
            info!("{} ready", kind);
            Ok(value)
        }
        Ok(Err(err)) => {
            warn!("{} acquisition failed: {}", kind, err);
            Err(err)
        }
        Err(_) => {
            warn!("{} acquisition timed out", kind);
            Err(SourceError::Timeout {
                kind,
                after_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Handle(Arc<AtomicBool>);

    impl Drop for Handle {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_ready_source_passes_through() {
        let value = acquire(SourceKind::LocalCamera, Duration::from_millis(200), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_hung_acquisition_times_out_and_releases_handle() {
        let released = Arc::new(AtomicBool::new(false));
        let handle = Handle(released.clone());

        let result: Result<(), SourceError> = acquire(SourceKind::RemoteStream, Duration::from_millis(20), async move {
            let _held = handle;
            std::future::pending::<()>().await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(SourceError::Timeout { kind: SourceKind::RemoteStream, after_ms: 20 })
        ));
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_is_reported_unchanged() {
        let result: Result<(), SourceError> = acquire(SourceKind::Microphone, Duration::from_secs(1), async {
            Err(SourceError::PermissionDenied { kind: SourceKind::Microphone })
        })
        .await;
        assert!(matches!(result, Err(SourceError::PermissionDenied { .. })));
    }
}
