use std::future::Future;

use crate::Result;

/// Run `primary`; if it fails, run `compensate` to undo whatever
/// preceded it and return the primary error.
///
/// A failing compensation is only logged: the caller already has an
/// error to report and the leftover state is for reconciliation to find.
pub async fn with_compensation<T, P, C, F>(
    label: &str,
    primary: P,
    compensate: C,
) -> Result<T>
where
    P: Future<Output = Result<T>>,
    C: FnOnce() -> F,
    F: Future<Output = Result<()>>,
{
    match primary.await {
        Ok(value) => Ok(value),
        Err(err) => {
            log::warn!("{} failed ({}), compensating", label, err);
            if let Err(undo) = compensate().await {
                log::error!("{}: compensation failed: {}", label, undo);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn compensation_skipped_on_success() {
        let undone = AtomicUsize::new(0);
        let counter = &undone;
        let value = with_compensation("op", async { Ok(7) }, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(undone.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn primary_error_survives_failed_compensation() {
        let undone = AtomicUsize::new(0);
        let counter = &undone;
        let result: Result<()> = with_compensation(
            "op",
            async { Err(SyncError::MetadataStore("insert refused".to_owned())) },
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SyncError::BlobStore("remove refused".to_owned()))
            },
        )
        .await;

        assert_eq!(undone.load(Ordering::SeqCst), 1);
        match result {
            Err(SyncError::MetadataStore(msg)) => assert_eq!(msg, "insert refused"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
