/// Bounded fan-out for blocking file work
///
/// Every batch-style read or derive in the engine goes through `map_blocking`, so the
/// number of files open at once is one tunable (`fan_out` in the config) instead of a
/// per-call-site constant.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::task::JoinError;

/// Run `work` over `items` on the blocking pool with at most `limit` jobs in flight.
///
/// Results come back in input order. A panicking job yields its `JoinError` in place
/// without affecting the others.
pub async fn map_blocking<T, R, F>(items: Vec<T>, limit: usize, work: F) -> Vec<Result<R, JoinError>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let work = Arc::new(work);

    stream::iter(items)
        .map(|item| {
            let work = Arc::clone(&work);
            tokio::task::spawn_blocking(move || work(item))
        })
        .buffered(limit.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_keeps_input_order() {
        let results = map_blocking((0..20).collect(), 3, |n: u32| n * 2).await;
        let values: Vec<u32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_respects_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        map_blocking((0..16).collect(), 2, move |_: u32| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            a.fetch_sub(1, Ordering::SeqCst);
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let results = map_blocking(vec![1, 2, 3], 2, |n: u32| {
            if n == 2 {
                panic!("boom");
            }
            n
        })
        .await;

        assert_eq!(results.len(), 3);
        assert!(results[1].is_err());
        assert_eq!(*results[2].as_ref().unwrap(), 3);
    }
}
