use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Runs `work` over `items` with at most `limit` calls in flight.
///
/// Results come back in input order. An item that never started because the
/// token was cancelled, or whose worker panicked, yields `None`.
pub async fn run_bounded<I, T, F, Fut>(
    items: Vec<I>,
    limit: usize,
    cancel: &CancellationToken,
    work: F,
) -> Vec<Option<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let total = items.len();
    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let work = Arc::new(work);
    let mut workers = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Cancelled with {} of {} items not started", total - index, total);
                break;
            }
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let work = Arc::clone(&work);
        workers.spawn(async move {
            let _permit = permit;
            (index, work(item).await)
        });

        while let Some(joined) = workers.try_join_next() {
            collect(&mut results, joined);
        }
    }

    while let Some(joined) = workers.join_next().await {
        collect(&mut results, joined);
    }
    results
}

fn collect<T>(results: &mut [Option<T>], joined: Result<(usize, T), tokio::task::JoinError>) {
    match joined {
        Ok((index, value)) => results[index] = Some(value),
        Err(e) => error!("Worker crashed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let cancel = CancellationToken::new();
        let results = run_bounded((0..20u64).collect(), 4, &cancel, |n| async move {
            tokio::time::sleep(Duration::from_millis(20 - n)).await;
            n * 2
        })
        .await;
        let expected: Vec<_> = (0..20u64).map(|n| Some(n * 2)).collect();
        assert_eq!(results, expected);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let cancel = CancellationToken::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (flight, high) = (in_flight.clone(), peak.clone());
        run_bounded((0..30).collect::<Vec<u32>>(), 3, &cancel, move |_| {
            let (flight, high) = (flight.clone(), high.clone());
            async move {
                let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                high.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_cancelled_items_do_not_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results = run_bounded(vec![1, 2, 3], 2, &cancel, |n| async move { n }).await;
        assert_eq!(results, vec![None, None, None]);
    }
}
