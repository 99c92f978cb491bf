//! Bounded, order-preserving execution of independent catalog entries.

use futures::stream::{self, StreamExt};
use std::future::Future;

use crate::cancel::Cancellation;

/// Run `task` over every item with at most `max_parallel` in flight.
///
/// Results come back in input order. An item whose turn comes after
/// cancellation is not started and yields `None`.
pub async fn run_batch<'a, T, R, F, Fut>(
    items: &'a [T],
    max_parallel: usize,
    cancel: &'a Cancellation,
    task: F,
) -> Vec<Option<R>>
where
    F: Fn(&'a T) -> Fut + 'a,
    Fut: Future<Output = R> + 'a,
{
    let task = &task;
    stream::iter(items)
        .map(move |item| async move {
            if cancel.is_cancelled() {
                return None;
            }
            Some(task(item).await)
        })
        .buffered(max_parallel.max(1))
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_preserves_order_when_parallel() {
        let items = vec![30u64, 5, 15];
        let out = run_batch(&items, 3, &Cancellation::never(), |ms| async move {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            *ms
        })
        .await;
        assert_eq!(out, vec![Some(30), Some(5), Some(15)]);
    }

    #[tokio::test]
    async fn test_respects_parallel_limit() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let (in_flight_ref, peak_ref) = (&in_flight, &peak);
        let items: Vec<u32> = (0..8).collect();

        run_batch(&items, 2, &Cancellation::never(), move |_| async move {
            let (in_flight, peak) = (in_flight_ref, peak_ref);
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_unstarted_items() {
        let (handle, token) = Cancellation::new();
        let items = vec![1, 2, 3];
        let out = run_batch(&items, 1, &token, |n| {
            let handle = handle.clone();
            async move {
                if *n == 1 {
                    handle.cancel();
                }
                *n
            }
        })
        .await;
        assert_eq!(out, vec![Some(1), None, None]);
    }
}
