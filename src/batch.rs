//! Order-preserving batch execution.

use std::future::Future;

use futures::stream::{self, StreamExt};
use tonic::Code;

use crate::context::CallContext;
use crate::status::make_err;

/// Runs `f` over every item, keeping at most `concurrency` items in flight, and returns
/// the outputs in input order.
///
/// Item failures are part of `T`; the batch itself only fails when the call is cancelled
/// before every item completed. Items that finished before the cancellation, including any
/// storage writes they committed, are not reported. A `concurrency` of 0 is treated as 1.
pub(crate) async fn run_batch<I, T, F, Fut>(
    ctx: &CallContext,
    items: Vec<I>,
    concurrency: usize,
    f: F,
) -> Result<Vec<T>, tonic::Status>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = T>,
{
    let mut results = Vec::with_capacity(items.len());
    let outputs = stream::iter(items).map(f).buffered(concurrency.max(1));
    tokio::pin!(outputs);

    loop {
        tokio::select! {
            biased;
            () = ctx.cancellation_token().cancelled() => {
                return Err(make_err(ctx.log(), Code::Cancelled, "batch cancelled", None));
            }
            next = outputs.next() => match next {
                Some(output) => results.push(output),
                None => return Ok(results),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test(start_paused = true)]
    async fn test_preserves_input_order() {
        let ctx = CallContext::new();
        // Earlier items take longer, so they finish last.
        let delays = vec![50u64, 40, 30, 20, 10];

        let out = run_batch(&ctx, delays.clone(), 5, |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay
        })
        .await
        .unwrap();

        assert_eq!(out, delays);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limits_in_flight_items() {
        let ctx = CallContext::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let out = run_batch(&ctx, (0..10).collect(), 3, |i: usize| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i * 2
            }
        })
        .await
        .unwrap();

        assert_eq!(out, (0..10).map(|i| i * 2).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let ctx = CallContext::new();
        let out: Vec<u8> = run_batch(&ctx, Vec::<u8>::new(), 1, |i| async move { i })
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_fails_the_batch() {
        let token = CancellationToken::new();
        let ctx = CallContext::with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            token.cancel();
        });

        let err = run_batch(&ctx, (0..10).collect::<Vec<u64>>(), 1, |i| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            i
        })
        .await
        .unwrap_err();

        assert_eq!(err.code(), Code::Cancelled);
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_drops_completed_items() {
        let token = CancellationToken::new();
        let ctx = CallContext::with_cancellation(token.clone());
        let completed = Arc::new(AtomicUsize::new(0));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            token.cancel();
        });

        let result = run_batch(&ctx, (0..5).collect::<Vec<u64>>(), 1, |i| {
            let completed = Arc::clone(&completed);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                completed.fetch_add(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        // Two items ran to completion, yet the call reports none of them.
        assert_eq!(result.unwrap_err().code(), Code::Cancelled);
        assert_eq!(completed.load(Ordering::SeqCst), 2);
        canceller.await.unwrap();
    }
}
