//! Gate admission: ordering, bounds, timeouts and cancellation.

use std::time::Duration;

use admission_core::{AcquireOptions, CancelSource, Gate, GateError};
use futures_util::future::join_all;
use futures_util::poll;
use tokio::time::{sleep, Instant};

mod common;

use common::{ConcurrencyProbe, Recorder};

#[tokio::test(start_paused = true)]
async fn test_capacity_one_preserves_submission_order() {
    let gate = Gate::new(1);
    let order = Recorder::default();
    let log = &order;

    let (a, b, c) = tokio::join!(
        gate.run(
            move || async move {
                sleep(Duration::from_millis(50)).await;
                log.push(1);
            },
            AcquireOptions::default(),
        ),
        gate.run(move || async move { log.push(2) }, AcquireOptions::default()),
        gate.run(move || async move { log.push(3) }, AcquireOptions::default()),
    );

    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert_eq!(order.snapshot(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_capacity() {
    let gate = Gate::new(2);
    let probe = ConcurrencyProbe::default();
    let started = Instant::now();

    let (gate, probe_ref) = (&gate, &probe);
    let tasks = (0..5).map(move |_| {
        let probe = probe_ref;
        gate.run(
            move || async move {
                let _inside = probe.enter();
                sleep(Duration::from_millis(50)).await;
            },
            AcquireOptions::default(),
        )
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    assert_eq!(probe.max(), 2);
    assert_eq!(started.elapsed(), Duration::from_millis(150));

    let stats = gate.stats();
    assert_eq!(stats.running, 0);
    assert_eq!(stats.total_acquired, 5);
    assert_eq!(stats.total_released, 5);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_rejects_without_taking_a_slot() {
    let gate = Gate::new(1);
    let mut held = gate.acquire(AcquireOptions::default()).await.unwrap();
    let started = Instant::now();

    let result = gate
        .acquire(AcquireOptions::default().timeout(Duration::from_millis(50)))
        .await;

    assert_eq!(result.unwrap_err(), GateError::Timeout(Duration::from_millis(50)));
    assert_eq!(started.elapsed(), Duration::from_millis(50));

    let stats = gate.stats();
    assert_eq!(stats.running, 1);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.total_timeouts, 1);

    held.release();
    assert_eq!(gate.stats().running, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_rejects_as_abort_not_timeout() {
    let gate = Gate::new(1);
    let _held = gate.acquire(AcquireOptions::default()).await.unwrap();
    let source = CancelSource::new();
    let started = Instant::now();

    let options = AcquireOptions::default()
        .timeout(Duration::from_secs(1))
        .cancel_on(source.signal());
    let (result, ()) = tokio::join!(gate.acquire(options), async {
        sleep(Duration::from_millis(20)).await;
        source.cancel();
    });

    assert_eq!(result.unwrap_err(), GateError::Aborted);
    assert_eq!(started.elapsed(), Duration::from_millis(20));
    assert_eq!(gate.stats().waiting, 0);
    assert_eq!(gate.stats().total_cancelled, 1);
}

#[tokio::test]
async fn test_pre_fired_signal_rejects_even_with_free_slot() {
    let gate = Gate::new(1);
    let source = CancelSource::new();
    source.cancel();

    let result = gate
        .acquire(AcquireOptions::default().cancel_on(source.signal()))
        .await;

    assert_eq!(result.unwrap_err(), GateError::Aborted);
    assert_eq!(gate.stats().running, 0);
    assert_eq!(gate.stats().total_acquired, 0);
}

#[tokio::test]
#[should_panic(expected = "released twice")]
async fn test_double_release_panics() {
    let gate = Gate::new(1);
    let mut token = gate.acquire(AcquireOptions::default()).await.unwrap();
    token.release();
    token.release();
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_waiter_does_not_disturb_fifo() {
    let gate = Gate::new(1);
    let mut held = gate.acquire(AcquireOptions::default()).await.unwrap();

    let mut first = Box::pin(gate.acquire(AcquireOptions::default()));
    let mut impatient =
        Box::pin(gate.acquire(AcquireOptions::default().timeout(Duration::from_millis(10))));
    let mut last = Box::pin(gate.acquire(AcquireOptions::default()));
    assert!(poll!(first.as_mut()).is_pending());
    assert!(poll!(impatient.as_mut()).is_pending());
    assert!(poll!(last.as_mut()).is_pending());
    assert_eq!(gate.stats().waiting, 3);

    assert!(impatient.await.is_err());
    assert_eq!(gate.stats().waiting, 2);

    held.release();
    let mut first = first.await.unwrap();
    assert!(poll!(last.as_mut()).is_pending());

    first.release();
    let last = last.await.unwrap();
    assert_eq!(gate.stats().running, 1);
    drop(last);
    assert_eq!(gate.stats().running, 0);
}

#[tokio::test]
async fn test_dropped_waiter_leaves_queue() {
    let gate = Gate::new(1);
    let held = gate.acquire(AcquireOptions::default()).await.unwrap();

    {
        let mut waiting = Box::pin(gate.acquire(AcquireOptions::default()));
        assert!(poll!(waiting.as_mut()).is_pending());
        assert_eq!(gate.stats().waiting, 1);
    }

    assert_eq!(gate.stats().waiting, 0);
    drop(held);
    assert_eq!(gate.stats().running, 0);
}

#[tokio::test]
async fn test_run_releases_when_work_fails() {
    let gate = Gate::new(1);
    let output = gate
        .run(|| async { Err::<(), _>("work failed") }, AcquireOptions::default())
        .await;

    assert_eq!(output, Ok(Err("work failed")));
    assert_eq!(gate.stats().running, 0);
}

#[tokio::test]
async fn test_run_releases_when_work_panics() {
    let gate = Gate::new(1);
    let worker = tokio::spawn({
        let gate = gate.clone();
        async move {
            gate.run(
                || async { panic!("work exploded") },
                AcquireOptions::default(),
            )
            .await
        }
    });

    assert!(worker.await.unwrap_err().is_panic());
    let stats = gate.stats();
    assert_eq!(stats.running, 0);
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.total_acquired, stats.total_released);

    let next = gate.acquire(AcquireOptions::default()).await;
    assert!(next.is_ok());
}
