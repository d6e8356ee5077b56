use std::{sync::Arc, time::Duration};

use futures::future;
use medea_reactive::{Completer, StateSync, WaitError};

#[tokio::test]
async fn zero_timeout_fails_but_later_wait_succeeds() {
    let completer = Completer::<&str, ()>::new(Duration::from_secs(10));

    assert_eq!(
        completer.wait_for(Duration::from_secs(0)).await,
        Err(WaitError::Timeout(Duration::from_secs(0))),
    );
    assert!(completer.resume("devices"));

    assert_eq!(completer.wait().await, Ok("devices"));
}

#[tokio::test]
async fn all_early_waiters_receive_the_same_value() {
    let completer = Arc::new(Completer::<u64, ()>::new(Duration::from_secs(5)));

    let waiters: Vec<_> = (0..16)
        .map(|_| {
            let completer = Arc::clone(&completer);
            tokio::spawn(async move { completer.wait().await })
        })
        .collect();
    tokio::task::yield_now().await;
    assert!(completer.resume(42));
    assert!(!completer.resume(13));

    for result in future::join_all(waiters).await {
        assert_eq!(result.unwrap(), Ok(42));
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_waiter_does_not_affect_others() {
    let completer = Arc::new(Completer::<u64, ()>::new(Duration::from_secs(5)));

    let patient = tokio::spawn({
        let completer = Arc::clone(&completer);
        async move { completer.wait_for(Duration::from_secs(60)).await }
    });
    let hasty = completer.wait_for(Duration::from_millis(10)).await;
    assert!(completer.resume(7));

    assert_eq!(hasty, Err(WaitError::Timeout(Duration::from_millis(10))));
    assert_eq!(patient.await.unwrap(), Ok(7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutations_are_observed_in_commit_order() {
    let state = Arc::new(StateSync::new(0_u64));
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    state.set_on_did_mutate({
        let seen = Arc::clone(&seen);
        move |new: &u64, old: &u64| seen.lock().unwrap().push((*new, *old))
    });

    let writers: Vec<_> = (0..8)
        .map(|_| {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                for _ in 0..100 {
                    state.mutate(|s| *s += 1);
                }
            })
        })
        .collect();
    for writer in future::join_all(writers).await {
        writer.unwrap();
    }

    assert_eq!(state.read(), 800);
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 800);
    for (i, (new, old)) in seen.into_iter().enumerate() {
        assert_eq!(old, i as u64);
        assert_eq!(new, i as u64 + 1);
    }
}
