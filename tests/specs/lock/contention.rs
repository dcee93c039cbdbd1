//! Keyed lock specs
//!
//! Guards for the same composite key serialize across holders, reenter for
//! the same holder, and release exactly once.

use crate::prelude::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_acquire_returns_only_after_first_release() {
    let locks = KeyedLocks::new();
    let timeline = Timeline::new();
    let first = HolderId::generate();

    let mut guard = locks.acquire("Store", "primary", &first).await;
    let waiter = tokio::spawn({
        let locks = locks.clone();
        let timeline = timeline.clone();
        async move {
            let second = HolderId::generate();
            let _guard = locks.acquire("Store", "primary", &second).await;
            timeline.mark(Mark::Start("second"));
        }
    });

    tokio::time::sleep(Duration::from_millis(60)).await;
    timeline.mark(Mark::End("first"));
    assert!(guard.release());
    waiter.await.unwrap();

    assert_eq!(timeline.marks(), vec![Mark::End("first"), Mark::Start("second")]);
}

#[tokio::test]
async fn same_holder_reenters_and_must_release_each_hold() {
    let locks = KeyedLocks::new();
    let key = LockKey::new("Store", "primary");
    let me = HolderId::generate();
    let someone_else = HolderId::generate();

    let mut holds = Vec::new();
    for _ in 0..3 {
        holds.push(locks.acquire_key(key.clone(), &me).await);
    }
    assert_eq!(locks.hold_count(&key), 3);

    while let Some(mut hold) = holds.pop() {
        assert!(locks.try_acquire(key.clone(), &someone_else).is_none());
        assert!(hold.release());
    }
    assert!(locks.try_acquire(key, &someone_else).is_some());
}

#[tokio::test]
async fn repeated_release_never_frees_someone_elses_hold() {
    let locks = KeyedLocks::new();
    let key = LockKey::new("Store", "primary");
    let mut mine = locks.acquire_key(key.clone(), &HolderId::new("mine")).await;
    assert!(mine.release());

    let theirs = HolderId::new("theirs");
    let _held = locks.acquire_key(key.clone(), &theirs).await;
    assert!(!mine.release());
    drop(mine);
    assert_eq!(locks.holder_of(&key), Some(theirs));
}

#[tokio::test]
async fn keys_that_fall_out_of_use_are_reclaimed() {
    let locks = KeyedLocks::new();
    for n in 0..100 {
        let holder = HolderId::generate();
        let _guard = locks.acquire("Session", format!("s-{n}"), &holder).await;
    }
    assert!(locks.is_empty());
}

#[tokio::test]
async fn scoped_work_releases_on_every_exit_path() {
    let locks = KeyedLocks::new();
    let key = LockKey::new("Store", "primary");
    let holder = HolderId::generate();

    let value = locks
        .with_lock(key.clone(), &holder, async { 7 })
        .await;
    assert_eq!(value, 7);

    let failed: Result<(), String> = locks
        .with_lock(key.clone(), &holder, async { Err("refused".to_string()) })
        .await;
    assert!(failed.is_err());

    let panicked = tokio::spawn({
        let locks = locks.clone();
        let key = key.clone();
        async move {
            locks
                .with_lock(key, &HolderId::generate(), async {
                    panic!("work blew up");
                })
                .await
        }
    })
    .await;
    assert!(panicked.is_err());

    assert!(locks.is_empty());
    assert!(locks.try_acquire(key, &HolderId::generate()).is_some());
}
