// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances_for_all_clones() {
    let clock = FakeClock::new();
    let other = clock.clone();
    let start = clock.now();

    other.advance(Duration::from_secs(30));

    assert_eq!(clock.now().duration_since(start), Duration::from_secs(30));
}

#[test]
fn until_counts_down_to_deadline() {
    let clock = FakeClock::new();
    let deadline = clock.now() + Duration::from_millis(500);

    assert_eq!(clock.until(deadline), Duration::from_millis(500));
    clock.advance(Duration::from_millis(200));
    assert_eq!(clock.until(deadline), Duration::from_millis(300));
}

#[test]
fn until_saturates_once_deadline_passed() {
    let clock = FakeClock::new();
    let deadline = clock.now() + Duration::from_millis(10);

    clock.advance(Duration::from_secs(1));

    assert_eq!(clock.until(deadline), Duration::ZERO);
}

#[test]
fn system_clock_moves_forward() {
    let clock = SystemClock;
    let t1 = clock.now();
    std::thread::sleep(Duration::from_millis(1));
    assert!(clock.now() > t1);
}

#[tokio::test]
async fn fake_sleep_wakes_only_after_advance() {
    let clock = FakeClock::new();
    let deadline = clock.now() + Duration::from_secs(60);
    let sleeper = tokio::spawn(clock.sleep_until(deadline));

    tokio::task::yield_now().await;
    clock.advance(Duration::from_secs(59));
    tokio::task::yield_now().await;
    assert!(!sleeper.is_finished());

    clock.advance(Duration::from_secs(1));
    tokio::time::timeout(Duration::from_secs(5), sleeper)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn fake_sleep_past_deadline_is_ready() {
    let clock = FakeClock::new();
    let deadline = clock.now();
    tokio::time::timeout(Duration::from_secs(5), clock.sleep_until(deadline))
        .await
        .unwrap();
}
