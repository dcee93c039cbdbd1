//! Completion service specs
//!
//! Results come back in the order work finishes, delayed or not.

use crate::prelude::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_then_fast_yields_fast_first() {
    let service = CompletionService::new(WorkerPool::new(&PoolConfig::default()));
    let timeline = Timeline::new();

    service.submit(timeline.task("slow", 120)).unwrap();
    service.submit(timeline.task("fast", 10)).unwrap();

    let first = service.take().await.unwrap();
    let second = service.take().await.unwrap();
    assert_eq!(first.join().await.unwrap(), "fast");
    assert_eq!(second.join().await.unwrap(), "slow");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn delayed_unit_appears_only_after_its_delay() {
    let service = CompletionService::new(tokio::runtime::Handle::current());
    let timeline = Timeline::new();
    let delay = Duration::from_millis(120);

    service.submit_after(delay, timeline.task("delayed", 0)).unwrap();

    assert!(service.poll_timeout(Duration::from_millis(60)).await.is_none());
    let handle = service
        .poll_timeout(Duration::from_secs(5))
        .await
        .expect("delayed unit should arrive");
    assert_eq!(handle.join().await.unwrap(), "delayed");
    assert!(timeline.at(Mark::Start("delayed")) >= delay);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fan_out_then_drain_in_finish_order() {
    let service = CompletionService::new(tokio::runtime::Handle::current());
    let timeline = Timeline::new();
    let names = ["e", "d", "c", "b", "a"];
    for (i, name) in names.into_iter().enumerate() {
        let ms = 20 * (names.len() - i) as u64;
        service.submit(timeline.task(name, ms)).unwrap();
    }

    let mut drained = Vec::new();
    while service.outstanding() > 0 {
        let handle = service.poll_timeout(Duration::from_secs(5)).await.unwrap();
        drained.push(handle.join().await.unwrap());
    }
    assert_eq!(drained, vec!["a", "b", "c", "d", "e"]);
    assert!(service.poll().is_none());
}

#[tokio::test]
async fn shutdown_delivers_waiting_units_as_cancelled() {
    let service = CompletionService::new(tokio::runtime::Handle::current());
    let timeline = Timeline::new();
    service
        .submit_after(Duration::from_secs(30), timeline.task("never", 0))
        .unwrap();

    service.shutdown().await;
    let handle = service.take().await.unwrap();
    assert!(matches!(handle.join().await, Err(TaskError::Cancelled)));
    assert!(service.take().await.is_none());
    assert!(timeline.marks().is_empty());
}
