//! Bounded queue specs
//!
//! A full queue holds producers back; it never drops or reorders work.

use crate::prelude::*;

/// Spawn one waiting push per value
fn spawn_producers(
    queue: &Arc<BoundedQueue<u32>>,
    values: impl IntoIterator<Item = u32>,
) -> Vec<tokio::task::JoinHandle<Result<(), QueueError<u32>>>> {
    values
        .into_iter()
        .map(|v| {
            let queue = Arc::clone(queue);
            tokio::spawn(async move { queue.push(v).await })
        })
        .collect()
}

#[tokio::test]
async fn capacity_c_admits_c_and_holds_the_next() {
    let queue = Arc::new(BoundedQueue::new(3));
    for v in 0..3 {
        tokio::time::timeout(Duration::from_millis(50), queue.push(v))
            .await
            .expect("push within capacity must not wait")
            .unwrap();
    }

    let mut blocked = spawn_producers(&queue, [3, 4]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(blocked.iter().all(|p| !p.is_finished()));
    assert_eq!(queue.len(), 3);

    assert_eq!(queue.pop().await, Some(0));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let finished = blocked.iter().filter(|p| p.is_finished()).count();
    assert_eq!(finished, 1, "one removal admits exactly one producer");
    assert_eq!(queue.len(), 3);

    assert_eq!(queue.pop().await, Some(1));
    for producer in blocked.drain(..) {
        producer.await.unwrap().unwrap();
    }
    let mut rest = Vec::new();
    while let Some(v) = queue.try_pop() {
        rest.push(v);
    }
    assert_eq!(&rest[..1], &[2]);
    rest.sort_unstable();
    assert_eq!(rest, vec![2, 3, 4]);
}

#[tokio::test]
async fn pool_on_full_queue_slows_the_producer_but_runs_everything() {
    let pool = Arc::new(WorkerPool::new(&PoolConfig::new(1, 2)));
    let done = Arc::new(Mutex::new(Vec::new()));

    let started = Instant::now();
    for n in 0..8u32 {
        let done = Arc::clone(&done);
        pool.spawn(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            done.lock().unwrap().push(n);
        }))
        .await
        .unwrap();
    }
    // The producer could only get ahead by the queue's capacity plus the busy worker
    assert!(started.elapsed() >= Duration::from_millis(50));

    pool.shutdown();
    pool.join().await;
    assert_eq!(*done.lock().unwrap(), (0..8).collect::<Vec<_>>());
}
