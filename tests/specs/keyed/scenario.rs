//! Keyed scheduler scenarios
//!
//! Same-key tasks run one after another; distinct keys overlap.

use crate::prelude::*;

fn pool(workers: usize) -> WorkerPool {
    WorkerPool::new(&PoolConfig::new(workers, 64))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_a_b_runs_in_about_a1_plus_a2() {
    let scheduler = KeyedScheduler::new(pool(4));
    let timeline = Timeline::new();
    let started = Instant::now();

    let a1 = scheduler.submit("A", timeline.task("A1", 100)).unwrap();
    let a2 = scheduler.submit("A", timeline.task("A2", 50)).unwrap();
    let b = scheduler.submit("B", timeline.task("B", 10)).unwrap();

    assert_eq!(b.join().await.unwrap(), "B");
    assert_eq!(a1.join().await.unwrap(), "A1");
    assert_eq!(a2.join().await.unwrap(), "A2");
    let total = started.elapsed();

    // A1 and B start together; B is done long before A1
    assert!(timeline.at(Mark::Start("B")) < Duration::from_millis(50));
    assert!(timeline.at(Mark::End("B")) < timeline.at(Mark::End("A1")));
    // A2 waits for A1
    assert!(timeline.at(Mark::Start("A2")) >= timeline.at(Mark::End("A1")));
    assert!(timeline.at(Mark::Start("A2")) >= Duration::from_millis(100));
    // B adds nothing to the critical path
    assert!(total >= Duration::from_millis(150));
    assert!(total < Duration::from_millis(250), "took {total:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failures_do_not_stall_the_key() {
    let scheduler = KeyedScheduler::new(pool(2));
    let timeline = Timeline::new();

    let broken = scheduler
        .submit("K", async { Err::<&'static str, _>("first task broke") })
        .unwrap();
    let next = scheduler.submit("K", timeline.task("after", 1)).unwrap();

    assert!(broken.join().await.unwrap_err().is_failure());
    assert_eq!(next.join().await.unwrap(), "after");
    scheduler.idle().await;
    assert!(scheduler.active_keys().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_queued_task_lets_later_tasks_run() {
    let scheduler = KeyedScheduler::new(pool(2));
    let timeline = Timeline::new();

    let first = scheduler.submit(1u32, timeline.task("first", 50)).unwrap();
    let skipped = scheduler.submit(1u32, timeline.task("skipped", 1)).unwrap();
    let last = scheduler.submit(1u32, timeline.task("last", 1)).unwrap();
    assert!(skipped.cancel());

    first.join().await.unwrap();
    last.join().await.unwrap();
    assert!(matches!(skipped.join().await, Err(TaskError::Cancelled)));
    assert_eq!(
        timeline.marks(),
        vec![
            Mark::Start("first"),
            Mark::End("first"),
            Mark::Start("last"),
            Mark::End("last"),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn keyed_lock_guards_state_shared_between_schedulers() {
    let locks = KeyedLocks::new();
    let left = KeyedScheduler::new(tokio::runtime::Handle::current());
    let right = KeyedScheduler::new(tokio::runtime::Handle::current());
    let inside = Arc::new(Mutex::new(0usize));
    let overlaps = Arc::new(Mutex::new(0usize));

    let mut handles = Vec::new();
    for (n, scheduler) in [&left, &right].into_iter().cycle().take(8).enumerate() {
        let locks = locks.clone();
        let inside = Arc::clone(&inside);
        let overlaps = Arc::clone(&overlaps);
        let holder = HolderId::new(format!("task-{n}"));
        let task = async move {
            let _guard = locks.acquire("account", "42", &holder).await;
            {
                let mut inside = inside.lock().unwrap();
                *inside += 1;
                if *inside > 1 {
                    *overlaps.lock().unwrap() += 1;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            *inside.lock().unwrap() -= 1;
            Ok::<_, Infallible>(())
        };
        handles.push(scheduler.submit(n % 3, task).unwrap());
    }
    for handle in handles {
        handle.join().await.unwrap();
    }

    assert_eq!(*overlaps.lock().unwrap(), 0);
    assert!(locks.is_empty());
}
