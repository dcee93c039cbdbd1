//! Keyed scheduler shutdown specs

use crate::prelude::*;

async fn three_on_one_key(policy: ShutdownPolicy) -> (Timeline, Vec<Result<&'static str, TaskError>>) {
    let scheduler = KeyedScheduler::new(WorkerPool::new(&PoolConfig::new(2, 16)));
    let timeline = Timeline::new();
    let handles = vec![
        scheduler.submit("k", timeline.task("one", 40)).unwrap(),
        scheduler.submit("k", timeline.task("two", 1)).unwrap(),
        scheduler.submit("k", timeline.task("three", 1)).unwrap(),
    ];

    scheduler.shutdown(policy);
    assert!(matches!(
        scheduler.submit("k", timeline.task("late", 1)),
        Err(SubmitError::Shutdown)
    ));

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.join().await);
    }
    scheduler.idle().await;
    scheduler.executor().shutdown();
    scheduler.executor().join().await;
    (timeline, outcomes)
}

#[tokio::test]
async fn drain_runs_everything_already_submitted() {
    let (timeline, outcomes) = three_on_one_key(ShutdownPolicy::Drain).await;

    let values: Vec<_> = outcomes.into_iter().map(Result::unwrap).collect();
    assert_eq!(values, vec!["one", "two", "three"]);
    assert!(!timeline.marks().contains(&Mark::Start("late")));
}

#[tokio::test]
async fn discard_finishes_the_running_task_and_cancels_the_rest() {
    let (timeline, outcomes) = three_on_one_key(ShutdownPolicy::Discard).await;

    assert_eq!(outcomes[0].as_ref().unwrap(), &"one");
    assert!(outcomes[1..]
        .iter()
        .all(|o| matches!(o, Err(TaskError::Cancelled))));
    assert_eq!(timeline.marks(), vec![Mark::Start("one"), Mark::End("one")]);
}
