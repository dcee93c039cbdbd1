//! Configuration specs
//!
//! A TOML file sizes the pool and picks the shutdown policy.

use crate::prelude::*;

const CONFIG: &str = r#"
log_level = "debug"

[pool]
workers = 1
queue_capacity = 4

[scheduler]
shutdown_policy = "drain"

[completion]
poll_interval = "5ms"
"#;

#[tokio::test]
async fn loaded_config_drives_pool_and_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strand.toml");
    std::fs::write(&path, CONFIG).unwrap();

    let config = StrandConfig::load(&path).unwrap();
    assert_eq!(config.completion.poll_interval, Duration::from_millis(5));

    let scheduler = KeyedScheduler::new(WorkerPool::from_config(&config));
    assert_eq!(scheduler.executor().workers(), 1);

    let timeline = Timeline::new();
    let first = scheduler.submit('x', timeline.task("first", 20)).unwrap();
    let second = scheduler.submit('x', timeline.task("second", 1)).unwrap();
    scheduler.shutdown(config.scheduler.shutdown_policy);

    first.join().await.unwrap();
    assert_eq!(second.join().await.unwrap(), "second");
}
