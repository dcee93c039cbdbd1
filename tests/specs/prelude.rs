//! Shared helpers for specs

#![allow(dead_code)]

pub use std::convert::Infallible;
pub use std::sync::{Arc, Mutex};
pub use std::time::{Duration, Instant};
pub use strand_core::*;

/// A start or end mark for a named task, relative to the timeline origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Start(&'static str),
    End(&'static str),
}

/// Records when tasks start and end
#[derive(Clone)]
pub struct Timeline {
    origin: Instant,
    marks: Arc<Mutex<Vec<(Mark, Duration)>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            marks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn mark(&self, mark: Mark) {
        self.marks
            .lock()
            .unwrap()
            .push((mark, self.origin.elapsed()));
    }

    /// Offset at which `mark` was recorded
    pub fn at(&self, mark: Mark) -> Duration {
        self.marks
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| *m == mark)
            .map(|(_, at)| *at)
            .unwrap_or_else(|| panic!("{mark:?} never recorded"))
    }

    pub fn marks(&self) -> Vec<Mark> {
        self.marks.lock().unwrap().iter().map(|(m, _)| *m).collect()
    }

    /// A task that marks its start, sleeps for `ms`, then marks its end
    pub fn task(
        &self,
        name: &'static str,
        ms: u64,
    ) -> impl std::future::Future<Output = Result<&'static str, Infallible>> + Send + 'static {
        let timeline = self.clone();
        async move {
            timeline.mark(Mark::Start(name));
            tokio::time::sleep(Duration::from_millis(ms)).await;
            timeline.mark(Mark::End(name));
            Ok(name)
        }
    }
}
