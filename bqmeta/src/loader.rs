//! Fan-out of independent metadata listings.
//!
//! The [`ParallelLoader`] runs a batch of labelled listing futures and reports exactly one
//! [`TaskOutcome`] per task. Small batches run one after another on the calling task; batches
//! at or above the threshold are spawned on a [`JoinSet`]. A failing, panicking or timed out
//! task never affects its siblings.

use bqmeta_config::shared::MetadataCacheConfig;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::error::{ErrorKind, MetadataError, MetadataResult};
use crate::metadata_error;

/// A labelled listing to run. The future is not polled until the loader runs it.
#[derive(Debug)]
pub struct ParallelTask<F> {
    label: String,
    future: F,
}

impl<F> ParallelTask<F> {
    pub fn new(label: impl Into<String>, future: F) -> Self {
        Self {
            label: label.into(),
            future,
        }
    }
}

/// Outcome of a single task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult<R> {
    Success(R),
    Failure(MetadataError),
}

impl<R> TaskResult<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success(_))
    }
}

impl<R> From<MetadataResult<R>> for TaskResult<R> {
    fn from(result: MetadataResult<R>) -> Self {
        match result {
            Ok(value) => TaskResult::Success(value),
            Err(err) => TaskResult::Failure(err),
        }
    }
}

/// A task's label together with its result.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome<R> {
    pub label: String,
    pub result: TaskResult<R>,
}

/// Runs batches of [`ParallelTask`]s sequentially or concurrently depending on their count.
#[derive(Debug, Clone, Copy)]
pub struct ParallelLoader {
    threshold: usize,
    timeout: Duration,
}

impl ParallelLoader {
    pub fn new(threshold: usize, timeout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &MetadataCacheConfig) -> Self {
        Self::new(config.parallel_threshold, config.parallel_timeout())
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns `true` when a batch of `task_count` tasks is fanned out.
    pub fn is_parallel(&self, task_count: usize) -> bool {
        task_count >= self.threshold
    }

    /// Runs every task and returns one outcome per task.
    ///
    /// Blocks until all tasks finished or the timeout elapsed. Tasks still running at the
    /// deadline are reported as [`ErrorKind::Timeout`] failures and aborted; a listing that is
    /// not cancellable may still finish in the background, its result is discarded.
    pub async fn run<F, R>(&self, tasks: Vec<ParallelTask<F>>) -> Vec<TaskOutcome<R>>
    where
        F: Future<Output = MetadataResult<R>> + Send + 'static,
        R: Send + 'static,
    {
        let task_count = tasks.len();
        let deadline = Instant::now() + self.timeout;

        if self.is_parallel(task_count) {
            debug!(task_count, "running metadata listings in parallel");
            self.run_parallel(tasks, deadline).await
        } else {
            debug!(task_count, "running metadata listings sequentially");
            self.run_sequential(tasks, deadline).await
        }
    }

    async fn run_sequential<F, R>(
        &self,
        tasks: Vec<ParallelTask<F>>,
        deadline: Instant,
    ) -> Vec<TaskOutcome<R>>
    where
        F: Future<Output = MetadataResult<R>> + Send + 'static,
        R: Send + 'static,
    {
        let mut outcomes = Vec::with_capacity(tasks.len());

        for task in tasks {
            // Tasks left once the deadline passed are not started at all.
            let result = if Instant::now() >= deadline {
                TaskResult::Failure(self.timeout_error(&task.label))
            } else {
                match timeout_at(deadline, guarded(&task.label, task.future)).await {
                    Ok(result) => result.into(),
                    Err(_) => TaskResult::Failure(self.timeout_error(&task.label)),
                }
            };

            outcomes.push(TaskOutcome {
                label: task.label,
                result,
            });
        }

        outcomes
    }

    async fn run_parallel<F, R>(
        &self,
        tasks: Vec<ParallelTask<F>>,
        deadline: Instant,
    ) -> Vec<TaskOutcome<R>>
    where
        F: Future<Output = MetadataResult<R>> + Send + 'static,
        R: Send + 'static,
    {
        let mut pending: Vec<Option<String>> = Vec::with_capacity(tasks.len());
        let mut join_set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let label = task.label.clone();
            let future = task.future;
            join_set.spawn(async move { (index, guarded(&label, future).await) });
            pending.push(Some(task.label));
        }

        let mut outcomes = Vec::with_capacity(pending.len());

        loop {
            match timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok((index, result)))) => {
                    if let Some(label) = pending.get_mut(index).and_then(Option::take) {
                        outcomes.push(TaskOutcome {
                            label,
                            result: result.into(),
                        });
                    }
                }
                Ok(Some(Err(join_err))) => {
                    // Panics are caught inside the task, so this is an external cancellation.
                    warn!(error = %join_err, "metadata listing task was cancelled");
                }
                Ok(None) => break,
                Err(_) => {
                    let unfinished = pending.iter().filter(|label| label.is_some()).count();
                    warn!(
                        unfinished,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "metadata listings did not finish before the deadline"
                    );
                    join_set.abort_all();
                    break;
                }
            }
        }

        // Anything without an outcome timed out or was cancelled.
        for label in pending.into_iter().flatten() {
            let error = self.timeout_error(&label);
            outcomes.push(TaskOutcome {
                label,
                result: TaskResult::Failure(error),
            });
        }

        outcomes
    }

    fn timeout_error(&self, label: &str) -> MetadataError {
        metadata_error!(
            ErrorKind::Timeout,
            "Metadata listing timed out",
            format!("`{label}` did not finish within {:?}", self.timeout)
        )
    }
}

/// Awaits `future`, turning a panic into a [`ErrorKind::TaskPanicked`] error.
async fn guarded<F, R>(label: &str, future: F) -> MetadataResult<R>
where
    F: Future<Output = MetadataResult<R>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|message| message.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());

            Err(metadata_error!(
                ErrorKind::TaskPanicked,
                "Metadata listing panicked",
                format!("`{label}`: {message}")
            ))
        }
    }
}

/// Splits outcomes into successes and failures, logging every failure.
pub fn partition_outcomes<R>(
    outcomes: Vec<TaskOutcome<R>>,
) -> (Vec<(String, R)>, Vec<(String, MetadataError)>) {
    let mut successes = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            TaskResult::Success(value) => successes.push((outcome.label, value)),
            TaskResult::Failure(err) => {
                warn!(label = %outcome.label, error = %err, "metadata listing failed, omitting it");
                failures.push((outcome.label, err));
            }
        }
    }

    (successes, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Tracks how many tasks run at the same time.
    #[derive(Default)]
    struct ConcurrencyTracker {
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl ConcurrencyTracker {
        fn max_running(&self) -> usize {
            self.max_running.load(Ordering::SeqCst)
        }
    }

    fn tracked_task(
        tracker: &Arc<ConcurrencyTracker>,
        value: usize,
    ) -> impl Future<Output = MetadataResult<usize>> + Send + 'static {
        let tracker = tracker.clone();
        async move {
            let now = tracker.running.fetch_add(1, Ordering::SeqCst) + 1;
            tracker.max_running.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            tracker.running.fetch_sub(1, Ordering::SeqCst);
            Ok(value)
        }
    }

    fn loader() -> ParallelLoader {
        ParallelLoader::new(5, Duration::from_secs(5))
    }

    fn tracked_tasks(
        tracker: &Arc<ConcurrencyTracker>,
        count: usize,
    ) -> Vec<ParallelTask<impl Future<Output = MetadataResult<usize>> + Send + 'static>> {
        (0..count)
            .map(|i| ParallelTask::new(format!("ds{i}"), tracked_task(tracker, i)))
            .collect()
    }

    #[tokio::test]
    async fn below_threshold_runs_sequentially() {
        let tracker = Arc::new(ConcurrencyTracker::default());

        let outcomes = loader().run(tracked_tasks(&tracker, 4)).await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(tracker.max_running(), 1);
        let labels: Vec<_> = outcomes.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["ds0", "ds1", "ds2", "ds3"]);
    }

    #[tokio::test]
    async fn at_threshold_runs_in_parallel() {
        let tracker = Arc::new(ConcurrencyTracker::default());

        let outcomes = loader().run(tracked_tasks(&tracker, 5)).await;

        assert_eq!(outcomes.len(), 5);
        assert!(tracker.max_running() > 1);
        assert!(outcomes.iter().all(|o| o.result.is_success()));
    }

    #[tokio::test]
    async fn failures_do_not_abort_siblings() {
        let tasks: Vec<_> = (1..=8)
            .map(|i| {
                ParallelTask::new(format!("ds{i}"), async move {
                    if i == 3 || i == 6 {
                        Err(metadata_error!(
                            ErrorKind::PermissionDenied,
                            "Access denied",
                            format!("ds{i}")
                        ))
                    } else {
                        Ok(i)
                    }
                })
            })
            .collect();

        let (successes, failures) = partition_outcomes(loader().run(tasks).await);

        let succeeded: BTreeSet<_> = successes.iter().map(|(_, value)| *value).collect();
        assert_eq!(succeeded, BTreeSet::from([1, 2, 4, 5, 7, 8]));
        let failed: BTreeSet<_> = failures.iter().map(|(label, _)| label.clone()).collect();
        assert_eq!(failed, BTreeSet::from(["ds3".to_string(), "ds6".to_string()]));
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_failure() {
        let tasks: Vec<_> = (0..6)
            .map(|i| {
                ParallelTask::new(format!("ds{i}"), async move {
                    if i == 2 {
                        panic!("listing exploded");
                    }
                    Ok(i)
                })
            })
            .collect();

        let outcomes = loader().run(tasks).await;

        assert_eq!(outcomes.len(), 6);
        let failed = outcomes.iter().find(|o| o.label == "ds2").unwrap();
        match &failed.result {
            TaskResult::Failure(err) => {
                assert_eq!(err.kind(), ErrorKind::TaskPanicked);
                assert!(err.detail().unwrap().contains("listing exploded"));
            }
            TaskResult::Success(_) => panic!("expected a failure"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_timeout_marks_unfinished_tasks_failed() {
        let loader = ParallelLoader::new(2, Duration::from_secs(1));
        let tasks: Vec<_> = [("fast", 10u64), ("slow", 10_000), ("fast2", 20)]
            .into_iter()
            .map(|(label, millis)| {
                ParallelTask::new(label, async move {
                    sleep(Duration::from_millis(millis)).await;
                    Ok(millis)
                })
            })
            .collect();

        let outcomes = loader.run(tasks).await;

        assert_eq!(outcomes.len(), 3);
        let slow = outcomes.iter().find(|o| o.label == "slow").unwrap();
        assert!(matches!(&slow.result, TaskResult::Failure(err) if err.kind() == ErrorKind::Timeout));
        assert_eq!(outcomes.iter().filter(|o| o.result.is_success()).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_timeout_skips_remaining_tasks() {
        let loader = ParallelLoader::new(10, Duration::from_secs(1));
        let started = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..3)
            .map(|i| {
                let started = started.clone();
                ParallelTask::new(format!("ds{i}"), async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_secs(2)).await;
                    Ok(i)
                })
            })
            .collect();

        let outcomes = loader.run(tasks).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| !o.result.is_success()));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_batch_yields_no_outcomes() {
        let tasks: Vec<ParallelTask<std::future::Ready<MetadataResult<()>>>> = Vec::new();
        assert!(loader().run(tasks).await.is_empty());
    }

    #[test]
    fn threshold_is_at_least_one() {
        let loader = ParallelLoader::new(0, Duration::from_secs(1));
        assert_eq!(loader.threshold(), 1);
        assert!(loader.is_parallel(1));
        assert!(!ParallelLoader::new(5, Duration::from_secs(1)).is_parallel(4));
    }
}
