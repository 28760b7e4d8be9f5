//! Batch queue and concurrent runner.
//!
//! Callers enqueue descriptors, then `run_all` takes the whole queue, spawns
//! one task per descriptor and hands back results in enqueue order. Anything
//! enqueued while a batch is running belongs to the next batch.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};

use super::executor::{ExecutionError, RequestExecutor};
use super::types::{ExecutionResult, RequestDescriptor, RequestFailure};
use crate::modules::events::{BatchEvent, EventDispatcher, FetchEvent};

pub struct BatchRunner {
    executor: Arc<RequestExecutor>,
    queue: Mutex<Vec<RequestDescriptor>>,
    events: Arc<EventDispatcher>,
}

impl BatchRunner {
    pub fn new(executor: Arc<RequestExecutor>, events: Arc<EventDispatcher>) -> Self {
        Self {
            executor,
            queue: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn enqueue(&self, descriptor: RequestDescriptor) {
        log::debug!(
            "queued request: {} with params {:?}, timeout {:?}",
            descriptor.url,
            descriptor.params,
            descriptor.timeout_override
        );
        self.lock_queue().push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.lock_queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_queue().is_empty()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, Vec<RequestDescriptor>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs every queued descriptor concurrently and waits for all of them.
    pub async fn run_all(&self) -> Result<Vec<ExecutionResult>, ExecutionError> {
        self.run(None).await
    }

    /// Like [`run_all`](Self::run_all), but gives up on requests still running
    /// after `deadline`; their slots come back as `DeadlineExceeded` failures.
    /// A deadline too far out to represent runs the batch without one.
    pub async fn run_all_with_deadline(
        &self,
        deadline: Duration,
    ) -> Result<Vec<ExecutionResult>, ExecutionError> {
        self.run(Instant::now().checked_add(deadline)).await
    }

    /// Runs `descriptors` as a batch of their own, leaving the shared queue
    /// untouched.
    pub async fn run_batch(
        &self,
        descriptors: Vec<RequestDescriptor>,
    ) -> Result<Vec<ExecutionResult>, ExecutionError> {
        self.execute(descriptors, None).await
    }

    async fn run(&self, deadline: Option<Instant>) -> Result<Vec<ExecutionResult>, ExecutionError> {
        let pending = std::mem::take(&mut *self.lock_queue());
        self.execute(pending, deadline).await
    }

    async fn execute(
        &self,
        pending: Vec<RequestDescriptor>,
        deadline: Option<Instant>,
    ) -> Result<Vec<ExecutionResult>, ExecutionError> {
        if pending.is_empty() {
            self.events.dispatch(FetchEvent::EmptyBatch);
            return Ok(Vec::new());
        }

        let size = pending.len();
        log::info!("executing {size} queued requests...");
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for (index, descriptor) in pending.into_iter().enumerate() {
            let executor = self.executor.clone();
            tasks.spawn(async move { (index, executor.send(index, &descriptor).await) });
        }

        let mut slots: Vec<Option<ExecutionResult>> = vec![None; size];
        let mut expired = false;

        loop {
            let joined = match deadline {
                Some(deadline) => match timeout_at(deadline, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        log::warn!(
                            "batch deadline expired with {} requests in flight",
                            tasks.len()
                        );
                        tasks.abort_all();
                        expired = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = joined else { break };
            match joined {
                Ok((index, Ok(result))) => slots[index] = Some(result),
                Ok((_, Err(err))) => return Err(err),
                Err(err) => log::error!("request task did not complete: {err}"),
            }
        }

        let results: Vec<ExecutionResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let failure = if expired {
                        RequestFailure::DeadlineExceeded
                    } else {
                        RequestFailure::Aborted("task panicked or was cancelled".into())
                    };
                    ExecutionResult::failure(index, 0, failure)
                })
            })
            .collect();

        self.events.dispatch(FetchEvent::BatchCompleted(BatchEvent {
            size,
            succeeded: results.iter().filter(|result| result.ok).count(),
            elapsed: started.elapsed(),
            timestamp: chrono::Utc::now(),
        }));

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{Reply, ScriptedTransport, executor_with};
    use crate::modules::metrics::MetricsCollector;
    use serde_json::json;

    fn runner(transport: Arc<ScriptedTransport>, metrics: &MetricsCollector) -> BatchRunner {
        let executor = Arc::new(executor_with(transport, metrics, 10..=10));
        BatchRunner::new(
            executor,
            Arc::new(crate::modules::events::EventDispatcher::with_defaults(metrics)),
        )
    }

    fn descriptor(path: &str) -> RequestDescriptor {
        RequestDescriptor::parse(&format!("https://gmgn.ai{path}")).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_makes_no_calls() {
        let transport = ScriptedTransport::new();
        let metrics = MetricsCollector::new();
        let runner = runner(transport.clone(), &metrics);

        let results = runner.run_all().await.unwrap();

        assert!(results.is_empty());
        assert_eq!(transport.total_calls(), 0);
        assert_eq!(metrics.snapshot().batches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_enqueue_order() {
        let transport = ScriptedTransport::new();
        for idx in 0..8u64 {
            // later entries answer first
            transport.script(
                &format!("/r/{idx}"),
                [Reply::json(json!({ "idx": idx })).delayed(Duration::from_millis(800 - idx * 100))],
            );
        }
        let metrics = MetricsCollector::new();
        let runner = runner(transport.clone(), &metrics);
        for idx in 0..8 {
            runner.enqueue(descriptor(&format!("/r/{idx}")));
        }

        let results = runner.run_all().await.unwrap();

        assert_eq!(results.len(), 8);
        for (position, result) in results.iter().enumerate() {
            assert_eq!(result.index, position);
            assert_eq!(result.body, json!({ "idx": position }));
        }
        assert!(runner.is_empty());
        assert_eq!(metrics.snapshot().batched_requests, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_entries_do_not_abort_the_batch() {
        let transport = ScriptedTransport::new();
        transport.script("/ok", [Reply::json(json!({"data": 1}))]);
        transport.script("/gone", [Reply::status(404)]);
        transport.script("/broken", [Reply::status(502)]);
        let metrics = MetricsCollector::new();
        let runner = runner(transport, &metrics);
        runner.enqueue(descriptor("/gone"));
        runner.enqueue(descriptor("/ok"));
        runner.enqueue(descriptor("/broken"));

        let results = runner.run_all().await.unwrap();

        let flags: Vec<bool> = results.iter().map(|r| r.ok).collect();
        assert_eq!(flags, vec![false, true, false]);
        assert_eq!(results[2].failure, Some(RequestFailure::Status(502)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_keeps_completed_results() {
        let transport = ScriptedTransport::new();
        transport.script("/fast", [Reply::json(json!("fast"))]);
        transport.script(
            "/stuck",
            [Reply::json(json!("late")).delayed(Duration::from_secs(120))],
        );
        let metrics = MetricsCollector::new();
        let runner = runner(transport, &metrics);
        runner.enqueue(descriptor("/stuck"));
        runner.enqueue(descriptor("/fast"));

        let results = runner
            .run_all_with_deadline(Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(results[0].failure, Some(RequestFailure::DeadlineExceeded));
        assert!(results[1].ok);
        assert_eq!(results[1].body, json!("fast"));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_deadline_runs_to_completion() {
        let transport = ScriptedTransport::new();
        transport.script(
            "/slow",
            [Reply::json(json!("done")).delayed(Duration::from_secs(600))],
        );
        let metrics = MetricsCollector::new();
        let runner = runner(transport, &metrics);
        runner.enqueue(descriptor("/slow"));

        let results = runner.run_all_with_deadline(Duration::MAX).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].ok);
        assert_eq!(results[0].body, json!("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn private_batch_leaves_queue_alone() {
        let transport = ScriptedTransport::new();
        transport.script("/mine", [Reply::json(json!(1))]);
        let metrics = MetricsCollector::new();
        let runner = runner(transport.clone(), &metrics);
        runner.enqueue(descriptor("/theirs"));

        let results = runner.run_batch(vec![descriptor("/mine")]).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].ok);
        assert_eq!(runner.len(), 1);
        assert_eq!(transport.calls("/theirs"), 0);
    }

    #[test]
    fn concurrent_enqueue_keeps_every_entry() {
        let transport = ScriptedTransport::new();
        let metrics = MetricsCollector::new();
        let runner = Arc::new(runner(transport, &metrics));

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let runner = runner.clone();
                std::thread::spawn(move || {
                    for idx in 0..50 {
                        runner.enqueue(descriptor(&format!("/w/{worker}/{idx}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let queued = runner.lock_queue().clone();
        assert_eq!(queued.len(), 400);
        let mut urls: Vec<_> = queued.iter().map(|d| d.url.to_string()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 400);
    }
}
