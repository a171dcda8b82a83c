//! Bounded background job runner

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use uuid::Uuid;

use super::events::RunnerEvent;
use super::job::{run_job, JobContext, JobOutcome};
use crate::config::ProcessingConfig;
use crate::error::{Error, Result};

/// Queues jobs on a bounded channel and runs at most `max_concurrent_jobs`
/// of them at a time. Finished jobs are published on a broadcast channel.
pub struct JobRunner {
    ctx: JobContext,
    sender: Mutex<Option<mpsc::Sender<Uuid>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    completions: broadcast::Sender<JobOutcome>,
}

impl JobRunner {
    /// Create a runner and spawn its dispatcher on the current tokio runtime
    pub fn new(ctx: JobContext, config: &ProcessingConfig) -> Self {
        let max_concurrent_jobs = config.max_concurrent_jobs();
        let queue_capacity = config.queue_capacity.max(1);

        let (sender, receiver) = mpsc::channel(queue_capacity);
        let (completions, _) = broadcast::channel(queue_capacity.max(16));

        tracing::info!(
            "Job runner configured: {} concurrent jobs, queue capacity {}",
            max_concurrent_jobs,
            queue_capacity
        );

        let dispatcher = tokio::spawn(dispatch(
            ctx.clone(),
            receiver,
            Arc::new(Semaphore::new(max_concurrent_jobs)),
            completions.clone(),
        ));

        Self {
            ctx,
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            completions,
        }
    }

    /// Queue a job for a registered record. Waits while the queue is full.
    ///
    /// Starting the same id twice is not guarded against; the second run
    /// fails when it tries to store parsed content again.
    pub async fn start(&self, file_id: Uuid) -> Result<()> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or_else(|| Error::internal("Job runner is shut down"))?;

        sender
            .send(file_id)
            .await
            .map_err(|_| Error::internal("Job runner is shut down"))?;

        self.ctx.reporter.report(RunnerEvent::JobQueued { file_id });
        Ok(())
    }

    /// Receive every outcome published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<JobOutcome> {
        self.completions.subscribe()
    }

    /// Stop accepting jobs and wait for queued and running ones to finish
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());

        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            if let Err(e) = dispatcher.await {
                tracing::error!("Job dispatcher failed: {}", e);
            }
            tracing::info!("Job runner stopped");
        }
    }
}

async fn dispatch(
    ctx: JobContext,
    mut receiver: mpsc::Receiver<Uuid>,
    semaphore: Arc<Semaphore>,
    completions: broadcast::Sender<JobOutcome>,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join_error(joined);
            }
            next = receiver.recv() => {
                let Some(file_id) = next else { break };

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    tracing::error!(%file_id, "Job semaphore closed, dropping job");
                    break;
                };

                let ctx = ctx.clone();
                let completions = completions.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    let outcome = run_job(&ctx, file_id).await;
                    // no subscribers is fine
                    let _ = completions.send(outcome);
                });
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        log_join_error(joined);
    }
}

fn log_join_error(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Job task failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{DecodeProgress, Decoder, FileParser};
    use crate::processing::events::testutil::RecordingReporter;
    use crate::processing::job::{JobResult, ProgressSchedule};
    use crate::processing::ProgressStore;
    use crate::storage::{MemoryRecordStore, RecordStore};
    use crate::types::{ContentType, FileRecord, FileStatus};
    use serde_json::{json, Value};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn context(parser: FileParser) -> JobContext {
        JobContext {
            store: Arc::new(MemoryRecordStore::new()),
            progress: Arc::new(ProgressStore::new()),
            parser: Arc::new(parser),
            schedule: ProgressSchedule::new(vec![10, 50, 90], Duration::ZERO).unwrap(),
            reporter: Arc::new(RecordingReporter::default()),
        }
    }

    fn processing(max_concurrent_jobs: usize, queue_capacity: usize) -> ProcessingConfig {
        ProcessingConfig {
            max_concurrent_jobs: Some(max_concurrent_jobs),
            queue_capacity,
            ..ProcessingConfig::default()
        }
    }

    fn register(ctx: &JobContext, filename: &str, data: &[u8]) -> Uuid {
        let mut record = FileRecord::new(filename.to_string(), "text/csv".to_string(), data.to_vec());
        ctx.store.save(&mut record).unwrap();
        ctx.progress.set(record.id, Some(0), Some(FileStatus::Uploading));
        record.id
    }

    #[tokio::test]
    async fn test_jobs_complete_and_publish_outcomes() {
        let ctx = context(FileParser::default());
        let runner = JobRunner::new(ctx.clone(), &processing(4, 16));
        let mut outcomes = runner.subscribe();

        let ids: Vec<Uuid> = (0..10)
            .map(|i| register(&ctx, &format!("f{}.csv", i), b"a,b\n1,2\n3,4\n"))
            .collect();
        for &id in &ids {
            runner.start(id).await.unwrap();
        }

        let mut finished = HashSet::new();
        while finished.len() < ids.len() {
            let outcome = outcomes.recv().await.unwrap();
            assert_eq!(
                outcome.result,
                JobResult::Ready {
                    content_type: ContentType::Csv,
                    row_count: 2
                }
            );
            finished.insert(outcome.file_id);
        }

        for id in ids {
            assert!(finished.contains(&id));
            assert_eq!(ctx.store.get(id).unwrap().unwrap().status, FileStatus::Ready);
            assert_eq!(ctx.progress.get(id).unwrap().progress, 100);
        }

        runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let ctx = context(FileParser::default());
        let runner = JobRunner::new(ctx.clone(), &processing(1, 8));

        let ids: Vec<Uuid> = (0..5)
            .map(|i| register(&ctx, &format!("f{}.csv", i), b"x\n1\n"))
            .collect();
        for &id in &ids {
            runner.start(id).await.unwrap();
        }

        runner.shutdown().await;

        for id in ids {
            let record = ctx.store.get(id).unwrap().unwrap();
            assert_eq!(record.status, FileStatus::Ready);
        }
        assert!(runner.start(Uuid::new_v4()).await.is_err());
    }

    /// Tracks how many decodes overlap
    struct SlowDecoder {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Decoder for SlowDecoder {
        fn content_type(&self) -> ContentType {
            ContentType::Csv
        }

        fn decode(&self, _data: &[u8], _progress: &dyn DecodeProgress) -> crate::Result<Value> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({"rows": [1]}))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let decoder = Arc::new(SlowDecoder {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let ctx = context(FileParser::default().with_decoder(decoder.clone()));
        let runner = JobRunner::new(ctx.clone(), &processing(2, 4));

        for i in 0..8 {
            let id = register(&ctx, &format!("f{}.csv", i), b"a\n1\n");
            runner.start(id).await.unwrap();
        }
        runner.shutdown().await;

        assert!(decoder.peak.load(Ordering::SeqCst) <= 2);
        assert!(decoder.peak.load(Ordering::SeqCst) >= 1);
    }
}
