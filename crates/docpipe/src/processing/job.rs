//! One file's journey from `uploading` to `ready` or `failed`

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::events::{RunnerEvent, RunnerReporter};
use super::progress_store::ProgressStore;
use crate::error::{Error, Result};
use crate::ingestion::{DecodeProgress, FileParser};
use crate::storage::RecordStore;
use crate::types::{ContentType, DecodedContent, FileRecord, FileStatus};

/// Highest progress a job reports before the record is `ready`
const DECODE_CEILING: u8 = 99;

/// Simulated progress steps emitted before decoding starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSchedule {
    steps: Vec<u8>,
    delay: Duration,
}

impl Default for ProgressSchedule {
    fn default() -> Self {
        Self {
            steps: vec![10, 25, 50, 75, 90],
            delay: Duration::from_millis(500),
        }
    }
}

impl ProgressSchedule {
    /// Steps must be strictly increasing and within 1..=99
    pub fn new(steps: Vec<u8>, delay: Duration) -> Result<Self> {
        validate_steps(&steps)?;
        Ok(Self { steps, delay })
    }

    /// No simulated steps and no pacing
    pub fn immediate() -> Self {
        Self {
            steps: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn steps(&self) -> &[u8] {
        &self.steps
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Progress reached once every step was emitted
    pub fn floor(&self) -> u8 {
        self.steps.last().copied().unwrap_or(0)
    }
}

fn validate_steps(steps: &[u8]) -> Result<()> {
    if let Some(bad) = steps.iter().find(|&&s| s == 0 || s > DECODE_CEILING) {
        return Err(Error::Config(format!(
            "progress step {} out of range 1..={}",
            bad, DECODE_CEILING
        )));
    }
    if steps.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::Config(
            "progress steps must be strictly increasing".to_string(),
        ));
    }
    Ok(())
}

/// Final result of a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Ready {
        content_type: ContentType,
        row_count: u64,
    },
    Failed {
        reason: String,
    },
    /// Record was deleted (or never existed); nothing recorded
    Missing,
}

/// Published on the runner's completion channel
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub file_id: Uuid,
    pub result: JobResult,
}

/// Everything a job needs, shared by all jobs of a runner
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn RecordStore>,
    pub progress: Arc<ProgressStore>,
    pub parser: Arc<FileParser>,
    pub schedule: ProgressSchedule,
    pub reporter: Arc<dyn RunnerReporter>,
}

enum Interrupted {
    Missing,
    Unexpected(Error),
}

impl From<Error> for Interrupted {
    fn from(err: Error) -> Self {
        Interrupted::Unexpected(err)
    }
}

/// Drive one file through processing. Never fails: every error ends up in
/// the returned outcome and, where possible, in the record itself.
pub async fn run_job(ctx: &JobContext, file_id: Uuid) -> JobOutcome {
    let result = match execute(ctx, file_id).await {
        Ok(result) => result,
        Err(Interrupted::Missing) => record_missing(ctx, file_id),
        Err(Interrupted::Unexpected(err)) => record_unexpected(ctx, file_id, err),
    };

    JobOutcome { file_id, result }
}

async fn execute(ctx: &JobContext, file_id: Uuid) -> std::result::Result<JobResult, Interrupted> {
    let mut record = ctx.store.get(file_id)?.ok_or(Interrupted::Missing)?;

    record.mark_processing(0);
    ctx.store.update(&mut record)?;
    // the uploader seeds the entry; a delete in between must not bring it back
    ctx.progress.update(file_id, Some(0), Some(FileStatus::Processing));
    ctx.reporter.report(RunnerEvent::JobStarted {
        file_id,
        filename: &record.original_filename,
    });

    for &step in ctx.schedule.steps() {
        record.set_progress(step);
        ctx.store.update(&mut record)?;
        ctx.progress
            .update(file_id, Some(step as i32), Some(FileStatus::Processing));
        ctx.reporter.report(RunnerEvent::Progress {
            file_id,
            progress: step,
        });

        if !ctx.schedule.delay().is_zero() {
            tokio::time::sleep(ctx.schedule.delay()).await;
        }
    }

    let decoded = decode(ctx, &record).await?;

    // the decode sink may have advanced progress behind our back
    let mut record = ctx
        .store
        .get(file_id)?
        .ok_or_else(|| Error::not_found(format!("File with ID {} not found", file_id)))?;

    match decoded {
        Ok(decoded) => {
            let row_count = decoded.row_count();
            let content_type = decoded.content_type;

            ctx.store
                .create_parsed_content(file_id, decoded.content, content_type, row_count)?;

            record.mark_ready();
            ctx.store.update(&mut record)?;
            ctx.progress.update(file_id, Some(100), Some(FileStatus::Ready));
            ctx.reporter.report(RunnerEvent::JobCompleted {
                file_id,
                content_type,
                row_count,
            });

            Ok(JobResult::Ready {
                content_type,
                row_count,
            })
        }
        Err(err) => {
            let reason = err.to_string();

            record.mark_failed(reason.clone());
            ctx.store.update(&mut record)?;
            ctx.progress.update(file_id, None, Some(FileStatus::Failed));
            ctx.reporter.report(RunnerEvent::JobFailed {
                file_id,
                content_type: err.content_type(),
                reason: &reason,
            });

            Ok(JobResult::Failed { reason })
        }
    }
}

/// Decode on the blocking pool. The outer error is unexpected (the task
/// panicked), the inner one is a regular decode failure.
async fn decode(ctx: &JobContext, record: &FileRecord) -> Result<Result<DecodedContent>> {
    let sink = JobProgressSink::new(ctx, record.id);
    let parser = ctx.parser.clone();
    let data = record.file_content.clone();
    let declared_type = record.file_type.clone();
    let filename = record.filename.clone();

    let decoded = tokio::task::spawn_blocking(move || {
        parser.decode(&data, &declared_type, &filename, &sink)
    })
    .await
    .map_err(|e| Error::internal(format!("decoder task failed: {}", e)))?;

    match decoded {
        Err(err) if !err.is_decode_failure() => Err(err),
        other => Ok(other),
    }
}

/// Drops whatever progress a racing delete left behind
fn record_missing(ctx: &JobContext, file_id: Uuid) -> JobResult {
    ctx.progress.remove(file_id);
    ctx.reporter.report(RunnerEvent::RecordMissing { file_id });
    JobResult::Missing
}

fn record_unexpected(ctx: &JobContext, file_id: Uuid, err: Error) -> JobResult {
    let reason = format!("Processing error: {}", err);

    let mut record = match ctx.store.get(file_id) {
        Ok(Some(record)) => record,
        Ok(None) => return record_missing(ctx, file_id),
        Err(lookup_err) => {
            ctx.reporter.report(RunnerEvent::FailureNotRecorded {
                file_id,
                error: &reason,
                recording_error: &lookup_err.to_string(),
            });
            return JobResult::Failed { reason };
        }
    };

    record.mark_failed(reason.clone());
    let recorded = ctx
        .store
        .delete_parsed_content(file_id)
        .and_then(|_| ctx.store.update(&mut record));

    if let Err(recording_err) = recorded {
        ctx.reporter.report(RunnerEvent::FailureNotRecorded {
            file_id,
            error: &reason,
            recording_error: &recording_err.to_string(),
        });
    }

    ctx.progress.update(file_id, None, Some(FileStatus::Failed));
    ctx.reporter.report(RunnerEvent::JobFailed {
        file_id,
        content_type: None,
        reason: &reason,
    });

    JobResult::Failed { reason }
}

/// Maps decoder-reported fractions into `floor..=99` and persists only
/// strictly increasing values.
struct JobProgressSink {
    file_id: Uuid,
    store: Arc<dyn RecordStore>,
    progress: Arc<ProgressStore>,
    reporter: Arc<dyn RunnerReporter>,
    floor: u8,
    last: Mutex<u8>,
}

impl JobProgressSink {
    fn new(ctx: &JobContext, file_id: Uuid) -> Self {
        let floor = ctx.schedule.floor();
        Self {
            file_id,
            store: ctx.store.clone(),
            progress: ctx.progress.clone(),
            reporter: ctx.reporter.clone(),
            floor,
            last: Mutex::new(floor),
        }
    }

    fn band_value(&self, fraction: f32) -> u8 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = DECODE_CEILING.saturating_sub(self.floor) as f32;
        self.floor.saturating_add((span * fraction).floor() as u8)
    }
}

impl DecodeProgress for JobProgressSink {
    fn report(&self, fraction: f32) {
        let value = self.band_value(fraction);

        let mut last = self.last.lock();
        if value <= *last {
            return;
        }

        match self.store.get(self.file_id) {
            Ok(Some(mut record)) if record.status == FileStatus::Processing => {
                record.set_progress(value);
                if let Err(e) = self.store.update(&mut record) {
                    tracing::debug!(file_id = %self.file_id, "Skipping decode progress: {}", e);
                    return;
                }
            }
            Ok(_) => return,
            Err(e) => {
                tracing::debug!(file_id = %self.file_id, "Skipping decode progress: {}", e);
                return;
            }
        }

        *last = value;
        self.progress
            .update(self.file_id, Some(value as i32), Some(FileStatus::Processing));
        self.reporter.report(RunnerEvent::Progress {
            file_id: self.file_id,
            progress: value,
        });
    }
}
