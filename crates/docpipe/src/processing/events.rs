//! Job runner observability

use uuid::Uuid;

use crate::types::ContentType;

/// Events emitted by the job runner during its lifecycle.
#[derive(Debug)]
pub enum RunnerEvent<'a> {
    /// Runner accepted a job into its queue
    JobQueued { file_id: Uuid },
    /// A job moved its record into `processing`
    JobStarted { file_id: Uuid, filename: &'a str },
    /// A job persisted a new progress value
    Progress { file_id: Uuid, progress: u8 },
    /// Parsed content stored, record is `ready`
    JobCompleted {
        file_id: Uuid,
        content_type: ContentType,
        row_count: u64,
    },
    /// Record is `failed` with the given reason
    JobFailed {
        file_id: Uuid,
        content_type: Option<ContentType>,
        reason: &'a str,
    },
    /// The record was gone when the job needed it; nothing was recorded
    RecordMissing { file_id: Uuid },
    /// The job failed and writing the failure to the record store failed too
    FailureNotRecorded {
        file_id: Uuid,
        error: &'a str,
        recording_error: &'a str,
    },
}

/// Callback trait for observing runner events.
///
/// The default implementation ignores every event.
pub trait RunnerReporter: Send + Sync {
    fn report(&self, event: RunnerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that logs events with `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunnerReporter;

impl RunnerReporter for TracingRunnerReporter {
    fn report(&self, event: RunnerEvent<'_>) {
        match event {
            RunnerEvent::JobQueued { file_id } => {
                tracing::debug!(%file_id, "Job queued");
            }
            RunnerEvent::JobStarted { file_id, filename } => {
                tracing::info!(%file_id, %filename, "Processing file");
            }
            RunnerEvent::Progress { file_id, progress } => {
                tracing::debug!(%file_id, progress, "Progress updated");
            }
            RunnerEvent::JobCompleted {
                file_id,
                content_type,
                row_count,
            } => {
                tracing::info!(%file_id, %content_type, row_count, "File processed");
            }
            RunnerEvent::JobFailed {
                file_id,
                content_type,
                reason,
            } => {
                let content_type = content_type.map(|ct| ct.as_str()).unwrap_or("-");
                tracing::warn!(%file_id, content_type, %reason, "File processing failed");
            }
            RunnerEvent::RecordMissing { file_id } => {
                tracing::warn!(%file_id, "File record not found, nothing recorded");
            }
            RunnerEvent::FailureNotRecorded {
                file_id,
                error,
                recording_error,
            } => {
                tracing::error!(
                    %file_id,
                    %error,
                    %recording_error,
                    "Could not record processing failure"
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use parking_lot::Mutex;

    /// Owned copy of an event, for assertions
    #[derive(Debug, Clone, PartialEq)]
    pub enum Recorded {
        Queued(Uuid),
        Started(Uuid),
        Progress(Uuid, u8),
        Completed(Uuid, ContentType, u64),
        Failed(Uuid, Option<ContentType>, String),
        Missing(Uuid),
        NotRecorded(Uuid, String),
    }

    #[derive(Debug, Default)]
    pub struct RecordingReporter {
        pub events: Mutex<Vec<Recorded>>,
    }

    impl RecordingReporter {
        pub fn events(&self) -> Vec<Recorded> {
            self.events.lock().clone()
        }

        pub fn progress_for(&self, id: Uuid) -> Vec<u8> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    Recorded::Progress(file_id, p) if *file_id == id => Some(*p),
                    _ => None,
                })
                .collect()
        }
    }

    impl RunnerReporter for RecordingReporter {
        fn report(&self, event: RunnerEvent<'_>) {
            let recorded = match event {
                RunnerEvent::JobQueued { file_id } => Recorded::Queued(file_id),
                RunnerEvent::JobStarted { file_id, .. } => Recorded::Started(file_id),
                RunnerEvent::Progress { file_id, progress } => Recorded::Progress(file_id, progress),
                RunnerEvent::JobCompleted {
                    file_id,
                    content_type,
                    row_count,
                } => Recorded::Completed(file_id, content_type, row_count),
                RunnerEvent::JobFailed {
                    file_id,
                    content_type,
                    reason,
                } => Recorded::Failed(file_id, content_type, reason.to_string()),
                RunnerEvent::RecordMissing { file_id } => Recorded::Missing(file_id),
                RunnerEvent::FailureNotRecorded { file_id, error, .. } => {
                    Recorded::NotRecorded(file_id, error.to_string())
                }
            };
            self.events.lock().push(recorded);
        }
    }
}
