//! Upload and query boundary shared by the HTTP handlers

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::ingestion::FileParser;
use crate::processing::{
    JobContext, JobOutcome, JobRunner, ProgressStore, RunnerReporter, TracingRunnerReporter,
};
use crate::storage::{RecordStore, SqliteRecordStore};
use crate::types::{FileRecord, FileStatus, FileSummary, ParsedContent};

/// Fallback when neither the client nor the extension names a type
const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// A file as received from the client
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    /// MIME type sent by the client, if any
    pub declared_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub file_id: Uuid,
    pub filename: String,
    pub status: FileStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ProgressView {
    pub file_id: Uuid,
    pub status: FileStatus,
    pub progress: u8,
}

/// Parsed content once ready, otherwise where processing got to
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ContentView {
    Ready {
        file_id: Uuid,
        filename: String,
        status: FileStatus,
        parsed_content: ParsedContent,
    },
    Pending {
        message: String,
        status: FileStatus,
        progress: u8,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileList {
    pub files: Vec<FileSummary>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

/// Shared service state
#[derive(Clone)]
pub struct FileService {
    inner: Arc<FileServiceInner>,
}

struct FileServiceInner {
    config: AppConfig,
    store: Arc<dyn RecordStore>,
    progress: Arc<ProgressStore>,
    runner: JobRunner,
}

impl FileService {
    /// Open the SQLite store named in the config and start the job runner
    pub fn open(config: AppConfig) -> Result<Self> {
        let store = SqliteRecordStore::new(&config.storage.database_path)?;
        Self::new(config, Arc::new(store))
    }

    /// Build the service on top of an existing store. Must be called inside
    /// a tokio runtime.
    pub fn new(config: AppConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        Self::with_components(
            config,
            store,
            FileParser::default(),
            Arc::new(TracingRunnerReporter),
        )
    }

    pub fn with_components(
        config: AppConfig,
        store: Arc<dyn RecordStore>,
        parser: FileParser,
        reporter: Arc<dyn RunnerReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let progress = Arc::new(ProgressStore::new());
        let ctx = JobContext {
            store: store.clone(),
            progress: progress.clone(),
            parser: Arc::new(parser),
            schedule: config.processing.schedule()?,
            reporter,
        };
        let runner = JobRunner::new(ctx, &config.processing);

        Ok(Self {
            inner: Arc::new(FileServiceInner {
                config,
                store,
                progress,
                runner,
            }),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn progress_store(&self) -> &Arc<ProgressStore> {
        &self.inner.progress
    }

    /// Register the file, seed its progress entry and queue processing
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadResponse> {
        let filename = request.filename.trim().to_string();
        if filename.is_empty() {
            return Err(Error::BadRequest("No file provided".to_string()));
        }

        let max = self.inner.config.server.max_upload_size;
        if request.data.len() > max {
            return Err(Error::PayloadTooLarge {
                size: request.data.len(),
                max,
            });
        }

        let file_type = request
            .declared_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| {
                mime_guess::from_path(&filename)
                    .first_raw()
                    .unwrap_or(DEFAULT_FILE_TYPE)
                    .to_string()
            });

        let mut record = FileRecord::new(filename, file_type, request.data);
        self.inner.store.save(&mut record)?;
        self.inner
            .progress
            .set(record.id, Some(0), Some(FileStatus::Uploading));

        if let Err(e) = self.inner.runner.start(record.id).await {
            record.mark_failed(format!("Processing error: {}", e));
            self.inner.store.update(&mut record)?;
            self.inner.progress.set(record.id, None, Some(FileStatus::Failed));
            return Err(e);
        }

        tracing::info!(
            "File uploaded successfully: {} ({} bytes)",
            record.original_filename,
            record.file_size
        );

        Ok(UploadResponse {
            file_id: record.id,
            filename: record.original_filename,
            status: record.status,
            message: "File uploaded successfully and processing started".to_string(),
        })
    }

    /// Current progress, from the progress store when it has an entry
    pub fn progress(&self, id: Uuid) -> Result<ProgressView> {
        if let Some(entry) = self.inner.progress.get(id) {
            return Ok(ProgressView {
                file_id: id,
                status: entry.status,
                progress: entry.progress,
            });
        }

        let record = self.find(id)?;
        Ok(ProgressView {
            file_id: id,
            status: record.status,
            progress: record.progress,
        })
    }

    pub fn content(&self, id: Uuid) -> Result<ContentView> {
        let record = self.find(id)?;

        if record.status != FileStatus::Ready {
            return Ok(ContentView::Pending {
                message: "File upload or processing in progress. Please try again later."
                    .to_string(),
                status: record.status,
                progress: record.progress,
            });
        }

        let parsed_content = self
            .inner
            .store
            .get_parsed_content(id)?
            .ok_or_else(|| Error::not_found("Parsed content not found"))?;

        Ok(ContentView::Ready {
            file_id: id,
            filename: record.original_filename,
            status: record.status,
            parsed_content,
        })
    }

    pub fn list(&self) -> Result<FileList> {
        let files: Vec<FileSummary> = self
            .inner
            .store
            .list()?
            .iter()
            .map(FileSummary::from)
            .collect();

        Ok(FileList {
            total_count: files.len(),
            files,
        })
    }

    /// Drop the progress entry, then the record and its parsed content
    pub fn delete(&self, id: Uuid) -> Result<DeleteResponse> {
        let record = self.find(id)?;

        self.inner.progress.remove(id);
        if !self.inner.store.delete_by_id(id)? {
            return Err(Error::not_found("File not found"));
        }

        tracing::info!("File deleted successfully: {}", record.original_filename);

        Ok(DeleteResponse {
            message: format!("File \"{}\" deleted successfully", record.original_filename),
        })
    }

    /// Wait for queued and running jobs, then stop the runner
    pub async fn shutdown(&self) {
        self.inner.runner.shutdown().await;
    }

    /// Outcomes of jobs finishing after this call
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobOutcome> {
        self.inner.runner.subscribe()
    }

    fn find(&self, id: Uuid) -> Result<FileRecord> {
        self.inner
            .store
            .get(id)?
            .ok_or_else(|| Error::not_found("File not found"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::MemoryRecordStore;
    use crate::types::ContentType;
    use serde_json::json;

    pub(crate) fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.processing.step_delay_ms = 0;
        config.processing.max_concurrent_jobs = Some(2);
        config.server.max_upload_size = 1024;
        config
    }

    pub(crate) fn test_service() -> FileService {
        FileService::new(test_config(), Arc::new(MemoryRecordStore::new())).unwrap()
    }

    fn csv_upload(filename: &str, data: &[u8]) -> UploadRequest {
        UploadRequest {
            filename: filename.to_string(),
            declared_type: Some("text/csv".to_string()),
            data: data.to_vec(),
        }
    }

    /// Wait until the job for `id` reached a terminal status
    pub(crate) async fn wait_for(service: &FileService, id: Uuid) {
        let mut outcomes = service.subscribe();
        while !service.progress(id).unwrap().status.is_terminal() {
            if outcomes.recv().await.unwrap().file_id == id {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_upload_then_read_content() {
        let service = test_service();

        let response = service
            .upload(csv_upload("data.csv", b"a,b\n1,2\n3,4\n5,6"))
            .await
            .unwrap();
        assert_eq!(response.filename, "data.csv");
        assert_eq!(response.status, FileStatus::Uploading);

        wait_for(&service, response.file_id).await;

        let progress = service.progress(response.file_id).unwrap();
        assert_eq!(progress.status, FileStatus::Ready);
        assert_eq!(progress.progress, 100);

        match service.content(response.file_id).unwrap() {
            ContentView::Ready { parsed_content, .. } => {
                assert_eq!(parsed_content.content_type, ContentType::Csv);
                assert_eq!(parsed_content.row_count, 3);
                assert_eq!(parsed_content.content["headers"], json!(["a", "b"]));
            }
            other => panic!("expected ready content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let service = test_service();

        let err = service.upload(csv_upload("  ", b"a\n1\n")).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let err = service
            .upload(csv_upload("big.csv", &vec![b'x'; 2048]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { size: 2048, max: 1024 }));
        assert_eq!(service.list().unwrap().total_count, 0);
    }

    #[tokio::test]
    async fn test_file_type_guessed_from_extension() {
        let service = test_service();
        let response = service
            .upload(UploadRequest {
                filename: "report.pdf".to_string(),
                declared_type: None,
                data: b"%PDF-1.4".to_vec(),
            })
            .await
            .unwrap();

        let record = service.inner.store.get(response.file_id).unwrap().unwrap();
        assert_eq!(record.file_type, "application/pdf");

        let response = service
            .upload(UploadRequest {
                filename: "blob".to_string(),
                declared_type: Some(String::new()),
                data: b"???".to_vec(),
            })
            .await
            .unwrap();
        let record = service.inner.store.get(response.file_id).unwrap().unwrap();
        assert_eq!(record.file_type, DEFAULT_FILE_TYPE);
    }

    #[tokio::test]
    async fn test_pending_and_failed_content() {
        let service = test_service();
        let response = service
            .upload(csv_upload("bad.csv", b"a,b\n1,2,3\n"))
            .await
            .unwrap();
        wait_for(&service, response.file_id).await;

        match service.content(response.file_id).unwrap() {
            ContentView::Pending { status, .. } => assert_eq!(status, FileStatus::Failed),
            other => panic!("expected pending view, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let service = test_service();
        let response = service
            .upload(csv_upload("data.csv", b"a\n1\n"))
            .await
            .unwrap();
        let id = response.file_id;
        wait_for(&service, id).await;

        let deleted = service.delete(id).unwrap();
        assert_eq!(deleted.message, "File \"data.csv\" deleted successfully");

        assert!(service.progress_store().get(id).is_none());
        assert!(matches!(service.progress(id), Err(Error::NotFound(_))));
        assert!(matches!(service.content(id), Err(Error::NotFound(_))));
        assert!(service.inner.store.get_parsed_content(id).unwrap().is_none());
        assert!(matches!(service.delete(id), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_progress_falls_back_to_store() {
        let service = test_service();
        let mut record = FileRecord::new("x.csv".into(), "text/csv".into(), b"a\n1\n".to_vec());
        record.mark_processing(42);
        service.inner.store.save(&mut record).unwrap();

        let view = service.progress(record.id).unwrap();
        assert_eq!(view.progress, 42);
        assert_eq!(view.status, FileStatus::Processing);

        assert!(matches!(service.progress(Uuid::new_v4()), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let service = test_service();
        let first = service.upload(csv_upload("one.csv", b"a\n1\n")).await.unwrap();
        let second = service.upload(csv_upload("two.csv", b"a\n1\n")).await.unwrap();

        let list = service.list().unwrap();
        assert_eq!(list.total_count, 2);
        assert_eq!(list.files[0].id, second.file_id);
        assert_eq!(list.files[1].id, first.file_id);

        service.shutdown().await;
    }
}
