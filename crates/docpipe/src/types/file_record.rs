//! File record types for tracking upload and processing status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

use super::ContentType;

/// Status of an uploaded file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Registered, job not started yet
    Uploading,
    /// Job running
    Processing,
    /// Parsed content available
    Ready,
    /// Job ended with an error
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "uploading" => Some(Self::Uploading),
            "processing" => Some(Self::Processing),
            "ready" => Some(Self::Ready),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// `ready` and `failed` end a job
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded file and its processing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique record ID
    pub id: Uuid,
    /// Stored filename, `<id>.<ext>` so it never clashes with another upload
    pub filename: String,
    /// Filename as uploaded
    pub original_filename: String,
    /// File size in bytes
    pub file_size: u64,
    /// Declared MIME type
    pub file_type: String,
    /// Processing status
    pub status: FileStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Raw uploaded bytes
    #[serde(skip)]
    pub file_content: Vec<u8>,
    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Create a new record in the `uploading` state
    pub fn new(original_filename: String, file_type: String, file_content: Vec<u8>) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Self {
            id,
            filename: stored_filename(id, &original_filename),
            original_filename,
            file_size: file_content.len() as u64,
            file_type,
            status: FileStatus::Uploading,
            progress: 0,
            file_content,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set progress, clamped to 100
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    /// Move into `processing` at the given progress
    pub fn mark_processing(&mut self, progress: u8) {
        self.status = FileStatus::Processing;
        self.set_progress(progress);
    }

    /// Mark as ready after parsed content was stored
    pub fn mark_ready(&mut self) {
        self.status = FileStatus::Ready;
        self.progress = 100;
        self.error_message = None;
    }

    /// Mark as failed; progress is left untouched
    pub fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.status = FileStatus::Failed;
        self.error_message = Some(error_message.into());
    }
}

/// Parsed output of a successful job
#[derive(Debug, Clone, Serialize)]
pub struct ParsedContent {
    /// Owning file record
    #[serde(skip_serializing)]
    pub file_id: Uuid,
    /// Format-specific payload
    pub content: Value,
    pub content_type: ContentType,
    /// Data rows for tabular content, pages with text for PDF
    pub row_count: u64,
    pub created_at: DateTime<Utc>,
}

/// Summary of a file record for list responses
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
    pub file_size: u64,
}

impl From<&FileRecord> for FileSummary {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename.clone(),
            original_filename: record.original_filename.clone(),
            status: record.status,
            created_at: record.created_at,
            file_size: record.file_size,
        }
    }
}

fn stored_filename(id: Uuid, original_filename: &str) -> String {
    match Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
    {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}
