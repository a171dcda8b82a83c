//! Storage module for file records and parsed content
//!
//! The [`RecordStore`] trait is the durable source of truth for the pipeline.
//! Provides a SQLite implementation and an in-memory one.

mod database;
mod memory;

pub use database::SqliteRecordStore;
pub use memory::MemoryRecordStore;

use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{ContentType, FileRecord, ParsedContent};

/// Durable store for file metadata, raw content, and parsed output.
///
/// Implementations must give read-your-writes consistency: a record written
/// by `save`/`update` is returned by the next `get` on the same id.
pub trait RecordStore: Send + Sync {
    /// Get a record by id
    fn get(&self, id: Uuid) -> Result<Option<FileRecord>>;

    /// Insert or replace a record. Refreshes `updated_at`.
    fn save(&self, record: &mut FileRecord) -> Result<()>;

    /// Replace an existing record. Refreshes `updated_at`.
    ///
    /// Fails with `Error::NotFound` when the record is gone, so a deleted
    /// record is never re-inserted.
    fn update(&self, record: &mut FileRecord) -> Result<()>;

    /// Store the parsed content of a file. At most one per file.
    fn create_parsed_content(
        &self,
        file_id: Uuid,
        content: Value,
        content_type: ContentType,
        row_count: u64,
    ) -> Result<ParsedContent>;

    /// Get the parsed content of a file
    fn get_parsed_content(&self, file_id: Uuid) -> Result<Option<ParsedContent>>;

    /// Remove the parsed content of a file, returning whether one existed
    fn delete_parsed_content(&self, file_id: Uuid) -> Result<bool>;

    /// Delete a record and its parsed content
    fn delete_by_id(&self, id: Uuid) -> Result<bool>;

    /// List records, newest first. Raw content is not loaded.
    fn list(&self) -> Result<Vec<FileRecord>>;
}
