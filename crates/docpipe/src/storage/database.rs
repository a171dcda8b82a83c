//! SQLite record store
//!
//! Holds file records, raw uploads and parsed content. Parsed content rows are
//! removed with their file through a foreign key cascade.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

use super::RecordStore;
use crate::error::{Error, Result};
use crate::types::{ContentType, FileRecord, FileStatus, ParsedContent};

const FILE_COLUMNS: &str = "id, filename, original_filename, file_size, file_type, status, \
     progress, file_content, error_message, created_at, updated_at";

const SUMMARY_COLUMNS: &str = "id, filename, original_filename, file_size, file_type, status, \
     progress, NULL, error_message, created_at, updated_at";

/// SQLite-based record store
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::storage(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.migrate()?;
        tracing::info!("Record store opened at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::storage(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                original_filename TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                file_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'uploading',
                progress INTEGER NOT NULL DEFAULT 0,
                file_content BLOB,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_files_created_at ON files(created_at);

            CREATE TABLE IF NOT EXISTS parsed_contents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL,
                row_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );
        "#,
        )
        .map_err(|e| Error::storage(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Database migrations complete");
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn get(&self, id: Uuid) -> Result<Option<FileRecord>> {
        let conn = self.conn.lock();

        let record = conn
            .query_row(
                &format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS),
                params![id.to_string()],
                row_to_file_record,
            )
            .optional()
            .map_err(|e| Error::storage(format!("Failed to get file record: {}", e)))?;

        Ok(record)
    }

    fn save(&self, record: &mut FileRecord) -> Result<()> {
        record.updated_at = Utc::now();
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO files (
                id, filename, original_filename, file_size, file_type, status,
                progress, file_content, error_message, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                filename = excluded.filename,
                original_filename = excluded.original_filename,
                file_size = excluded.file_size,
                file_type = excluded.file_type,
                status = excluded.status,
                progress = excluded.progress,
                file_content = excluded.file_content,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
            params![
                record.id.to_string(),
                record.filename,
                record.original_filename,
                record.file_size as i64,
                record.file_type,
                record.status.as_str(),
                record.progress as i64,
                record.file_content,
                record.error_message,
                format_timestamp(&record.created_at),
                format_timestamp(&record.updated_at),
            ],
        )
        .map_err(|e| Error::storage(format!("Failed to save file record: {}", e)))?;

        Ok(())
    }

    fn update(&self, record: &mut FileRecord) -> Result<()> {
        record.updated_at = Utc::now();
        let conn = self.conn.lock();

        // Raw content never changes after upload, so it is not rewritten here.
        let count = conn
            .execute(
                r#"
                UPDATE files SET
                    filename = ?2,
                    original_filename = ?3,
                    file_size = ?4,
                    file_type = ?5,
                    status = ?6,
                    progress = ?7,
                    error_message = ?8,
                    updated_at = ?9
                WHERE id = ?1
                "#,
                params![
                    record.id.to_string(),
                    record.filename,
                    record.original_filename,
                    record.file_size as i64,
                    record.file_type,
                    record.status.as_str(),
                    record.progress as i64,
                    record.error_message,
                    format_timestamp(&record.updated_at),
                ],
            )
            .map_err(|e| Error::storage(format!("Failed to update file record: {}", e)))?;

        if count == 0 {
            return Err(Error::not_found(format!("File with ID {} not found", record.id)));
        }
        Ok(())
    }

    fn create_parsed_content(
        &self,
        file_id: Uuid,
        content: Value,
        content_type: ContentType,
        row_count: u64,
    ) -> Result<ParsedContent> {
        let conn = self.conn.lock();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM files WHERE id = ?1)",
                params![file_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| Error::storage(format!("Failed to check file record: {}", e)))?;
        if !exists {
            return Err(Error::not_found(format!("File with ID {} not found", file_id)));
        }

        let parsed = ParsedContent {
            file_id,
            content,
            content_type,
            row_count,
            created_at: Utc::now(),
        };

        conn.execute(
            r#"
            INSERT INTO parsed_contents (file_id, content, content_type, row_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                file_id.to_string(),
                serde_json::to_string(&parsed.content)?,
                content_type.as_str(),
                row_count as i64,
                format_timestamp(&parsed.created_at),
            ],
        )
        .map_err(|e| Error::storage(format!("Failed to create parsed content: {}", e)))?;

        Ok(parsed)
    }

    fn get_parsed_content(&self, file_id: Uuid) -> Result<Option<ParsedContent>> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(
                "SELECT content, content_type, row_count, created_at FROM parsed_contents WHERE file_id = ?1",
                params![file_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::storage(format!("Failed to get parsed content: {}", e)))?;

        match row {
            Some((content, content_type, row_count, created_at)) => Ok(Some(ParsedContent {
                file_id,
                content: serde_json::from_str(&content)?,
                content_type: ContentType::from_tag(&content_type),
                row_count: row_count.max(0) as u64,
                created_at: parse_timestamp(&created_at),
            })),
            None => Ok(None),
        }
    }

    fn delete_parsed_content(&self, file_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();

        let count = conn
            .execute(
                "DELETE FROM parsed_contents WHERE file_id = ?1",
                params![file_id.to_string()],
            )
            .map_err(|e| Error::storage(format!("Failed to delete parsed content: {}", e)))?;

        Ok(count > 0)
    }

    fn delete_by_id(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();

        let count = conn
            .execute("DELETE FROM files WHERE id = ?1", params![id.to_string()])
            .map_err(|e| Error::storage(format!("Failed to delete file record: {}", e)))?;

        Ok(count > 0)
    }

    fn list(&self) -> Result<Vec<FileRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM files ORDER BY created_at DESC",
                SUMMARY_COLUMNS
            ))
            .map_err(|e| Error::storage(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map([], row_to_file_record)
            .map_err(|e| Error::storage(format!("Failed to list file records: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }
}

// Helper functions

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_file_record(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(5)?;
    let progress: i64 = row.get(6)?;
    let file_content: Option<Vec<u8>> = row.get(7)?;
    let created_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(FileRecord {
        id,
        filename: row.get(1)?,
        original_filename: row.get(2)?,
        file_size: row.get::<_, i64>(3)?.max(0) as u64,
        file_type: row.get(4)?,
        status: FileStatus::from_str_opt(&status_str).unwrap_or(FileStatus::Failed),
        progress: progress.clamp(0, 100) as u8,
        file_content: file_content.unwrap_or_default(),
        error_message: row.get(8)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}
