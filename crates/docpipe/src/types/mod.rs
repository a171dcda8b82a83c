//! Core types for the document pipeline

pub mod content;
pub mod file_record;

pub use content::{ContentType, DecodedContent};
pub use file_record::{FileRecord, FileStatus, FileSummary, ParsedContent};
