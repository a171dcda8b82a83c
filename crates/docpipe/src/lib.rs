//! docpipe: document upload pipeline with background parsing and progress tracking
//!
//! Uploaded CSV, Excel and PDF files are registered in a record store, parsed
//! by a bounded pool of background jobs, and exposed as structured JSON. Job
//! progress is mirrored into an in-memory store for cheap polling.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod server;
pub mod service;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use service::FileService;
pub use types::{ContentType, FileRecord, FileStatus, ParsedContent};
