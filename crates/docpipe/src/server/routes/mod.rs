//! API routes for the document pipeline

pub mod files;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::service::FileService;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<FileService> {
    Router::new()
        .route("/files", get(files::list_files))
        // Upload - with larger body limit so oversized files reach our own check
        .route(
            "/files/upload",
            post(files::upload_file)
                .layer(DefaultBodyLimit::max(max_upload_size.saturating_add(MULTIPART_OVERHEAD))),
        )
        .route("/files/:id", get(files::get_file_content))
        .route("/files/:id/progress", get(files::get_file_progress))
        .route("/files/:id/delete", delete(files::delete_file))
}
