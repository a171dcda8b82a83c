//! File upload, progress and content endpoints

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::service::{
    ContentView, DeleteResponse, FileList, FileService, ProgressView, UploadRequest,
};

/// POST /api/files/upload - Store a file and start processing
pub async fn upload_file(
    State(service): State<FileService>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, &service))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let declared_type = field.content_type().map(|s| s.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, &service))?;

        upload = Some(UploadRequest {
            filename,
            declared_type,
            data: data.to_vec(),
        });
        break;
    }

    let upload = upload.ok_or_else(|| Error::BadRequest("No file provided".to_string()))?;
    let response = service.upload(upload).await?;

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// GET /api/files - List all uploaded files
pub async fn list_files(State(service): State<FileService>) -> Result<Json<FileList>> {
    Ok(Json(service.list()?))
}

/// GET /api/files/:id - Parsed content, or 202 while not ready
pub async fn get_file_content(
    State(service): State<FileService>,
    Path(id): Path<String>,
) -> Result<Response> {
    let view = service.content(parse_id(&id)?)?;

    let status = match view {
        ContentView::Ready { .. } => StatusCode::OK,
        ContentView::Pending { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(view)).into_response())
}

/// GET /api/files/:id/progress
pub async fn get_file_progress(
    State(service): State<FileService>,
    Path(id): Path<String>,
) -> Result<Json<ProgressView>> {
    Ok(Json(service.progress(parse_id(&id)?)?))
}

/// DELETE /api/files/:id/delete
pub async fn delete_file(
    State(service): State<FileService>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    Ok(Json(service.delete(parse_id(&id)?)?))
}

/// Malformed ids can't name a stored file
fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| Error::not_found("File not found"))
}

fn multipart_error(err: MultipartError, service: &FileService) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let max = service.config().server.max_upload_size;
        return Error::PayloadTooLarge {
            size: max.saturating_add(1),
            max,
        };
    }
    Error::BadRequest(format!("Failed to read multipart field: {}", err))
}
