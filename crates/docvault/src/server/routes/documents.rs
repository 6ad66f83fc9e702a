//! Document management API endpoints

use axum::{
    body::Body,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use tokio_util::io::ReaderStream;

use crate::error::{Error, Result};
use crate::ingestion::UploadRequest;
use crate::server::state::AppState;
use crate::types::{DeleteResponse, DocumentRecord, ListDocumentsQuery};

/// Multipart field carrying the file bytes
const FILE_FIELD: &str = "file";

/// Multipart field carrying the display name
const NAME_FIELD: &str = "name";

/// POST /documents - Upload a document
pub async fn upload_document(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<DocumentRecord>)> {
    let mut multipart = multipart.map_err(|e| Error::validation(e.body_text()))?;
    let limit = state.pipeline().policy().max_upload_size();

    let mut upload = UploadRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            FILE_FIELD => {
                upload.filename = field.file_name().map(str::to_string);
                upload.data = Some(field.bytes().await.map_err(|e| multipart_error(e, limit))?);
            }
            NAME_FIELD => {
                upload.name = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            other => {
                tracing::debug!("Ignoring multipart field '{}'", other);
            }
        }
    }

    let record = state.pipeline().create(upload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

fn multipart_error(err: MultipartError, limit: usize) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::validation(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// GET /documents - List documents
pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<DocumentRecord>>> {
    let filter = params.into_filter()?;
    let records = state.pipeline().list(filter).await?;
    Ok(Json(records))
}

/// GET /documents/:id - Get document details
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentRecord>> {
    Ok(Json(state.pipeline().get(&id).await?))
}

/// GET /documents/:id/download - Download the stored file
pub async fn download_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let (record, reader) = state.pipeline().open(&id).await?;

    let disposition = HeaderValue::from_str(&content_disposition(&record.download_filename()))
        .map_err(|e| Error::internal(format!("Invalid Content-Disposition: {}", e)))?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

/// DELETE /documents/:id - Delete a document and its file
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let record = state.pipeline().delete(&id).await?;
    Ok(Json(DeleteResponse::new(&record.id, &record.name)))
}

/// POST /documents/:id/verify - Run the post-upload check
pub async fn verify_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentRecord>> {
    Ok(Json(state.pipeline().verify(&id).await?))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    if filename.is_ascii() && fallback == filename {
        return format!("attachment; filename=\"{}\"", fallback);
    }

    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback, encoded
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_plain() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
    }

    #[test]
    fn test_content_disposition_escapes() {
        assert_eq!(
            content_disposition("a\"b.txt"),
            "attachment; filename=\"a_b.txt\"; filename*=UTF-8''a%22b.txt"
        );
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename=\"r_sum_.pdf\"; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
    }
}
