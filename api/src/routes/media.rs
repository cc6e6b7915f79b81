//! Media serving (/media/*) and the image upload path shared by avatars and logos

use axum::{
    Router,
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
};
use bytes::Bytes;
use std::sync::Arc;

use crate::AppState;
use crate::services::error::{ApiError, LogErr};
use crate::storage::{self, StorageError};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/media/{*path}", get(serve_media))
}

/// Public URL under which an object key is served
pub fn media_url(public_api_url: &str, path: &str) -> String {
    format!("{}/api/media/{}", public_api_url.trim_end_matches('/'), path)
}

/// GET /media/{*path} - Serve an uploaded image
async fn serve_media(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = match state.media.download(&path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Err(ApiError::not_found("Media not found")),
        Err(StorageError::InvalidPath) => return Err(ApiError::forbidden("Invalid media path")),
        Err(e) => {
            tracing::error!(error = %e, path = %path, "media download failed");
            return Err(ApiError::internal());
        }
    };

    // Object keys carry a timestamp, so content never changes under a path
    Ok((
        [
            (header::CONTENT_TYPE, storage::content_type_for(&path)),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    ))
}

/// Pull the `file` field out of a multipart upload
async fn read_file_field(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .log_as("multipart field error", ApiError::bad_request("Invalid multipart body"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .log_as("multipart read error", ApiError::bad_request("Invalid multipart body"))?;
        if bytes.is_empty() {
            return Err(ApiError::bad_request("Empty file"));
        }
        return Ok(bytes);
    }
    Err(ApiError::bad_request("Missing file field"))
}

/// Validate, shrink and store an uploaded image; returns its public URL
pub(crate) async fn store_uploaded_image(
    state: &AppState,
    multipart: &mut Multipart,
    kind: &str,
    owner: &str,
    owner_id: i64,
) -> Result<String, ApiError> {
    let raw = read_file_field(multipart).await?;

    // Decoding is CPU bound
    let png = tokio::task::spawn_blocking(move || storage::prepare_image(&raw))
        .await
        .log_500("image task failed")?
        .log_as("image upload rejected", ApiError::bad_request("Unsupported image"))?;

    let path = storage::image_object_path(kind, owner, owner_id);
    state
        .media
        .upload(&path, Bytes::from(png))
        .await
        .log_500("media upload failed")?;

    tracing::info!(path = %path, "image stored");
    Ok(media_url(&state.config.public_api_url, &path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_url() {
        assert_eq!(
            media_url("http://localhost:3000/", "logos/wall_1/5.png"),
            "http://localhost:3000/api/media/logos/wall_1/5.png"
        );
    }
}
