//! Media storage for uploaded avatars and wall logos.
//!
//! Objects live either under a local directory or in a GCS bucket. Either
//! way they're served back through `/api/media/{*path}`, so the public URL
//! doesn't depend on the backend.

use bytes::Bytes;
use chrono::Utc;
use image::ImageReader;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::constants::MAX_IMAGE_DIMENSION;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("GCS error: {0}")]
    Gcs(String),
    #[error("invalid object path")]
    InvalidPath,
    #[error("invalid image: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Clone)]
pub enum MediaStorage {
    Local(PathBuf),
    Gcs {
        client: google_cloud_storage::client::Storage,
        bucket: String,
    },
}

impl MediaStorage {
    /// Upload data under `path`
    pub async fn upload(&self, path: &str, data: Bytes) -> Result<(), StorageError> {
        check_path(path)?;
        match self {
            MediaStorage::Local(root) => {
                let full_path = root.join(path);
                if let Some(parent) = full_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&full_path, &data).await?;
            }
            MediaStorage::Gcs { client, bucket } => {
                let bucket = format!("projects/_/buckets/{}", bucket);
                client
                    .write_object(&bucket, path, data)
                    .send_buffered()
                    .await
                    .map_err(|e| StorageError::Gcs(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Read an object back; None when it doesn't exist
    pub async fn download(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        check_path(path)?;
        match self {
            MediaStorage::Local(root) => {
                let full_path = root.join(path);
                // Symlinks must not escape the storage root
                let (Ok(canonical), Ok(root_canonical)) =
                    (full_path.canonicalize(), root.canonicalize())
                else {
                    return Ok(None);
                };
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidPath);
                }
                match tokio::fs::read(&canonical).await {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            MediaStorage::Gcs { client, bucket } => {
                let bucket = format!("projects/_/buckets/{}", bucket);
                let mut resp = match client.read_object(&bucket, path).send().await {
                    Ok(resp) => resp,
                    Err(_) => return Ok(None),
                };
                let mut data = Vec::new();
                while let Some(chunk) = resp.next().await {
                    data.extend_from_slice(&chunk.map_err(|e| StorageError::Gcs(e.to_string()))?);
                }
                Ok(Some(data))
            }
        }
    }
}

fn check_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() || path.contains("..") || path.contains('\0') || path.starts_with('/') {
        return Err(StorageError::InvalidPath);
    }
    Ok(())
}

/// Object key for a freshly uploaded image, e.g. `logos/wall_7/1733500000000.png`
pub fn image_object_path(kind: &str, owner: &str, owner_id: i64) -> String {
    format!(
        "{}/{}_{}/{}.png",
        kind,
        owner,
        owner_id,
        Utc::now().timestamp_millis()
    )
}

pub fn content_type_for(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Decode an uploaded image, shrink it to fit the max dimension and re-encode as PNG
pub fn prepare_image(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()?;

    let img = if img.width() > MAX_IMAGE_DIMENSION || img.height() > MAX_IMAGE_DIMENSION {
        img.thumbnail(MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION)
    } else {
        img
    };

    let mut output = Cursor::new(Vec::new());
    img.write_to(&mut output, image::ImageFormat::Png)?;
    Ok(output.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_prepare_image_shrinks_large() {
        let out = prepare_image(&png(2048, 1024)).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.width(), MAX_IMAGE_DIMENSION);
        assert_eq!(img.height(), MAX_IMAGE_DIMENSION / 2);
    }

    #[test]
    fn test_prepare_image_keeps_small() {
        let out = prepare_image(&png(40, 30)).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn test_prepare_image_rejects_garbage() {
        assert!(prepare_image(b"definitely not an image").is_err());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("logos/wall_1/1.png"), "image/png");
        assert_eq!(content_type_for("a/b.JPG"), "application/octet-stream");
        assert_eq!(content_type_for("a/b.jpeg"), "image/jpeg");
    }

    #[tokio::test]
    async fn test_local_round_trip_and_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::Local(dir.path().to_path_buf());

        storage
            .upload("avatars/user_1/1.png", Bytes::from_static(b"img"))
            .await
            .unwrap();
        let data = storage.download("avatars/user_1/1.png").await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"img"[..]));

        assert!(storage.download("avatars/missing.png").await.unwrap().is_none());
        assert!(matches!(
            storage.download("../etc/passwd").await,
            Err(StorageError::InvalidPath)
        ));
        assert!(matches!(
            storage.upload("/abs.png", Bytes::new()).await,
            Err(StorageError::InvalidPath)
        ));
    }
}
