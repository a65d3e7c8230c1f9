//! Inline Image Materialization
//!
//! Rewrites transient inline image payloads into durable blob URLs
//! before a project row is written. The batch is all-or-nothing from the
//! caller's view: if any upload fails, every blob already uploaded in
//! the same batch is deleted best-effort (compensating rollback) and the
//! original error is returned. A failed rollback step is logged and
//! otherwise swallowed; object storage offers no multi-object atomicity,
//! so orphaned blobs remain observable via logs only.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, warn};
use uuid::Uuid;

use mural_canvas::{CanvasElement, ElementKind, ImageSource};

use crate::blob::BlobStore;
use crate::error::{Result, StorageError};

/// The base64 portion of an inline payload, with any `data:*;base64,`
/// prefix stripped.
pub(crate) fn base64_payload(data: &str) -> &str {
    match data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => data,
    }
}

/// Decode an inline image payload. Accepts raw base64 or a full
/// `data:*;base64,` URL.
pub fn decode_inline(data: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(base64_payload(data).trim())
        .map_err(|e| StorageError::InvalidImage(e.to_string()))
}

/// File extension for a content type, for readable blob keys.
pub(crate) fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

/// Blob key prefix for a project's assets.
#[must_use]
pub fn project_prefix(project_id: Uuid) -> String {
    format!("projects/{project_id}/")
}

/// Upload every inline image in `elements` and rewrite it to reference
/// the resulting durable URL.
///
/// On failure, already-uploaded blobs from this batch are deleted in
/// reverse order and the original error is propagated; the input is consumed
/// either way and the caller must not persist anything on error.
pub async fn materialize_inline_images(
    blobs: &dyn BlobStore,
    project_id: Uuid,
    mut elements: Vec<CanvasElement>,
) -> Result<Vec<CanvasElement>> {
    let mut completed: Vec<String> = Vec::new();

    for element in &mut elements {
        let ElementKind::Image { source } = &mut element.kind else {
            continue;
        };
        let (decoded, content_type) = match &*source {
            ImageSource::Inline { data, content_type } => {
                (decode_inline(data), content_type.clone())
            }
            ImageSource::Url { .. } => continue,
        };

        let bytes = match decoded {
            Ok(bytes) => bytes,
            Err(e) => {
                rollback(blobs, &completed).await;
                return Err(e);
            }
        };

        let path = format!(
            "{}{}.{}",
            project_prefix(project_id),
            element.id,
            extension_for(&content_type)
        );

        let uploaded = blobs.upload(&path, bytes, &content_type).await;
        match uploaded {
            Ok(stored) => {
                debug!(%project_id, element_id = %element.id, path = %stored, "materialized inline image");
                let url = blobs.public_url(&stored);
                completed.push(stored);
                *source = ImageSource::url(url);
            }
            Err(e) => {
                rollback(blobs, &completed).await;
                return Err(StorageError::AssetUpload(e.to_string()));
            }
        }
    }

    Ok(elements)
}

/// Best-effort compensating deletes for a failed batch, newest first.
async fn rollback(blobs: &dyn BlobStore, completed: &[String]) {
    if completed.is_empty() {
        return;
    }
    warn!(
        count = completed.len(),
        "rolling back uploaded assets after batch failure"
    );
    for path in completed.iter().rev() {
        if let Err(e) = blobs.delete(std::slice::from_ref(path)).await {
            // Orphaned blob; nothing further to do but record it.
            warn!(path = %path, error = %e, "asset rollback delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{BlobError, MemoryBlobStore, MockBlobStore};
    use mural_canvas::CanvasElement;

    fn inline_image(data: &str) -> CanvasElement {
        CanvasElement::image(
            ImageSource::inline(data, "image/png"),
            0.0,
            0.0,
            10.0,
            10.0,
        )
    }

    fn url_of(element: &CanvasElement) -> Option<&str> {
        match &element.kind {
            ElementKind::Image {
                source: ImageSource::Url { url },
            } => Some(url),
            _ => None,
        }
    }

    #[test]
    fn test_decode_inline_accepts_data_urls() {
        let plain = decode_inline("aGVsbG8=").unwrap();
        assert_eq!(plain, b"hello");

        let data_url = decode_inline("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(data_url, b"hello");

        assert!(decode_inline("not base64!!!").is_err());
    }

    #[tokio::test]
    async fn test_materialize_rewrites_inline_to_url() {
        let blobs = MemoryBlobStore::default();
        let project_id = Uuid::new_v4();
        let elements = vec![
            CanvasElement::text("untouched", 0.0, 0.0),
            inline_image("aGVsbG8="),
        ];

        let out = materialize_inline_images(&blobs, project_id, elements)
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert!(url_of(&out[0]).is_none());
        let url = url_of(&out[1]).unwrap();
        assert!(url.starts_with("/blobs/projects/"));
        assert!(url.ends_with(".png"));
        assert_eq!(blobs.len(), 1);
    }

    #[tokio::test]
    async fn test_already_durable_urls_are_untouched() {
        let blobs = MemoryBlobStore::default();
        let element =
            CanvasElement::image(ImageSource::url("https://cdn/x.png"), 0.0, 0.0, 1.0, 1.0);

        let out = materialize_inline_images(&blobs, Uuid::new_v4(), vec![element])
            .await
            .unwrap();

        assert_eq!(url_of(&out[0]), Some("https://cdn/x.png"));
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_rolls_back_completed_uploads() {
        let mut blobs = MockBlobStore::new();
        let mut uploads = 0;
        blobs
            .expect_upload()
            .times(3)
            .returning_st(move |path, _, _| {
                uploads += 1;
                if uploads == 3 {
                    Err(BlobError::Backend("quota exceeded".into()))
                } else {
                    Ok(path.to_string())
                }
            });
        blobs
            .expect_public_url()
            .returning(|path| format!("/blobs/{path}"));
        // Both completed uploads must be deleted
        blobs
            .expect_delete()
            .times(2)
            .returning(|_| Ok(()));

        let elements = vec![
            inline_image("aGVsbG8="),
            inline_image("aGVsbG8="),
            inline_image("aGVsbG8="),
        ];

        let result = materialize_inline_images(&blobs, Uuid::new_v4(), elements).await;
        assert!(matches!(result, Err(StorageError::AssetUpload(_))));
    }

    #[tokio::test]
    async fn test_rollback_delete_failure_is_swallowed() {
        let mut blobs = MockBlobStore::new();
        let mut uploads = 0;
        blobs
            .expect_upload()
            .times(2)
            .returning_st(move |path, _, _| {
                uploads += 1;
                if uploads == 2 {
                    Err(BlobError::Backend("disk full".into()))
                } else {
                    Ok(path.to_string())
                }
            });
        blobs
            .expect_public_url()
            .returning(|path| format!("/blobs/{path}"));
        blobs
            .expect_delete()
            .times(1)
            .returning(|_| Err(BlobError::Backend("also down".into())));

        let elements = vec![inline_image("aGVsbG8="), inline_image("aGVsbG8=")];
        let result = materialize_inline_images(&blobs, Uuid::new_v4(), elements).await;

        // The original upload error wins; the failed rollback is logged only
        assert!(matches!(result, Err(StorageError::AssetUpload(_))));
    }

    #[tokio::test]
    async fn test_invalid_base64_rolls_back() {
        let blobs = MemoryBlobStore::default();
        let elements = vec![inline_image("aGVsbG8="), inline_image("%%% not base64")];

        let result = materialize_inline_images(&blobs, Uuid::new_v4(), elements).await;

        assert!(matches!(result, Err(StorageError::InvalidImage(_))));
        // The first upload was compensated
        assert!(blobs.is_empty());
    }
}
