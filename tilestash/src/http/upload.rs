//! Multipart upload reception.

use super::ApiError;
use crate::import::Upload;
use axum::extract::multipart::{Multipart, MultipartError};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::new(e.status(), e.body_text())
}

/// Keeps the client's extension on the spooled file; sniffing reads it.
fn spool_suffix(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

/// Streams the first file field of `multipart` into a temporary file under
/// `dir`.
///
/// The file is deleted when the returned [`Upload`] is dropped, or right
/// away if reception fails.
pub(crate) async fn receive_upload(
    multipart: &mut Multipart,
    dir: &Path,
) -> Result<Upload, ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(original_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            ApiError::internal(format!("failed to create {}: {}", dir.display(), e))
        })?;
        let temp = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&spool_suffix(&original_name))
            .tempfile_in(dir)
            .map_err(|e| ApiError::internal(format!("failed to create upload file: {}", e)))?;
        let (file, path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut written = 0u64;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            file.write_all(&chunk)
                .await
                .map_err(|e| ApiError::internal(format!("failed to store upload: {}", e)))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| ApiError::internal(format!("failed to store upload: {}", e)))?;

        debug!(
            file = %original_name,
            bytes = written,
            path = %path.display(),
            "Upload received"
        );
        return Ok(Upload::temporary(path, Some(original_name)));
    }
    Err(ApiError::bad_request("request contains no file"))
}
