//! services/client/src/app/upload.rs
//!
//! Turns files on disk into a validated `DocumentUpload`.

use crate::error::ClientError;
use bytes::Bytes;
use docqa_core::{
    domain::{DocumentUpload, UploadFile, ValidationError, DOCUMENT_MEDIA_TYPE, MAX_UPLOAD_BYTES},
    ports::PortError,
};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PDF_MAGIC: &[u8] = b"%PDF-";
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Reads and validates a file selection. Oversized files are refused before they are read.
pub async fn prepare_upload(
    paths: &[PathBuf],
    title: Option<&str>,
) -> Result<DocumentUpload, ClientError> {
    if paths.len() != 1 {
        return Err(invalid(ValidationError::FileCount(paths.len())));
    }
    let file = load_upload(&paths[0]).await?;
    DocumentUpload::new(vec![file], title).map_err(invalid)
}

/// Reads one file and works out its media type from its content, then its extension.
pub async fn load_upload(path: &Path) -> Result<UploadFile, ClientError> {
    let size = tokio::fs::metadata(path).await?.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(invalid(ValidationError::FileTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        }));
    }

    let bytes = Bytes::from(tokio::fs::read(path).await?);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let content_type = media_type(&bytes, path).to_string();
    debug!("Loaded {} ({} bytes, {}).", file_name, bytes.len(), content_type);

    Ok(UploadFile {
        file_name,
        content_type,
        bytes,
    })
}

fn media_type(bytes: &[u8], path: &Path) -> &'static str {
    let pdf_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if bytes.starts_with(PDF_MAGIC) || pdf_extension {
        DOCUMENT_MEDIA_TYPE
    } else {
        FALLBACK_MEDIA_TYPE
    }
}

fn invalid(err: ValidationError) -> ClientError {
    warn!("Upload rejected: {}", err);
    ClientError::Port(PortError::Validation(err))
}
