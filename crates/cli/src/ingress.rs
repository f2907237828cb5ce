//! Document ingress checks.
//!
//! Only PDFs are accepted unless text documents are explicitly allowed.

use askdoc_core::{AppError, AppResult};
use askdoc_knowledge::DocumentUpload;
use std::path::Path;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Reject paths that are not PDFs (or text files, with `allow_text`).
pub fn check_document_path(path: &Path, allow_text: bool) -> AppResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if extension == "pdf" || (allow_text && TEXT_EXTENSIONS.contains(&extension.as_str())) {
        return Ok(());
    }

    let accepted = if allow_text {
        ".pdf, .txt, .md"
    } else {
        ".pdf (pass --allow-text for .txt and .md)"
    };
    Err(AppError::InvalidInput(format!(
        "Unsupported document {:?}; accepted: {}",
        path, accepted
    )))
}

/// Check and read a document for upload.
pub async fn read_document(path: &Path, allow_text: bool) -> AppResult<DocumentUpload> {
    check_document_path(path, allow_text)?;
    DocumentUpload::from_path(path).await
}
