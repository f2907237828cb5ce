//! Uploaded documents and their identity.
//!
//! A `Document` owns a private temporary directory holding the uploaded
//! bytes. Dropping the document removes the directory.

use askdoc_core::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Raw upload as received from the user interface.
#[derive(Clone)]
pub struct DocumentUpload {
    /// File name as given by the user (no directories)
    pub name: String,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read an upload from disk, keeping only the file name.
    pub async fn from_path(path: &Path) -> AppResult<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::InvalidInput(format!("Not a file path: {:?}", path)))?
            .to_string();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Indexing(format!("Failed to read {:?}: {}", path, e)))?;

        Ok(Self { name, bytes })
    }

    /// Identity of this upload: name plus content fingerprint.
    pub fn identity(&self) -> DocumentIdentity {
        DocumentIdentity::compute(&self.name, &self.bytes)
    }
}

impl fmt::Debug for DocumentUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentUpload")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Name plus SHA-256 of the content.
///
/// Two uploads are the same document only when both match, so a renamed copy
/// or an edited file with the same name is a different document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentIdentity {
    pub name: String,
    pub fingerprint: String,
}

impl DocumentIdentity {
    pub fn compute(name: &str, bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self {
            name: name.to_string(),
            fingerprint: format!("{:x}", digest),
        }
    }

    /// First 12 hex digits, for logs.
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..self.fingerprint.len().min(12)]
    }
}

impl fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.short_fingerprint())
    }
}

/// A materialized upload.
#[derive(Debug)]
pub struct Document {
    identity: DocumentIdentity,
    path: PathBuf,
    size_bytes: u64,
    uploaded_at: DateTime<Utc>,
    // Held for its Drop: removes the directory and the file in it.
    _dir: TempDir,
}

impl Document {
    /// Write the upload into a fresh temporary directory.
    pub fn materialize(upload: DocumentUpload) -> AppResult<Self> {
        let identity = upload.identity();

        let file_name = Path::new(&upload.name)
            .file_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                AppError::InvalidInput(format!("Invalid document name: '{}'", upload.name))
            })?
            .to_owned();

        let dir = tempfile::Builder::new().prefix("askdoc-").tempdir()?;
        let path = dir.path().join(file_name);
        std::fs::write(&path, &upload.bytes)?;

        tracing::debug!("Materialized {} at {:?}", identity, path);

        Ok(Self {
            identity,
            path,
            size_bytes: upload.bytes.len() as u64,
            uploaded_at: Utc::now(),
            _dir: dir,
        })
    }

    pub fn identity(&self) -> &DocumentIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Path of the stored bytes inside the document's temporary directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_depends_on_name_and_content() {
        let a = DocumentIdentity::compute("manual.pdf", b"v1");
        let b = DocumentIdentity::compute("manual.pdf", b"v1");
        let edited = DocumentIdentity::compute("manual.pdf", b"v2");
        let renamed = DocumentIdentity::compute("manual-copy.pdf", b"v1");

        assert_eq!(a, b);
        assert_ne!(a, edited);
        assert_ne!(a, renamed);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn test_materialize_and_cleanup() {
        let document =
            Document::materialize(DocumentUpload::new("manual.txt", b"two year warranty".to_vec()))
                .unwrap();
        let path = document.path().to_path_buf();
        let dir = path.parent().unwrap().to_path_buf();

        assert_eq!(std::fs::read(&path).unwrap(), b"two year warranty");
        assert_eq!(document.size_bytes(), 17);

        drop(document);
        assert!(!dir.exists());
    }

    #[test]
    fn test_materialize_strips_directories() {
        let document =
            Document::materialize(DocumentUpload::new("../../etc/manual.txt", b"x".to_vec()))
                .unwrap();
        assert_eq!(document.path().file_name().unwrap(), "manual.txt");
    }

    #[test]
    fn test_materialize_rejects_empty_name() {
        let result = Document::materialize(DocumentUpload::new("", b"x".to_vec()));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
