//! Payment-proof screenshots. Written once, outside any transaction; a file
//! whose order later fails to save is simply left behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use rand::Rng;

use crate::{Result, StorefrontError};

/// Public URL prefix the stored files are served under.
pub const PROOF_URL_PREFIX: &str = "/uploads/screenshots";

#[derive(Clone, Debug)]
pub struct ProofUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores the image and returns the reference kept on the order.
    async fn store_proof(&self, upload: ProofUpload) -> Result<String>;
}

/// Checks done before anything touches the disk.
pub fn check_proof(upload: &ProofUpload, max_bytes: usize) -> Result<()> {
    let is_image = upload.content_type.as_deref().is_some_and(|ct| ct.starts_with("image/"));
    if !is_image {
        return Err(StorefrontError::validation("Only image files are allowed!"));
    }
    if upload.bytes.len() > max_bytes {
        return Err(StorefrontError::validation(format!(
            "Screenshot must be smaller than {} MB", max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

/// `payment-<millis>-<random>.<ext>`, keeping the client's extension only
/// when it is short and alphanumeric.
fn proof_file_name(original: Option<&str>) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    let stem = format!("payment-{}-{suffix}", Utc::now().timestamp_millis());
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match ext {
        Some(ext) => format!("{stem}.{}", ext.to_ascii_lowercase()),
        None => stem,
    }
}

/// Writes proofs into a local directory, created on first use.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    dir: PathBuf,
    max_bytes: usize,
}

impl LocalFileStorage {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self { dir: dir.into(), max_bytes }
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn store_proof(&self, upload: ProofUpload) -> Result<String> {
        check_proof(&upload, self.max_bytes)?;
        let name = proof_file_name(upload.file_name.as_deref());
        let io = |e: std::io::Error| StorefrontError::Storage(format!("upload write failed: {e}"));
        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;
        tokio::fs::write(self.dir.join(&name), &upload.bytes).await.map_err(io)?;
        tracing::info!(file = %name, size = upload.bytes.len(), "payment proof stored");
        Ok(format!("{PROOF_URL_PREFIX}/{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(content_type: &str, size: usize) -> ProofUpload {
        ProofUpload {
            file_name: Some("receipt.PNG".into()),
            content_type: Some(content_type.into()),
            bytes: Bytes::from(vec![0u8; size]),
        }
    }

    #[test]
    fn test_only_images_within_limit() {
        assert!(check_proof(&upload("image/png", 10), 1024).is_ok());
        assert!(matches!(check_proof(&upload("application/pdf", 10), 1024), Err(StorefrontError::Validation(_))));
        assert!(matches!(check_proof(&upload("image/jpeg", 2048), 1024), Err(StorefrontError::Validation(_))));
    }

    #[test]
    fn test_generated_names() {
        let name = proof_file_name(Some("shot.JPG"));
        assert!(name.starts_with("payment-") && name.ends_with(".jpg"), "{name}");
        assert!(!proof_file_name(Some("../../etc/passwd")).contains('/'));
        assert!(!proof_file_name(Some("x.p/ng")).contains('/'));
        assert!(!proof_file_name(None).contains('.'));
    }

    #[tokio::test]
    async fn test_local_storage_writes_file() {
        let dir = std::env::temp_dir().join(format!("storefront-proofs-{}", uuid::Uuid::new_v4()));
        let storage = LocalFileStorage::new(&dir, 1024);
        let reference = storage.store_proof(upload("image/png", 16)).await.unwrap();
        let name = reference.strip_prefix("/uploads/screenshots/").unwrap();
        assert_eq!(tokio::fs::read(dir.join(name)).await.unwrap().len(), 16);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
