//! Proof-of-payment file storage.
//!
//! A proof is written **before** the payment row is inserted. If the
//! transaction then fails, the ledger removes the file again (best-effort).

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use boxoffice_types::{BoxofficeError, ProofUpload, ReservationId, Result, UploadConfig};

#[async_trait]
pub trait ProofStorage: Send + Sync {
    /// Persist `upload`; returns the reference recorded on the payment.
    async fn store(&self, reservation_id: ReservationId, upload: &ProofUpload) -> Result<String>;

    /// Delete a previously stored proof.
    async fn remove(&self, proof_ref: &str) -> Result<()>;
}

/// Stores proofs as files under `<dir>/payments/`.
#[derive(Debug, Clone)]
pub struct DiskProofStorage {
    dir: PathBuf,
}

const PROOF_SUBDIR: &str = "payments";

impl DiskProofStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.dir.clone())
    }

    /// Resolve a reference under the upload directory, refusing anything that
    /// would escape it.
    fn resolve(&self, proof_ref: &str) -> Result<PathBuf> {
        let relative = Path::new(proof_ref);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(BoxofficeError::InvalidInput {
                reason: format!("invalid proof reference: {proof_ref}"),
            });
        }
        Ok(self.dir.join(relative))
    }
}

/// Keep a short, safe extension from the client's file name.
fn extension_of(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

#[async_trait]
impl ProofStorage for DiskProofStorage {
    async fn store(&self, reservation_id: ReservationId, upload: &ProofUpload) -> Result<String> {
        if upload.bytes.is_empty() {
            return Err(BoxofficeError::InvalidInput {
                reason: "empty proof file".to_string(),
            });
        }
        let dir = self.dir.join(PROOF_SUBDIR);
        tokio::fs::create_dir_all(&dir).await?;

        let mut name = format!("{reservation_id}-{}", uuid::Uuid::now_v7());
        if let Some(ext) = extension_of(&upload.file_name) {
            name.push('.');
            name.push_str(&ext);
        }
        tokio::fs::write(dir.join(&name), &upload.bytes).await?;
        tracing::debug!(%reservation_id, file = %name, "payment proof stored");
        Ok(format!("{PROOF_SUBDIR}/{name}"))
    }

    async fn remove(&self, proof_ref: &str) -> Result<()> {
        let path = self.resolve(proof_ref)?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str) -> ProofUpload {
        ProofUpload {
            file_name: name.to_string(),
            content_type: Some("image/png".to_string()),
            bytes: vec![0x89, b'P', b'N', b'G'],
        }
    }

    #[tokio::test]
    async fn store_then_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DiskProofStorage::new(tmp.path());
        let proof_ref = storage
            .store(ReservationId::new(), &upload("receipt.PNG"))
            .await
            .unwrap();
        assert!(proof_ref.starts_with("payments/"));
        assert!(proof_ref.ends_with(".png"));
        assert!(tmp.path().join(&proof_ref).exists());

        storage.remove(&proof_ref).await.unwrap();
        assert!(!tmp.path().join(&proof_ref).exists());
    }

    #[tokio::test]
    async fn hostile_extension_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DiskProofStorage::new(tmp.path());
        let proof_ref = storage
            .store(ReservationId::new(), &upload("x.p/../../etc"))
            .await
            .unwrap();
        assert!(!proof_ref.contains(".."));
    }

    #[tokio::test]
    async fn traversal_refused_on_remove() {
        let storage = DiskProofStorage::new("/tmp/boxoffice-proofs");
        for bad in ["../secret", "/etc/passwd", "payments/../../x"] {
            assert!(matches!(
                storage.remove(bad).await,
                Err(BoxofficeError::InvalidInput { .. })
            ));
        }
    }

    #[tokio::test]
    async fn empty_upload_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = DiskProofStorage::new(tmp.path());
        let mut empty = upload("a.png");
        empty.bytes.clear();
        assert!(storage.store(ReservationId::new(), &empty).await.is_err());
    }

    #[test]
    fn extension_rules() {
        assert_eq!(extension_of("a.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("a.verylongext"), None);
    }
}
