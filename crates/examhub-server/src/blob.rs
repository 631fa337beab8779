use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, instrument};

use examhub_core::blob::BlobHandle;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("blob IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// File storage behind uploads and avatars. Providers only ever see opaque
/// public ids; nothing exam-scoped is passed through.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<BlobHandle, BlobError>;

    /// Deleting an id that is already gone succeeds.
    async fn delete(&self, public_id: &str) -> Result<(), BlobError>;
}

/// Stores blobs as files under one directory.
pub struct LocalBlobStore {
    root: PathBuf,
    public_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, public_id: &str) -> Result<PathBuf, BlobError> {
        if public_id.is_empty() || public_id.starts_with('.') || public_id != sanitize(public_id) {
            return Err(BlobError::InvalidName(public_id.to_string()));
        }
        Ok(self.root.join(public_id))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<BlobHandle, BlobError> {
        let name = sanitize(filename);
        if name.trim_matches(['.', '_']).is_empty() {
            return Err(BlobError::InvalidName(filename.to_string()));
        }
        let public_id = format!("{}-{name}", uuid::Uuid::now_v7().simple());
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(&public_id)?, &bytes).await?;
        debug!(public_id = %public_id, "blob stored");
        Ok(BlobHandle {
            url: format!("{}/uploads/{public_id}", self.public_url),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), BlobError> {
        match tokio::fs::remove_file(self.path_for(public_id)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (LocalBlobStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("examhub-blobs-{}", uuid::Uuid::now_v7().simple()));
        (LocalBlobStore::new(&dir, "http://localhost:8080/"), dir)
    }

    #[tokio::test]
    async fn upload_then_delete() {
        let (store, dir) = temp_store();
        let handle = store
            .upload(Bytes::from_static(b"%PDF-1.4"), "Organic Notes.pdf", Some("application/pdf"))
            .await
            .unwrap();
        assert!(handle.public_id.ends_with("-Organic_Notes.pdf"));
        assert_eq!(handle.url, format!("http://localhost:8080/uploads/{}", handle.public_id));
        assert!(dir.join(&handle.public_id).exists());

        store.delete(&handle.public_id).await.unwrap();
        assert!(!dir.join(&handle.public_id).exists());
        store.delete(&handle.public_id).await.unwrap();
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let (store, _) = temp_store();
        assert!(matches!(store.delete("../etc/passwd").await, Err(BlobError::InvalidName(_))));
        assert!(matches!(store.delete("..").await, Err(BlobError::InvalidName(_))));
        let handle = store.upload(Bytes::from_static(b"x"), "../../x", None).await.unwrap();
        assert!(!handle.public_id.contains('/'));
        store.delete(&handle.public_id).await.unwrap();
    }

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize("a b/c.png"), "a_b_c.png");
        assert_eq!(sanitize("notes-v2_final.txt"), "notes-v2_final.txt");
    }
}
