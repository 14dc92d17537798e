//! Pluggable artifact storage. The domain model (`meridian_core::Artifact`)
//! only persists an opaque `path` plus `content_digest` and `size` — this
//! trait is where the actual bytes go, so a different backend (S3, GCS) can
//! be swapped in without touching the domain model or the store schema.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Error)]
pub enum ArtifactSinkError {
    #[error("artifact write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct WrittenArtifact {
    pub path: String,
    pub size: u64,
    pub content_digest: String,
}

#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn write(&self, task_id: uuid::Uuid, name: &str, content: &[u8]) -> Result<WrittenArtifact, ArtifactSinkError>;
}

/// Default sink: writes under `<root>/<task_id>/<name>`. Digest is a SHA-256
/// over the raw bytes, hex-encoded.
pub struct LocalArtifactSink {
    root: PathBuf,
}

impl LocalArtifactSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactSink for LocalArtifactSink {
    async fn write(&self, task_id: uuid::Uuid, name: &str, content: &[u8]) -> Result<WrittenArtifact, ArtifactSinkError> {
        let dir = self.root.join(task_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(name);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(content).await?;

        let mut hasher = Sha256::new();
        hasher.update(content);
        let content_digest = format!("sha256:{:x}", hasher.finalize());

        Ok(WrittenArtifact {
            path: path.to_string_lossy().into_owned(),
            size: content.len() as u64,
            content_digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_sink_writes_and_digests_content() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalArtifactSink::new(dir.path());
        let task_id = uuid::Uuid::now_v7();
        let written = sink.write(task_id, "output.txt", b"hello").await.unwrap();
        assert_eq!(written.size, 5);
        assert!(written.content_digest.starts_with("sha256:"));
        assert!(tokio::fs::metadata(&written.path).await.is_ok());
    }

    #[tokio::test]
    async fn same_content_produces_same_digest() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalArtifactSink::new(dir.path());
        let a = sink.write(uuid::Uuid::now_v7(), "a.txt", b"same").await.unwrap();
        let b = sink.write(uuid::Uuid::now_v7(), "b.txt", b"same").await.unwrap();
        assert_eq!(a.content_digest, b.content_digest);
    }
}
