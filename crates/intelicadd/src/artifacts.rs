//! CAD file storage, one directory per job.

use std::path::{Path, PathBuf};

use intelicad_common::{ArtifactRef, JobError};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Used when an upload arrives without a usable file name.
pub const FALLBACK_FILE_NAME: &str = "model.f3d";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ArtifactError> for JobError {
    fn from(e: ArtifactError) -> Self {
        JobError::Storage(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Input,
    Output,
}

impl ArtifactKind {
    fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::Input => "input",
            ArtifactKind::Output => "output",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn save(
        &self,
        job_id: &str,
        kind: ArtifactKind,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<ArtifactRef, ArtifactError> {
        let file_name = sanitize_file_name(file_name);
        let dir = self.root.join("jobs").join(job_id).join(kind.dir_name());
        fs::create_dir_all(&dir).await.map_err(|source| ArtifactError::Io {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(&file_name);
        fs::write(&path, bytes).await.map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());

        Ok(ArtifactRef {
            path,
            file_name,
            size_bytes: bytes.len() as u64,
        })
    }

    pub async fn read(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError> {
        fs::read(&artifact.path).await.map_err(|source| ArtifactError::Io {
            path: artifact.path.clone(),
            source,
        })
    }
}

/// Keep only the final path component of a client-supplied name.
fn sanitize_file_name(name: Option<&str>) -> String {
    name.and_then(|n| Path::new(n.trim()).file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(sanitize_file_name(Some("bracket.f3d")), "bracket.f3d");
        assert_eq!(sanitize_file_name(Some("")), FALLBACK_FILE_NAME);
        assert_eq!(sanitize_file_name(None), FALLBACK_FILE_NAME);
    }

    #[tokio::test]
    async fn test_save_and_read() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = store
            .save("job1", ArtifactKind::Output, Some("out.f3d"), b"solid")
            .await
            .unwrap();
        assert_eq!(artifact.size_bytes, 5);
        assert!(artifact.path.ends_with("jobs/job1/output/out.f3d"));
        assert_eq!(store.read(&artifact).await.unwrap(), b"solid");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let missing = ArtifactRef {
            path: dir.path().join("nope"),
            file_name: "nope".into(),
            size_bytes: 0,
        };
        assert!(store.read(&missing).await.is_err());
    }
}
