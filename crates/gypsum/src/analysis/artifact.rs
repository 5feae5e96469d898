//! Uploaded artifacts awaiting analysis.

use std::path::Path;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::AnalysisError;

/// An uploaded image: its bytes as a stream plus what the uploader declared.
pub struct Artifact {
    /// Filename supplied by the uploader, used for the extension.
    pub filename: String,
    /// Size declared by the uploader in bytes.
    pub declared_size: u64,
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl Artifact {
    pub fn new<R>(filename: impl Into<String>, declared_size: u64, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            filename: filename.into(),
            declared_size,
            reader: Box::pin(reader),
        }
    }

    /// An artifact held entirely in memory.
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self::new(filename, size, std::io::Cursor::new(bytes))
    }

    /// An artifact read from a local file.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self::new(filename, size, file))
    }

    /// Streams the artifact into `dest`, returning the number of bytes written.
    /// A partially written file is removed on failure.
    pub async fn persist_to(mut self, dest: &Path) -> Result<u64, AnalysisError> {
        let persist_err = |source| AnalysisError::ArtifactPersistence {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(persist_err)?;

        let copied = async {
            let written = tokio::io::copy(&mut self.reader, &mut file).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(written)
        }
        .await;

        match copied {
            Ok(written) => Ok(written),
            Err(source) => {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                Err(persist_err(source))
            }
        }
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("filename", &self.filename)
            .field("declared_size", &self.declared_size)
            .finish_non_exhaustive()
    }
}
