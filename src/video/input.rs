use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Where the clip comes from.
#[derive(Debug, Clone)]
pub enum VideoInput {
    File(PathBuf),
    Bytes(Vec<u8>),
    Url(String),
}

/// A clip on the local filesystem.
///
/// Owns the temporary directory the clip was written to (if any); the
/// directory is removed when this value is dropped.
#[derive(Debug)]
pub struct LocalVideo {
    path: PathBuf,
    _guard: Option<TempDir>,
}

impl LocalVideo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self._guard.is_some()
    }
}

const CLIP_NAME: &str = "clip.mp4";

fn scratch_dir() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("swing-clip-").tempdir()?)
}

impl VideoInput {
    /// Make the clip readable from a path, writing or downloading as needed.
    pub async fn materialize(&self) -> Result<LocalVideo> {
        match self {
            VideoInput::File(path) => {
                if !tokio::fs::try_exists(path).await? {
                    return Err(PipelineError::invalid_input(format!(
                        "video file {} does not exist",
                        path.display()
                    )));
                }
                Ok(LocalVideo {
                    path: path.clone(),
                    _guard: None,
                })
            }
            VideoInput::Bytes(bytes) => {
                if bytes.is_empty() {
                    return Err(PipelineError::invalid_input("empty video payload"));
                }
                let dir = scratch_dir()?;
                let path = dir.path().join(CLIP_NAME);
                tokio::fs::write(&path, bytes).await?;
                debug!(bytes = bytes.len(), path = %path.display(), "video bytes written");
                Ok(LocalVideo {
                    path,
                    _guard: Some(dir),
                })
            }
            VideoInput::Url(url) => {
                let dir = scratch_dir()?;
                let path = dir.path().join(CLIP_NAME);
                let bytes = download(url).await?;
                tokio::fs::write(&path, &bytes).await?;
                info!(url = %url, bytes = bytes.len(), "video downloaded");
                Ok(LocalVideo {
                    path,
                    _guard: Some(dir),
                })
            }
        }
    }
}

async fn download(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| PipelineError::decode(format!("failed to fetch {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(PipelineError::decode(format!(
            "failed to fetch {url}: HTTP {}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::decode(format!("failed to read body of {url}: {e}")))?;
    if bytes.is_empty() {
        return Err(PipelineError::decode(format!("{url} returned an empty body")));
    }
    Ok(bytes.to_vec())
}
