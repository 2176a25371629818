//! Landmark model files and process-wide model handles.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::ModelSpec;
use crate::error::{PipelineError, Result};

/// Path of `spec` inside `cache_dir`, downloading it first if absent.
///
/// The download is written next to the target and renamed into place, so a
/// partial file never shadows a good one.
pub async fn ensure_model_file(cache_dir: &Path, spec: &ModelSpec) -> Result<PathBuf> {
    let path = cache_dir.join(&spec.file);
    if tokio::fs::try_exists(&path).await? {
        return Ok(path);
    }

    let url = spec.url.as_deref().ok_or_else(|| {
        PipelineError::model_unavailable(format!(
            "{} not found and no download url configured",
            path.display()
        ))
    })?;

    tokio::fs::create_dir_all(cache_dir).await?;
    info!(url, path = %path.display(), "downloading landmark model");

    let response = reqwest::get(url)
        .await
        .map_err(|e| PipelineError::model_unavailable(format!("failed to fetch {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(PipelineError::model_unavailable(format!(
            "failed to fetch {url}: HTTP {}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::model_unavailable(format!("failed to read {url}: {e}")))?;

    let partial = path.with_extension("part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, &path).await?;
    info!(bytes = bytes.len(), path = %path.display(), "landmark model cached");
    Ok(path)
}

#[cfg(feature = "desktop")]
pub use registry::{ModelRegistry, SharedModel};

#[cfg(feature = "desktop")]
mod registry {
    use std::sync::{Arc, Mutex, OnceLock};

    use image::RgbImage;
    use tokio::sync::OnceCell;

    use super::ensure_model_file;
    use crate::config::{ModelSpec, ModelsConfig};
    use crate::error::{PipelineError, Result};
    use crate::pose::detector::{LandmarkDetector, ModelTier, OnnxPoseModel};
    use crate::pose::keypoint::Landmarks;

    /// Model handle shared by every run in the process.
    #[derive(Clone)]
    pub struct SharedModel(Arc<Mutex<OnnxPoseModel>>);

    impl LandmarkDetector for SharedModel {
        fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Option<Landmarks>> {
            let mut model = self
                .0
                .lock()
                .map_err(|_| anyhow::anyhow!("landmark model lock poisoned"))?;
            model.detect(image)
        }
    }

    /// Lazily loaded primary / secondary / relaxed models.
    pub struct ModelRegistry {
        config: ModelsConfig,
        primary: OnceCell<SharedModel>,
        secondary: OnceCell<SharedModel>,
        relaxed: OnceCell<SharedModel>,
    }

    static GLOBAL: OnceLock<ModelRegistry> = OnceLock::new();

    impl ModelRegistry {
        pub fn new(config: ModelsConfig) -> Self {
            Self {
                config,
                primary: OnceCell::new(),
                secondary: OnceCell::new(),
                relaxed: OnceCell::new(),
            }
        }

        /// Process-wide registry; the first caller's config wins.
        pub fn global(config: &ModelsConfig) -> &'static ModelRegistry {
            GLOBAL.get_or_init(|| ModelRegistry::new(config.clone()))
        }

        fn slot(&self, tier: ModelTier) -> (&OnceCell<SharedModel>, &ModelSpec) {
            match tier {
                ModelTier::Primary => (&self.primary, &self.config.primary),
                ModelTier::Secondary => (&self.secondary, &self.config.secondary),
                ModelTier::Relaxed => (&self.relaxed, &self.config.relaxed),
            }
        }

        /// Handle for `tier`, loading it on first use.
        pub async fn get(&self, tier: ModelTier) -> Result<SharedModel> {
            let (cell, spec) = self.slot(tier);
            let model = cell
                .get_or_try_init(|| async {
                    let path = ensure_model_file(&self.config.cache_dir, spec).await?;
                    let load_spec = spec.clone();
                    let loaded = tokio::task::spawn_blocking(move || OnnxPoseModel::new(&path, &load_spec))
                        .await
                        .map_err(|e| PipelineError::model_unavailable(format!("model loader panicked: {e}")))?
                        .map_err(|e| PipelineError::model_unavailable(format!("{tier:?}: {e:#}")))?;
                    tracing::info!(tier = tier.as_str(), file = %spec.file, "landmark model loaded");
                    Ok::<_, PipelineError>(SharedModel(Arc::new(Mutex::new(loaded))))
                })
                .await?;
            Ok(model.clone())
        }

        /// All three tiers, in cascade order.
        pub async fn load_all(&self) -> Result<[SharedModel; 3]> {
            Ok([
                self.get(ModelTier::Primary).await?,
                self.get(ModelTier::Secondary).await?,
                self.get(ModelTier::Relaxed).await?,
            ])
        }
    }
}
