use std::sync::Arc;

use image::RgbaImage;

use crate::assets::manager::ModelManager;
use crate::assets::manifest::Manifest;
use crate::assets::transport::Transport;
use crate::compositor::fast::FastCompositor;
use crate::compositor::preview::PreviewController;
use crate::foundation::config::TryOnConfig;
use crate::foundation::error::{ErrorKind, VestureError, VestureResult};
use crate::garment::OutfitSelection;
use crate::generation::engine::EngineLoader;
use crate::generation::orchestrator::Generator;
use crate::vision::service::VisionService;

/// Which renderer produced an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderTier {
    Preview,
    Generated,
}

#[derive(Clone, Debug)]
pub struct RenderOutcome {
    pub image: RgbaImage,
    pub tier: RenderTier,
    /// Why generation was abandoned, when the preview stood in for it.
    pub fallback: Option<String>,
}

/// The services of one try-on pipeline, wired together from a single configuration.
#[derive(Clone, Debug)]
pub struct TryOnSession {
    config: TryOnConfig,
    vision: VisionService,
    compositor: FastCompositor,
    preview: PreviewController,
    models: ModelManager,
    generator: Generator,
}

impl TryOnSession {
    pub fn new(
        config: TryOnConfig,
        vision: VisionService,
        manifest: Manifest,
        transport: Arc<dyn Transport>,
        loader: Arc<dyn EngineLoader>,
    ) -> VestureResult<Self> {
        config.validate()?;
        manifest.validate()?;
        let compositor = FastCompositor::new(config.preview.clone());
        let models = ModelManager::new(&config.assets, manifest, transport, loader);
        let preview = PreviewController::new(vision.clone(), compositor.clone());
        let generator = Generator::new(
            models.clone(),
            vision.clone(),
            compositor.clone(),
            config.generation.clone(),
            config.blend.clone(),
        );
        Ok(Self {
            config,
            vision,
            compositor,
            preview,
            models,
            generator,
        })
    }

    pub fn config(&self) -> &TryOnConfig {
        &self.config
    }

    pub fn vision(&self) -> &VisionService {
        &self.vision
    }

    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    pub fn preview(&self) -> &PreviewController {
        &self.preview
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Fast composite on the calling thread, without the preview state machine.
    pub fn compose_preview(
        &self,
        photo: &RgbaImage,
        outfit: &OutfitSelection,
    ) -> VestureResult<RgbaImage> {
        if outfit.is_empty() {
            return Ok(photo.clone());
        }
        let silhouette = self.vision.segment_person(photo);
        let keypoints = self.vision.detect_keypoints(photo);
        self.compositor
            .compose(photo, outfit, silhouette.as_ref(), keypoints.as_ref())
    }

    /// Generate, optionally standing in the fast preview when generation cannot run or fails
    /// during inference.
    pub fn render(
        &self,
        photo: &RgbaImage,
        outfit: &OutfitSelection,
        allow_fallback: bool,
    ) -> VestureResult<RenderOutcome> {
        match self.generator.generate(photo, outfit) {
            Ok(image) => Ok(RenderOutcome {
                image,
                tier: RenderTier::Generated,
                fallback: None,
            }),
            Err(err) if allow_fallback && recoverable(&err) => {
                tracing::warn!(%err, "generation unavailable; falling back to preview");
                Ok(RenderOutcome {
                    image: self.compose_preview(photo, outfit)?,
                    tier: RenderTier::Preview,
                    fallback: Some(err.to_string()),
                })
            }
            Err(err) => Err(err),
        }
    }
}

fn recoverable(err: &VestureError) -> bool {
    matches!(err.kind(), ErrorKind::Inference | ErrorKind::Precondition)
}

#[cfg(test)]
#[path = "../tests/unit/session.rs"]
mod tests;
