use std::path::Path;
use std::sync::Arc;

use image::{GrayImage, RgbaImage};

use crate::assets::manifest::Manifest;
use crate::foundation::error::{VestureError, VestureResult};

/// One inpainting call at the engine's working resolution.
#[derive(Clone, Debug)]
pub struct InpaintRequest {
    pub image: RgbaImage,
    /// White marks pixels the engine may repaint.
    pub mask: GrayImage,
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub guidance_scale: f32,
    pub seed: u64,
}

impl InpaintRequest {
    pub fn validate(&self) -> VestureResult<()> {
        if self.image.dimensions() != self.mask.dimensions() {
            return Err(VestureError::validation(format!(
                "inpaint mask is {}x{}, image is {}x{}",
                self.mask.width(),
                self.mask.height(),
                self.image.width(),
                self.image.height()
            )));
        }
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(VestureError::validation("inpaint image is empty"));
        }
        if self.steps == 0 {
            return Err(VestureError::validation("inpaint steps must be > 0"));
        }
        Ok(())
    }
}

/// A loaded diffusion inpainting model.
///
/// `progress(done, total)` is called after each denoising step. An engine may return several
/// candidates; the first one is used.
pub trait InpaintEngine: Send + Sync {
    fn inpaint(
        &self,
        request: &InpaintRequest,
        progress: &dyn Fn(u32, u32),
    ) -> VestureResult<Vec<RgbaImage>>;
}

/// Builds an engine from a complete set of model files.
pub trait EngineLoader: Send + Sync {
    fn load(&self, root: &Path, manifest: &Manifest) -> VestureResult<Arc<dyn InpaintEngine>>;
}
