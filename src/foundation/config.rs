use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{VestureError, VestureResult};

/// Top-level pipeline configuration, loadable from JSON.
///
/// Every section has defaults, so an empty `{}` document is a valid configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TryOnConfig {
    pub assets: AssetConfig,
    pub generation: GenerationConfig,
    pub preview: PreviewConfig,
    pub blend: BlendConfig,
    pub vision: VisionConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetConfig {
    /// Directory that holds the manifest files.
    pub model_root: PathBuf,
    /// Per-request timeout for transfers, in seconds.
    pub request_timeout_secs: u64,
    /// How often the transfer-rate estimate is resampled, in milliseconds.
    pub rate_sample_ms: u64,
    pub user_agent: String,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            model_root: PathBuf::from("models"),
            request_timeout_secs: 60,
            rate_sample_ms: 1000,
            user_agent: concat!("vesture/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl AssetConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_sample_interval(&self) -> Duration {
        Duration::from_millis(self.rate_sample_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// Denoising steps. Higher is sharper and slower.
    pub steps: u32,
    pub guidance_scale: f32,
    /// Square edge the generator works at.
    pub resolution: u32,
    /// Fixed seed; `None` draws a random one per call.
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            steps: 25,
            guidance_scale: 7.5,
            resolution: 512,
            seed: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Floor on how long a preview stays in `processing`, in milliseconds.
    pub min_display_ms: u64,
    /// Opacity of real garment imagery.
    pub garment_opacity: f32,
    /// Opacity of the multiply-tinted gradient used for sample garments.
    pub gradient_opacity: f32,
    /// Opacity of the lighting and curvature shading passes.
    pub shading_opacity: f32,
    /// Strength of the final vignette.
    pub vignette_strength: f32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            min_display_ms: 600,
            garment_opacity: 0.82,
            gradient_opacity: 0.45,
            shading_opacity: 0.18,
            vignette_strength: 0.22,
        }
    }
}

impl PreviewConfig {
    pub fn min_display(&self) -> Duration {
        Duration::from_millis(self.min_display_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlendConfig {
    /// Feather radius applied to the combined mask, in pixels.
    pub feather_radius: u32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self { feather_radius: 13 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisionConfig {
    /// Joints below this confidence are treated as absent.
    pub keypoint_threshold: f32,
    /// Padding added around keypoint-derived crop bands, in pixels.
    pub crop_pad_px: f64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            keypoint_threshold: 0.25,
            crop_pad_px: 24.0,
        }
    }
}

impl TryOnConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> VestureResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: TryOnConfig = serde_json::from_reader(BufReader::new(f))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> VestureResult<()> {
        let g = &self.generation;
        if !(1..=200).contains(&g.steps) {
            return Err(VestureError::validation(
                "generation.steps must be in 1..=200",
            ));
        }
        if !g.guidance_scale.is_finite() || g.guidance_scale < 1.0 {
            return Err(VestureError::validation(
                "generation.guidance_scale must be finite and >= 1",
            ));
        }
        if g.resolution == 0 || !g.resolution.is_multiple_of(8) {
            return Err(VestureError::validation(
                "generation.resolution must be a non-zero multiple of 8",
            ));
        }

        let p = &self.preview;
        for (name, v) in [
            ("preview.garment_opacity", p.garment_opacity),
            ("preview.gradient_opacity", p.gradient_opacity),
            ("preview.shading_opacity", p.shading_opacity),
            ("preview.vignette_strength", p.vignette_strength),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(VestureError::validation(format!("{name} must be in 0..=1")));
            }
        }

        if !(0.0..=1.0).contains(&self.vision.keypoint_threshold) {
            return Err(VestureError::validation(
                "vision.keypoint_threshold must be in 0..=1",
            ));
        }
        if !self.vision.crop_pad_px.is_finite() || self.vision.crop_pad_px < 0.0 {
            return Err(VestureError::validation(
                "vision.crop_pad_px must be finite and >= 0",
            ));
        }
        if self.assets.request_timeout_secs == 0 {
            return Err(VestureError::validation(
                "assets.request_timeout_secs must be > 0",
            ));
        }
        if self.assets.rate_sample_ms == 0 {
            return Err(VestureError::validation("assets.rate_sample_ms must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
