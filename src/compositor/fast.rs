use image::RgbaImage;

use crate::compositor::paint::{Layer, rounded_rect_mask};
use crate::foundation::config::PreviewConfig;
use crate::foundation::core::{Canvas, Mask, SilhouetteMask};
use crate::foundation::error::{VestureError, VestureResult};
use crate::garment::OutfitSelection;
use crate::geometry::{GarmentZones, build_zones, clip_to_silhouette, zone_for_slot};
use crate::vision::keypoints::KeypointSet;

/// Opacity of the drop shadow under each garment.
const SHADOW_OPACITY: f32 = 0.35;

/// Deterministic raster preview: garment imagery layered onto the photo inside the garment zones.
///
/// Only pixels inside a zone (and inside the silhouette, when one is given) are ever changed.
#[derive(Clone, Debug, Default)]
pub struct FastCompositor {
    config: PreviewConfig,
}

impl FastCompositor {
    pub fn new(config: PreviewConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    /// Build zones from `keypoints` (or proportions) and compose.
    pub fn compose(
        &self,
        photo: &RgbaImage,
        outfit: &OutfitSelection,
        silhouette: Option<&SilhouetteMask>,
        keypoints: Option<&KeypointSet>,
    ) -> VestureResult<RgbaImage> {
        if outfit.is_empty() {
            return Ok(photo.clone());
        }
        let mut zones = build_zones(outfit, Canvas::of(photo), keypoints);
        if let Some(sil) = silhouette {
            zones = clip_to_silhouette(&zones, sil);
        }
        self.compose_with_zones(photo, outfit, &zones, silhouette)
    }

    #[tracing::instrument(skip_all, fields(w = photo.width(), h = photo.height(), slots = zones.zones.len()))]
    pub fn compose_with_zones(
        &self,
        photo: &RgbaImage,
        outfit: &OutfitSelection,
        zones: &GarmentZones,
        silhouette: Option<&SilhouetteMask>,
    ) -> VestureResult<RgbaImage> {
        if outfit.is_empty() {
            return Ok(photo.clone());
        }
        let canvas = Canvas::of(photo);
        if canvas.is_empty() {
            return Err(VestureError::validation("cannot compose onto an empty photo"));
        }
        if zones.canvas != canvas {
            return Err(VestureError::validation(format!(
                "zones were built for {}x{}, photo is {}x{}",
                zones.canvas.width, zones.canvas.height, canvas.width, canvas.height
            )));
        }
        let silhouette = silhouette.map(|s| s.mask().resized(canvas.width, canvas.height));

        let cfg = &self.config;
        let mut garments = Layer::new(canvas);
        for (slot, garment) in outfit.occupied() {
            let rect = zones
                .get(slot)
                .map(|z| z.rect)
                .unwrap_or_else(|| zone_for_slot(slot, canvas, None).rect);
            let short = rect.width().min(rect.height());
            if short < 1.0 {
                continue;
            }

            let mut layer = Layer::new(canvas);
            let shadow_dy = (rect.height() * 0.02).max(2.0);
            layer.drop_shadow(
                rect,
                (0.0, shadow_dy),
                (short * 0.04).max(2.0) as u32,
                SHADOW_OPACITY,
            )?;
            match garment.image() {
                Some(img) => layer.draw_image_fill(img, rect, cfg.garment_opacity),
                None => {
                    layer.multiply_gradient(photo, rect, garment.gradient(), cfg.gradient_opacity)
                }
            }
            layer.directional_light(rect, cfg.shading_opacity * 0.5);
            layer.curvature_shading(rect, cfg.shading_opacity);

            let clip = if silhouette.is_some() {
                let mut m = Mask::new(canvas.width, canvas.height);
                m.fill_rect(rect, 255);
                m
            } else {
                rounded_rect_mask(canvas, rect, short * 0.08)
            };
            layer.clip_to_mask(&clip)?;
            garments.merge(&layer)?;
            tracing::debug!(slot = slot.as_str(), garment = garment.name(), "layered garment");
        }

        if let Some(sil) = &silhouette {
            garments.clip_to_mask(sil)?;
        }
        garments.vignette(cfg.vignette_strength);
        garments.composite_onto(photo)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/fast.rs"]
mod tests;
