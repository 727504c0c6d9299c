//! Garment placement geometry.
//!
//! Zones are axis-aligned rectangles in photo pixel space. They come from skeletal keypoints when
//! the joints a slot needs were detected, and from fixed body-proportion bands otherwise, so every
//! occupied slot always gets a zone.

use crate::foundation::core::{
    Canvas, Mask, Rect, SilhouetteMask, ZoneMask, clamp_rect, pixel_span,
};
use crate::garment::{OutfitSelection, Slot};
use crate::vision::keypoints::{Joint, KeypointSet};

/// Horizontal extent of every zone, as fractions of the image width.
pub const SAFE_BAND_X: (f64, f64) = (0.05, 0.95);

/// Vertical fraction reserved for the head above the top band.
pub const HEAD_FRACTION: f64 = 0.14;

/// Fixed vertical band for `slot`, as fractions of the image height.
pub fn proportion_band(slot: Slot) -> (f64, f64) {
    match slot {
        // Upper 43% of the body below the head.
        Slot::Top => (HEAD_FRACTION, HEAD_FRACTION + 0.43),
        Slot::Bottom => (0.50, 0.90),
        Slot::Shoes => (0.86, 1.0),
    }
}

/// Where a zone's vertical extent came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoneSource {
    Keypoints,
    Proportions,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlotZone {
    pub slot: Slot,
    pub rect: Rect,
    pub source: ZoneSource,
}

/// Zones for every occupied slot plus their union as a paint mask.
#[derive(Clone, Debug)]
pub struct GarmentZones {
    pub canvas: Canvas,
    pub zones: Vec<SlotZone>,
    pub mask: ZoneMask,
    /// Fingerprint of the outfit these zones were built for.
    pub outfit: u64,
}

impl GarmentZones {
    pub fn get(&self, slot: Slot) -> Option<&SlotZone> {
        self.zones.iter().find(|z| z.slot == slot)
    }

    /// Union of all zone rectangles.
    pub fn union(&self) -> Option<Rect> {
        self.zones.iter().map(|z| z.rect).reduce(|a, b| a.union(b))
    }
}

/// Zone for `slot` from fixed proportions.
pub fn fallback_zone(slot: Slot, canvas: Canvas) -> Rect {
    let (y0, y1) = proportion_band(slot);
    band_rect(canvas, y0 * f64::from(canvas.height), y1 * f64::from(canvas.height))
}

fn band_rect(canvas: Canvas, y0: f64, y1: f64) -> Rect {
    let w = f64::from(canvas.width);
    clamp_rect(
        Rect::new(SAFE_BAND_X.0 * w, y0, SAFE_BAND_X.1 * w, y1),
        canvas,
    )
}

/// Keypoint-derived zone for `slot`, or `None` when a joint the slot needs is missing.
pub fn keypoint_zone(slot: Slot, canvas: Canvas, keypoints: &KeypointSet) -> Option<Rect> {
    let h = f64::from(canvas.height);
    let (y0, y1) = match slot {
        Slot::Top => {
            let mut upper_joints = vec![Joint::Neck];
            upper_joints.extend(Joint::SHOULDERS);
            let upper = keypoints.min_y(&upper_joints)?;
            let hips = keypoints.mean_y(&Joint::HIPS)?;
            (upper - 0.04 * h, hips + 0.03 * h)
        }
        Slot::Bottom => {
            let hips = keypoints.mean_y(&Joint::HIPS)?;
            let ankles = keypoints.max_y(&Joint::ANKLES)?;
            (hips - 0.02 * h, ankles + 0.01 * h)
        }
        Slot::Shoes => {
            let knees = keypoints.mean_y(&Joint::KNEES)?;
            let ankles = keypoints.max_y(&Joint::ANKLES)?;
            let shin = ankles - knees;
            (ankles - 0.35 * shin, ankles + 0.04 * h)
        }
    };
    let rect = band_rect(canvas, y0, y1);
    (rect.height() >= 1.0 && rect.width() >= 1.0).then_some(rect)
}

/// Zone for one slot, preferring keypoints.
pub fn zone_for_slot(slot: Slot, canvas: Canvas, keypoints: Option<&KeypointSet>) -> SlotZone {
    match keypoints.and_then(|k| keypoint_zone(slot, canvas, k)) {
        Some(rect) => SlotZone {
            slot,
            rect,
            source: ZoneSource::Keypoints,
        },
        None => SlotZone {
            slot,
            rect: fallback_zone(slot, canvas),
            source: ZoneSource::Proportions,
        },
    }
}

/// Build zones and the combined paint mask for `outfit`.
pub fn build_zones(
    outfit: &OutfitSelection,
    canvas: Canvas,
    keypoints: Option<&KeypointSet>,
) -> GarmentZones {
    let zones: Vec<SlotZone> = outfit
        .slots()
        .into_iter()
        .map(|slot| zone_for_slot(slot, canvas, keypoints))
        .collect();
    let mut mask = Mask::new(canvas.width, canvas.height);
    for z in &zones {
        mask.fill_rect(z.rect, 255);
    }
    GarmentZones {
        canvas,
        zones,
        mask: ZoneMask(mask),
        outfit: outfit.fingerprint(),
    }
}

/// Tighten each zone to the silhouette's extent inside it. Zones the silhouette does not reach
/// are left unchanged.
pub fn clip_to_silhouette(zones: &GarmentZones, silhouette: &SilhouetteMask) -> GarmentZones {
    let sil = silhouette.mask();
    let mut out = zones.clone();
    if sil.canvas() != zones.canvas {
        return out;
    }
    for z in &mut out.zones {
        if let Some(tight) = silhouette_bounds_within(sil, z.rect) {
            z.rect = tight;
        }
    }
    let mut mask = Mask::new(zones.canvas.width, zones.canvas.height);
    for z in &out.zones {
        mask.fill_rect(z.rect, 255);
    }
    out.mask = ZoneMask(mask);
    out
}

fn silhouette_bounds_within(sil: &Mask, rect: Rect) -> Option<Rect> {
    let (x0, y0, x1, y1) = pixel_span(rect, sil.canvas())?;
    let mut bounds: Option<Rect> = None;
    for y in y0..y1 {
        for x in x0..x1 {
            if sil.get(x, y) >= 128 {
                let px = Rect::new(
                    f64::from(x),
                    f64::from(y),
                    f64::from(x + 1),
                    f64::from(y + 1),
                );
                bounds = Some(bounds.map_or(px, |b| b.union(px)));
            }
        }
    }
    bounds
}

#[cfg(test)]
#[path = "../tests/unit/geometry.rs"]
mod tests;
