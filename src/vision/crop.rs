use image::RgbaImage;

use crate::foundation::core::{Canvas, Mask, Rect, SilhouetteMask, clamp_rect, pixel_span};
use crate::foundation::error::{VestureError, VestureResult};
use crate::garment::{GarmentType, Slot};
use crate::geometry::{HEAD_FRACTION, proportion_band};
use crate::vision::keypoints::{Joint, KeypointSet};

/// Alpha at or above which a pixel counts as garment when tightening a crop.
const OPAQUE_THRESHOLD: u8 = 8;

/// Joints bounding the garment band for `kind`: `(upper, lower, horizontal extent)`.
fn band_joints(kind: GarmentType) -> Option<(Vec<Joint>, Vec<Joint>, Vec<Joint>)> {
    let mut upper_body = vec![Joint::Neck];
    upper_body.extend(Joint::SHOULDERS);
    match kind {
        GarmentType::Top | GarmentType::Outerwear => {
            let mut extent = upper_body.clone();
            extent.extend(Joint::HIPS);
            extent.extend([Joint::LeftWrist, Joint::RightWrist]);
            Some((upper_body, Joint::HIPS.to_vec(), extent))
        }
        GarmentType::FullBody => {
            let mut extent = upper_body.clone();
            extent.extend(Joint::HIPS);
            extent.extend(Joint::ANKLES);
            Some((upper_body, Joint::ANKLES.to_vec(), extent))
        }
        GarmentType::Bottom => {
            let mut extent = Joint::HIPS.to_vec();
            extent.extend(Joint::KNEES);
            extent.extend(Joint::ANKLES);
            Some((Joint::HIPS.to_vec(), Joint::ANKLES.to_vec(), extent))
        }
        GarmentType::Shoes => {
            let mut extent = Joint::KNEES.to_vec();
            extent.extend(Joint::ANKLES);
            Some((Joint::KNEES.to_vec(), Joint::ANKLES.to_vec(), extent))
        }
        GarmentType::Accessory => None,
    }
}

/// Region between the anatomically relevant joints for `kind`, padded by `pad` pixels.
pub fn keypoint_region(
    kind: GarmentType,
    canvas: Canvas,
    keypoints: &KeypointSet,
    pad: f64,
) -> Option<Rect> {
    let (upper, lower, extent) = band_joints(kind)?;
    let mut y0 = keypoints.min_y(&upper)?;
    let y1 = keypoints.max_y(&lower)?;
    if kind == GarmentType::Shoes {
        // Only the lowest third of the shin belongs to the shoe band.
        y0 = y1 - (y1 - y0) / 3.0;
    }
    let xs = keypoints.bounds(&extent)?;
    let rect = clamp_rect(
        Rect::new(xs.x0 - pad, y0 - pad, xs.x1 + pad, y1 + pad),
        canvas,
    );
    (rect.width() >= 1.0 && rect.height() >= 1.0).then_some(rect)
}

/// Fixed body-proportion region for `kind`.
pub fn proportion_region(kind: GarmentType, canvas: Canvas) -> Rect {
    let h = f64::from(canvas.height);
    let w = f64::from(canvas.width);
    let (y0, y1) = match kind {
        GarmentType::Accessory => (0.0, 1.0),
        GarmentType::FullBody => (HEAD_FRACTION, 0.95),
        other => match other.slot() {
            Some(slot) => proportion_band(slot),
            None => proportion_band(Slot::Top),
        },
    };
    clamp_rect(Rect::new(0.0, y0 * h, w, y1 * h), canvas)
}

/// Crop the garment for `kind` out of a photo.
///
/// The region comes from keypoints when available and from fixed proportions otherwise. With a
/// silhouette, pixels outside the person become transparent and the crop is tightened to the
/// remaining opaque pixels.
pub fn crop_garment_region(
    image: &RgbaImage,
    kind: GarmentType,
    keypoints: Option<&KeypointSet>,
    silhouette: Option<&SilhouetteMask>,
    pad: f64,
) -> VestureResult<RgbaImage> {
    let canvas = Canvas::of(image);
    if canvas.is_empty() {
        return Err(VestureError::validation("cannot crop an empty image"));
    }

    let region = keypoints
        .and_then(|k| keypoint_region(kind, canvas, k, pad))
        .unwrap_or_else(|| proportion_region(kind, canvas));
    let (x0, y0, x1, y1) = pixel_span(region, canvas)
        .ok_or_else(|| VestureError::validation("garment region is empty"))?;

    let mut out = image::imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();

    let Some(silhouette) = silhouette else {
        return Ok(out);
    };
    let sil = silhouette.mask().resized(canvas.width, canvas.height);
    apply_mask_region(&mut out, &sil, x0, y0);

    let alpha = Mask::from_alpha(&out);
    let tight = alpha
        .bounds_above(OPAQUE_THRESHOLD)
        .ok_or_else(|| VestureError::inference("garment region is empty after masking"))?;
    let (tx0, ty0, tx1, ty1) = pixel_span(tight, alpha.canvas())
        .ok_or_else(|| VestureError::inference("garment region is empty after masking"))?;
    Ok(image::imageops::crop_imm(&out, tx0, ty0, tx1 - tx0, ty1 - ty0).to_image())
}

/// Multiply the crop's alpha by the silhouette, which is sampled at offset `(ox, oy)`.
fn apply_mask_region(crop: &mut RgbaImage, sil: &Mask, ox: u32, oy: u32) {
    for (x, y, px) in crop.enumerate_pixels_mut() {
        let m = sil.get(ox + x, oy + y);
        px.0[3] = crate::foundation::math::mul_div255_u8(u16::from(px.0[3]), u16::from(m));
    }
}

#[cfg(test)]
#[path = "../../tests/unit/vision/crop.rs"]
mod tests;
