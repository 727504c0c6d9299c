use image::RgbaImage;
use image::imageops::FilterType;

use crate::compositor::blend::mix_with_mask;
use crate::compositor::blur::blur_mask;
use crate::foundation::core::{Mask, SilhouetteMask, ZoneMask};
use crate::foundation::error::{VestureError, VestureResult};

/// Composite `generated` over `original` inside the zone mask.
///
/// The zone is intersected with the silhouette and feathered by `feather_radius`. Feathering only
/// softens inward: wherever the un-feathered mask is 0 the output is the original pixel exactly.
#[tracing::instrument(skip_all, fields(w = original.width(), h = original.height()))]
pub fn blend(
    original: &RgbaImage,
    generated: &RgbaImage,
    zone: &ZoneMask,
    silhouette: Option<&SilhouetteMask>,
    feather_radius: u32,
) -> VestureResult<RgbaImage> {
    let (w, h) = original.dimensions();
    if w == 0 || h == 0 {
        return Err(VestureError::validation("cannot blend onto an empty image"));
    }
    if generated.width() == 0 || generated.height() == 0 {
        return Err(VestureError::inference("generated image is empty"));
    }

    let generated = if generated.dimensions() == (w, h) {
        generated.clone()
    } else {
        image::imageops::resize(generated, w, h, FilterType::CatmullRom)
    };

    let mut hard = zone.mask().resized(w, h);
    if let Some(sil) = silhouette {
        hard = hard.multiply(&sil.mask().resized(w, h))?;
    }
    let feathered = blur_mask(&hard, feather_radius, None)?;
    let alpha = confine(&feathered, &hard)?;
    mix_with_mask(original, &generated, &alpha)
}

/// `soft` with every pixel zeroed where `hard` is 0.
fn confine(soft: &Mask, hard: &Mask) -> VestureResult<Mask> {
    let data = soft
        .as_raw()
        .iter()
        .zip(hard.as_raw())
        .map(|(&s, &h)| if h == 0 { 0 } else { s })
        .collect();
    Mask::from_raw(hard.width(), hard.height(), data)
}

#[cfg(test)]
#[path = "../../tests/unit/generation/finisher.rs"]
mod tests;
