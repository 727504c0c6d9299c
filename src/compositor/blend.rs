use image::RgbaImage;

use crate::foundation::core::Mask;
use crate::foundation::error::{VestureError, VestureResult};
use crate::foundation::math::{mul_div255_u8, unit_to_u8};

pub type PremulRgba8 = [u8; 4];

/// Source-over with an extra opacity multiplier, premultiplied alpha.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = u16::from(unit_to_u8(opacity));
    let sa = mul_div255_u8(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), op);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Per-channel mix of `a` towards `b` by `t / 255`.
pub fn crossfade(a: [u8; 4], b: [u8; 4], t: u8) -> [u8; 4] {
    let tt = u16::from(t);
    let it = 255u16 - tt;

    let mut out = [0u8; 4];
    for i in 0..4 {
        let av = mul_div255_u8(u16::from(a[i]), it);
        let bv = mul_div255_u8(u16::from(b[i]), tt);
        out[i] = av.saturating_add(bv);
    }
    out
}

/// Multiply-blend an opaque tint into a premultiplied pixel, keeping its coverage.
pub fn multiply(base: PremulRgba8, tint: [u8; 3]) -> PremulRgba8 {
    [
        mul_div255_u8(u16::from(base[0]), u16::from(tint[0])),
        mul_div255_u8(u16::from(base[1]), u16::from(tint[1])),
        mul_div255_u8(u16::from(base[2]), u16::from(tint[2])),
        base[3],
    ]
}

pub fn premultiply(px: [u8; 4]) -> PremulRgba8 {
    let a = u16::from(px[3]);
    if a == 255 {
        return px;
    }
    [
        mul_div255_u8(u16::from(px[0]), a),
        mul_div255_u8(u16::from(px[1]), a),
        mul_div255_u8(u16::from(px[2]), a),
        px[3],
    ]
}

pub fn unpremultiply(px: PremulRgba8) -> [u8; 4] {
    let a = u32::from(px[3]);
    match a {
        0 => [0, 0, 0, 0],
        255 => px,
        _ => {
            let c = |v: u8| ((u32::from(v) * 255 + a / 2) / a).min(255) as u8;
            [c(px[0]), c(px[1]), c(px[2]), px[3]]
        }
    }
}

/// Mix `top` over `base` using `alpha` as the per-pixel weight.
///
/// Pixels where `alpha` is 0 are copied from `base` untouched.
pub fn mix_with_mask(base: &RgbaImage, top: &RgbaImage, alpha: &Mask) -> VestureResult<RgbaImage> {
    if base.dimensions() != top.dimensions()
        || base.dimensions() != (alpha.width(), alpha.height())
    {
        return Err(VestureError::validation(format!(
            "mix_with_mask expects equal sizes, got base {:?}, top {:?}, mask {}x{}",
            base.dimensions(),
            top.dimensions(),
            alpha.width(),
            alpha.height()
        )));
    }
    let mut out = base.clone();
    for ((o, t), &a) in out
        .as_mut()
        .chunks_exact_mut(4)
        .zip(top.as_raw().chunks_exact(4))
        .zip(alpha.as_raw())
    {
        match a {
            0 => {}
            255 => o.copy_from_slice(t),
            _ => {
                let mixed = crossfade([o[0], o[1], o[2], o[3]], [t[0], t[1], t[2], t[3]], a);
                o.copy_from_slice(&mixed);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/blend.rs"]
mod tests;
