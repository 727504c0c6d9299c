use rayon::prelude::*;

use crate::foundation::core::Mask;
use crate::foundation::error::{VestureError, VestureResult};

/// Separable gaussian blur of a single-channel mask.
///
/// Edges clamp. `sigma` defaults to half the radius when `None`.
pub fn blur_mask(mask: &Mask, radius: u32, sigma: Option<f32>) -> VestureResult<Mask> {
    if radius == 0 || mask.canvas().is_empty() {
        return Ok(mask.clone());
    }
    let sigma = sigma.unwrap_or((radius as f32 / 2.0).max(0.5));
    let kernel = gaussian_kernel_q16(radius, sigma)?;

    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let mut tmp = vec![0u8; width * height];
    let mut out = vec![0u8; width * height];

    horizontal_pass(mask.as_raw(), &mut tmp, width, &kernel);
    vertical_pass(&tmp, &mut out, width, height, &kernel);
    Mask::from_raw(mask.width(), mask.height(), out)
}

pub(crate) fn gaussian_kernel_q16(radius: u32, sigma: f32) -> VestureResult<Vec<u32>> {
    if radius == 0 {
        return Ok(vec![1 << 16]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(VestureError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| {
            let x = f64::from(i);
            (-x * x / denom).exp()
        })
        .collect();
    let sum: f64 = weights_f.iter().sum();
    if sum <= 0.0 {
        return Err(VestureError::validation("gaussian kernel sum is zero"));
    }

    let mut weights: Vec<u32> = weights_f
        .iter()
        .map(|wf| ((wf / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();
    let acc: i64 = weights.iter().map(|&w| i64::from(w)).sum();
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }

    Ok(weights)
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: usize, k: &[u32]) {
    let radius = (k.len() / 2) as isize;
    let w = width as isize;
    dst.par_chunks_mut(width)
        .zip(src.par_chunks(width))
        .for_each(|(out_row, row)| {
            for (x, out) in out_row.iter_mut().enumerate() {
                let mut acc = 0u64;
                for (ki, &kw) in k.iter().enumerate() {
                    let sx = (x as isize + ki as isize - radius).clamp(0, w - 1) as usize;
                    acc += u64::from(kw) * u64::from(row[sx]);
                }
                *out = q16_to_u8(acc);
            }
        });
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: usize, height: usize, k: &[u32]) {
    let radius = (k.len() / 2) as isize;
    let h = height as isize;
    dst.par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, out_row)| {
            for (x, out) in out_row.iter_mut().enumerate() {
                let mut acc = 0u64;
                for (ki, &kw) in k.iter().enumerate() {
                    let sy = (y as isize + ki as isize - radius).clamp(0, h - 1) as usize;
                    acc += u64::from(kw) * u64::from(src[sy * width + x]);
                }
                *out = q16_to_u8(acc);
            }
        });
}

fn q16_to_u8(acc: u64) -> u8 {
    let v = (acc + 32768) >> 16;
    v.min(255) as u8
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/blur.rs"]
mod tests;
