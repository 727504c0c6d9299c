use image::{GrayImage, RgbaImage, imageops::FilterType};

use crate::foundation::error::{VestureError, VestureResult};

pub use kurbo::{Point, Rect, RoundedRect, Size};

/// Pixel dimensions of a raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    pub fn pixel_count(self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Full-frame rectangle in pixel space.
    pub fn rect(self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

/// Single-channel 8-bit raster; 255 is "inside", 0 is "outside".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Mask {
    /// All-zero mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; (width as usize) * (height as usize)],
        }
    }

    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> VestureResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| VestureError::validation("mask size overflow"))?;
        if data.len() != expected {
            return Err(VestureError::validation(format!(
                "mask expects {expected} bytes for {width}x{height}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a mask from unit coverage values (`0.0..=1.0`).
    pub fn from_unit(width: u32, height: u32, values: &[f32]) -> VestureResult<Self> {
        let data = values
            .iter()
            .map(|v| crate::foundation::math::unit_to_u8(*v))
            .collect();
        Self::from_raw(width, height, data)
    }

    pub fn from_gray(img: GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    /// Use the alpha channel of an RGBA raster as a mask.
    pub fn from_alpha(img: &RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.pixels().map(|p| p.0[3]).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.data[(y as usize) * (self.width as usize) + (x as usize)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x < self.width && y < self.height {
            self.data[(y as usize) * (self.width as usize) + (x as usize)] = value;
        }
    }

    /// Fill the pixels whose centers fall inside `rect` with `value`.
    pub fn fill_rect(&mut self, rect: Rect, value: u8) {
        let Some((x0, y0, x1, y1)) = pixel_span(rect, self.canvas()) else {
            return;
        };
        let w = self.width as usize;
        for y in y0..y1 {
            let row = (y as usize) * w;
            self.data[row + x0 as usize..row + x1 as usize].fill(value);
        }
    }

    /// Per-pixel product of two masks of the same size.
    pub fn multiply(&self, other: &Mask) -> VestureResult<Mask> {
        if self.canvas() != other.canvas() {
            return Err(VestureError::validation(format!(
                "mask multiply expects equal sizes, got {}x{} and {}x{}",
                self.width, self.height, other.width, other.height
            )));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| crate::foundation::math::mul_div255_u8(u16::from(a), u16::from(b)))
            .collect();
        Ok(Mask {
            width: self.width,
            height: self.height,
            data,
        })
    }

    /// Bilinear resample to `width`x`height`. Same-size requests return a clone.
    pub fn resized(&self, width: u32, height: u32) -> Mask {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let img = self.to_gray();
        Mask::from_gray(image::imageops::resize(
            &img,
            width,
            height,
            FilterType::Triangle,
        ))
    }

    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Fraction of pixels that are non-zero.
    pub fn coverage(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let on = self.data.iter().filter(|&&v| v != 0).count();
        on as f32 / self.data.len() as f32
    }

    /// Tight bounds of pixels at or above `threshold`, in pixel space.
    pub fn bounds_above(&self, threshold: u8) -> Option<Rect> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut any = false;
        for y in 0..self.height {
            let row = (y as usize) * (self.width as usize);
            for x in 0..self.width {
                if self.data[row + x as usize] >= threshold {
                    any = true;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }
        any.then(|| {
            Rect::new(
                f64::from(min_x),
                f64::from(min_y),
                f64::from(max_x + 1),
                f64::from(max_y + 1),
            )
        })
    }
}

/// Per-pixel "is this pixel part of the detected person" map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SilhouetteMask(pub Mask);

/// Per-pixel "may the generative step repaint this pixel" map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneMask(pub Mask);

impl SilhouetteMask {
    pub fn mask(&self) -> &Mask {
        &self.0
    }
}

impl ZoneMask {
    pub fn mask(&self) -> &Mask {
        &self.0
    }
}

/// Integer pixel span `[x0, x1) x [y0, y1)` covered by `rect`, clamped to `canvas`.
pub(crate) fn pixel_span(rect: Rect, canvas: Canvas) -> Option<(u32, u32, u32, u32)> {
    let clamp = |v: f64, max: u32| -> u32 { v.round().clamp(0.0, f64::from(max)) as u32 };
    let x0 = clamp(rect.x0, canvas.width);
    let x1 = clamp(rect.x1, canvas.width);
    let y0 = clamp(rect.y0, canvas.height);
    let y1 = clamp(rect.y1, canvas.height);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

/// Clamp a rectangle to the canvas bounds.
pub fn clamp_rect(rect: Rect, canvas: Canvas) -> Rect {
    let bounds = canvas.rect();
    Rect::new(
        rect.x0.clamp(bounds.x0, bounds.x1),
        rect.y0.clamp(bounds.y0, bounds.y1),
        rect.x1.clamp(bounds.x0, bounds.x1),
        rect.y1.clamp(bounds.y0, bounds.y1),
    )
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
