//! Premultiplied raster layers and the primitives the preview compositor paints with.

use image::{RgbaImage, imageops::FilterType};
use kurbo::Shape as _;

use crate::compositor::blend::{PremulRgba8, multiply, over, premultiply, unpremultiply};
use crate::foundation::core::{Canvas, Mask, Point, Rect, RoundedRect, pixel_span};
use crate::foundation::error::{VestureError, VestureResult};
use crate::foundation::math::{lerp_u8, mul_div255_u8, smoothstep, unit_to_u8};
use crate::garment::Gradient;

/// Premultiplied RGBA8 layer the size of the photo. Starts fully transparent.
#[derive(Clone, Debug)]
pub struct Layer {
    canvas: Canvas,
    data: Vec<u8>,
}

impl Layer {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            data: vec![0; canvas.pixel_count() * 4],
        }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = self.index(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    fn index(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.canvas.width as usize) + (x as usize)) * 4
    }

    fn blend_px(&mut self, x: u32, y: u32, src: PremulRgba8, opacity: f32) {
        let i = self.index(x, y);
        let dst = [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ];
        self.data[i..i + 4].copy_from_slice(&over(dst, src, opacity));
    }

    pub fn is_transparent(&self) -> bool {
        self.data.chunks_exact(4).all(|px| px[3] == 0)
    }

    /// Vertical two-stop gradient multiplied into the photo underneath.
    pub fn multiply_gradient(
        &mut self,
        photo: &RgbaImage,
        rect: Rect,
        gradient: Gradient,
        opacity: f32,
    ) {
        if Canvas::of(photo) != self.canvas {
            return;
        }
        let Some((x0, y0, x1, y1)) = pixel_span(rect, self.canvas) else {
            return;
        };
        let span = (y1 - y0).max(1) as f32;
        for y in y0..y1 {
            let t = (y - y0) as f32 / span;
            let tint = [
                lerp_u8(gradient.start[0], gradient.end[0], t),
                lerp_u8(gradient.start[1], gradient.end[1], t),
                lerp_u8(gradient.start[2], gradient.end[2], t),
            ];
            for x in x0..x1 {
                let base = premultiply(photo.get_pixel(x, y).0);
                self.blend_px(x, y, multiply(base, tint), opacity);
            }
        }
    }

    /// Draw `image` scaled to cover `rect`, centred and cropped to it.
    pub fn draw_image_fill(&mut self, image: &RgbaImage, rect: Rect, opacity: f32) {
        let Some((x0, y0, x1, y1)) = pixel_span(rect, self.canvas) else {
            return;
        };
        let (iw, ih) = image.dimensions();
        if iw == 0 || ih == 0 {
            return;
        }
        let (tw, th) = (x1 - x0, y1 - y0);
        let scale = (f64::from(tw) / f64::from(iw)).max(f64::from(th) / f64::from(ih));
        let sw = ((f64::from(iw) * scale).ceil() as u32).max(tw);
        let sh = ((f64::from(ih) * scale).ceil() as u32).max(th);
        let scaled = image::imageops::resize(image, sw, sh, FilterType::Triangle);
        let (ox, oy) = ((sw - tw) / 2, (sh - th) / 2);
        for y in 0..th {
            for x in 0..tw {
                let src = premultiply(scaled.get_pixel(ox + x, oy + y).0);
                self.blend_px(x0 + x, y0 + y, src, opacity);
            }
        }
    }

    /// Diagonal light-to-shadow wash, brightest at the top-left of `rect`.
    pub fn directional_light(&mut self, rect: Rect, opacity: f32) {
        let Some((x0, y0, x1, y1)) = pixel_span(rect, self.canvas) else {
            return;
        };
        let (w, h) = ((x1 - x0).max(1) as f32, (y1 - y0).max(1) as f32);
        for y in y0..y1 {
            for x in x0..x1 {
                let t = (((x - x0) as f32 / w) + ((y - y0) as f32 / h)) * 0.5;
                let v = lerp_u8(255, 0, t);
                self.blend_px(x, y, [v, v, v, 255], opacity);
            }
        }
    }

    /// Elliptical darkening towards the sides of `rect`, suggesting body curvature.
    pub fn curvature_shading(&mut self, rect: Rect, opacity: f32) {
        let Some((x0, y0, x1, y1)) = pixel_span(rect, self.canvas) else {
            return;
        };
        let c = rect.center();
        let (rx, ry) = ((rect.width() / 2.0).max(1.0), (rect.height() / 2.0).max(1.0));
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = (f64::from(x) + 0.5 - c.x) / rx;
                let dy = (f64::from(y) + 0.5 - c.y) / ry;
                let d = ((dx * dx + dy * 0.35 * dy).sqrt()) as f32;
                let a = unit_to_u8(smoothstep(0.55, 1.05, d));
                if a > 0 {
                    self.blend_px(x, y, [0, 0, 0, a], opacity);
                }
            }
        }
    }

    /// Soft shadow of `rect`, offset by `offset` and blurred by `radius`.
    pub fn drop_shadow(
        &mut self,
        rect: Rect,
        offset: (f64, f64),
        radius: u32,
        opacity: f32,
    ) -> VestureResult<()> {
        let shifted = rect + kurbo::Vec2::new(offset.0, offset.1);
        let mut shape = Mask::new(self.canvas.width, self.canvas.height);
        shape.fill_rect(shifted, 255);
        let soft = crate::compositor::blur::blur_mask(&shape, radius, None)?;
        for (i, &a) in soft.as_raw().iter().enumerate() {
            if a == 0 {
                continue;
            }
            let x = (i % self.canvas.width as usize) as u32;
            let y = (i / self.canvas.width as usize) as u32;
            self.blend_px(x, y, [0, 0, 0, a], opacity);
        }
        Ok(())
    }

    /// Scale every pixel's coverage by `mask`.
    pub fn clip_to_mask(&mut self, mask: &Mask) -> VestureResult<()> {
        if mask.canvas() != self.canvas {
            return Err(VestureError::validation(format!(
                "clip mask is {}x{}, layer is {}x{}",
                mask.width(),
                mask.height(),
                self.canvas.width,
                self.canvas.height
            )));
        }
        for (px, &m) in self.data.chunks_exact_mut(4).zip(mask.as_raw()) {
            match m {
                255 => {}
                0 => px.fill(0),
                _ => {
                    for c in px.iter_mut() {
                        *c = mul_div255_u8(u16::from(*c), u16::from(m));
                    }
                }
            }
        }
        Ok(())
    }

    /// Darken colour (not coverage) towards the canvas corners.
    pub fn vignette(&mut self, strength: f32) {
        if strength <= 0.0 {
            return;
        }
        let c = self.canvas.rect().center();
        let (rx, ry) = (c.x.max(1.0), c.y.max(1.0));
        let width = self.canvas.width as usize;
        for (i, px) in self.data.chunks_exact_mut(4).enumerate() {
            if px[3] == 0 {
                continue;
            }
            let x = (i % width) as f64 + 0.5;
            let y = (i / width) as f64 + 0.5;
            let d = (((x - c.x) / rx).hypot((y - c.y) / ry) / std::f64::consts::SQRT_2) as f32;
            let keep = 1.0 - strength * smoothstep(0.35, 1.0, d);
            let k = u16::from(unit_to_u8(keep));
            for ch in &mut px[..3] {
                *ch = mul_div255_u8(u16::from(*ch), k);
            }
        }
    }

    /// Composite this layer over `photo`. Pixels the layer does not cover keep their exact value.
    pub fn composite_onto(&self, photo: &RgbaImage) -> VestureResult<RgbaImage> {
        if Canvas::of(photo) != self.canvas {
            return Err(VestureError::validation("layer and photo sizes differ"));
        }
        let mut out = photo.clone();
        for (dst, src) in out.as_mut().chunks_exact_mut(4).zip(self.data.chunks_exact(4)) {
            if src[3] == 0 {
                continue;
            }
            let base = premultiply([dst[0], dst[1], dst[2], dst[3]]);
            let mixed = over(base, [src[0], src[1], src[2], src[3]], 1.0);
            dst.copy_from_slice(&unpremultiply(mixed));
        }
        Ok(out)
    }

    /// Source-over `other` onto this layer.
    pub fn merge(&mut self, other: &Layer) -> VestureResult<()> {
        if other.canvas != self.canvas {
            return Err(VestureError::validation("merged layers differ in size"));
        }
        for (d, s) in self.data.chunks_exact_mut(4).zip(other.data.chunks_exact(4)) {
            if s[3] == 0 {
                continue;
            }
            let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]], 1.0);
            d.copy_from_slice(&out);
        }
        Ok(())
    }
}

/// Coverage mask of a rounded rectangle, sampled at pixel centres.
pub fn rounded_rect_mask(canvas: Canvas, rect: Rect, corner: f64) -> Mask {
    let mut mask = Mask::new(canvas.width, canvas.height);
    let Some((x0, y0, x1, y1)) = pixel_span(rect, canvas) else {
        return mask;
    };
    let shape = RoundedRect::from_rect(rect, corner);
    for y in y0..y1 {
        for x in x0..x1 {
            if shape.contains(Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5)) {
                mask.set(x, y, 255);
            }
        }
    }
    mask
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/paint.rs"]
mod tests;
