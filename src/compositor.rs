//! Fast raster preview: layers garment imagery onto the photo without any heavy inference.

pub mod blend;
pub mod blur;
pub mod fast;
pub mod paint;
pub mod preview;
