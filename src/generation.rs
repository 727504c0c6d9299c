//! Diffusion inpainting over the fast composite, and the blend that puts the result back into the
//! original photo.

pub mod engine;
pub mod finisher;
pub mod orchestrator;
pub mod prompt;
