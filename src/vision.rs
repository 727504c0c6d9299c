//! Segmentation, pose and garment classification.
//!
//! The inference models themselves are opaque and plug in through the traits in [`service`]; this
//! module owns what happens around them.

pub mod classify;
pub mod crop;
pub mod keypoints;
pub mod service;
