use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::foundation::core::{Point, Rect};

/// Joints below this confidence are treated as absent.
pub const DEFAULT_KEYPOINT_THRESHOLD: f32 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Neck,
    LeftShoulder,
    RightShoulder,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const SHOULDERS: [Joint; 2] = [Joint::LeftShoulder, Joint::RightShoulder];
    pub const HIPS: [Joint; 2] = [Joint::LeftHip, Joint::RightHip];
    pub const KNEES: [Joint; 2] = [Joint::LeftKnee, Joint::RightKnee];
    pub const ANKLES: [Joint; 2] = [Joint::LeftAnkle, Joint::RightAnkle];
}

/// A detected joint in pixel coordinates of the analysed image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub confidence: f32,
}

/// Sparse joint map with a confidence floor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeypointSet {
    joints: BTreeMap<Joint, Keypoint>,
    threshold: f32,
}

impl Default for KeypointSet {
    fn default() -> Self {
        Self {
            joints: BTreeMap::new(),
            threshold: DEFAULT_KEYPOINT_THRESHOLD,
        }
    }
}

impl KeypointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn insert(&mut self, joint: Joint, x: f64, y: f64, confidence: f32) {
        self.joints.insert(
            joint,
            Keypoint {
                x,
                y,
                confidence: confidence.clamp(0.0, 1.0),
            },
        );
    }

    pub fn with(mut self, joint: Joint, x: f64, y: f64, confidence: f32) -> Self {
        self.insert(joint, x, y, confidence);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Position of `joint` when it was detected with enough confidence.
    pub fn get(&self, joint: Joint) -> Option<Point> {
        self.joints
            .get(&joint)
            .filter(|k| k.confidence >= self.threshold && k.x.is_finite() && k.y.is_finite())
            .map(|k| Point::new(k.x, k.y))
    }

    pub fn raw(&self, joint: Joint) -> Option<&Keypoint> {
        self.joints.get(&joint)
    }

    /// Confident joints only.
    pub fn present(&self) -> impl Iterator<Item = (Joint, Point)> + '_ {
        self.joints
            .keys()
            .filter_map(|&j| self.get(j).map(|p| (j, p)))
    }

    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }

    /// Confident positions among `joints`.
    pub fn any_of(&self, joints: &[Joint]) -> Vec<Point> {
        joints.iter().filter_map(|&j| self.get(j)).collect()
    }

    pub fn mean_y(&self, joints: &[Joint]) -> Option<f64> {
        let pts = self.any_of(joints);
        (!pts.is_empty()).then(|| pts.iter().map(|p| p.y).sum::<f64>() / pts.len() as f64)
    }

    pub fn max_y(&self, joints: &[Joint]) -> Option<f64> {
        self.any_of(joints).into_iter().map(|p| p.y).reduce(f64::max)
    }

    pub fn min_y(&self, joints: &[Joint]) -> Option<f64> {
        self.any_of(joints).into_iter().map(|p| p.y).reduce(f64::min)
    }

    /// Bounding box of the confident positions among `joints`.
    pub fn bounds(&self, joints: &[Joint]) -> Option<Rect> {
        let pts = self.any_of(joints);
        let first = *pts.first()?;
        Some(
            pts.iter()
                .fold(Rect::from_points(first, first), |r, &p| r.union_pt(p)),
        )
    }

    /// Positions multiplied by `(sx, sy)`, for moving between image resolutions.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        let joints = self
            .joints
            .iter()
            .map(|(&j, k)| {
                (
                    j,
                    Keypoint {
                        x: k.x * sx,
                        y: k.y * sy,
                        confidence: k.confidence,
                    },
                )
            })
            .collect();
        Self {
            joints,
            threshold: self.threshold,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/vision/keypoints.rs"]
mod tests;
