use std::sync::Arc;

use image::RgbaImage;

use crate::foundation::config::VisionConfig;
use crate::foundation::core::{Canvas, Mask, SilhouetteMask};
use crate::foundation::error::{VestureError, VestureResult};
use crate::garment::GarmentType;
use crate::vision::classify::{GarmentClassification, LabelScore, classify_labels};
use crate::vision::crop::crop_garment_region;
use crate::vision::keypoints::KeypointSet;

/// Person segmentation model. `Ok(None)` means no person was found.
pub trait PersonSegmenter: Send + Sync {
    fn segment(&self, image: &RgbaImage) -> VestureResult<Option<Mask>>;
}

/// Skeletal pose model. `Ok(None)` means no person was found.
pub trait PoseEstimator: Send + Sync {
    fn estimate(&self, image: &RgbaImage) -> VestureResult<Option<KeypointSet>>;
}

/// General-purpose image classifier producing open-vocabulary labels.
pub trait LabelClassifier: Send + Sync {
    fn labels(&self, image: &RgbaImage) -> VestureResult<Vec<LabelScore>>;
}

/// Segmentation, pose and classification behind one handle.
///
/// Each model is optional. A missing model or a failed segmentation/pose call degrades to "no
/// person" so callers fall back to proportion geometry.
#[derive(Clone, Default)]
pub struct VisionService {
    segmenter: Option<Arc<dyn PersonSegmenter>>,
    pose: Option<Arc<dyn PoseEstimator>>,
    classifier: Option<Arc<dyn LabelClassifier>>,
    config: VisionConfig,
}

impl std::fmt::Debug for VisionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionService")
            .field("segmenter", &self.segmenter.is_some())
            .field("pose", &self.pose.is_some())
            .field("classifier", &self.classifier.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl VisionService {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_segmenter(mut self, segmenter: Arc<dyn PersonSegmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn with_pose(mut self, pose: Arc<dyn PoseEstimator>) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn LabelClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Silhouette of the primary person at the image's resolution.
    #[tracing::instrument(skip_all, fields(w = image.width(), h = image.height()))]
    pub fn segment_person(&self, image: &RgbaImage) -> Option<SilhouetteMask> {
        let segmenter = self.segmenter.as_ref()?;
        let canvas = Canvas::of(image);
        match segmenter.segment(image) {
            Ok(Some(mask)) => {
                let mask = mask.resized(canvas.width, canvas.height);
                if mask.coverage() == 0.0 {
                    tracing::debug!("segmentation mask is empty");
                    return None;
                }
                Some(SilhouetteMask(mask))
            }
            Ok(None) => {
                tracing::debug!("no person detected");
                None
            }
            Err(err) => {
                tracing::warn!(%err, "segmentation failed; continuing without silhouette");
                None
            }
        }
    }

    /// Confident joints of the primary person, or `None` when none were found.
    #[tracing::instrument(skip_all, fields(w = image.width(), h = image.height()))]
    pub fn detect_keypoints(&self, image: &RgbaImage) -> Option<KeypointSet> {
        let pose = self.pose.as_ref()?;
        match pose.estimate(image) {
            Ok(Some(set)) => {
                let set = set.with_threshold(self.config.keypoint_threshold);
                (!set.is_empty()).then_some(set)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%err, "pose estimation failed; continuing without keypoints");
                None
            }
        }
    }

    /// Category, thermal index and style tags for a garment photo.
    pub fn classify_garment(&self, image: &RgbaImage) -> VestureResult<GarmentClassification> {
        let classifier = self
            .classifier
            .as_ref()
            .ok_or_else(|| VestureError::precondition("no garment classifier configured"))?;
        let labels = classifier.labels(image).map_err(|err| match err {
            VestureError::Inference(_) => err,
            other => VestureError::inference(format!("garment classifier: {other}")),
        })?;
        let out = classify_labels(&labels);
        tracing::debug!(
            kind = out.kind.as_str(),
            confidence = out.confidence,
            thermal = out.thermal_index,
            "classified garment"
        );
        Ok(out)
    }

    /// Crop the region of `image` that holds a garment of `kind`.
    ///
    /// Keypoints are detected on `image` itself; `silhouette`, when given, removes the background
    /// and tightens the crop.
    pub fn crop_garment_region(
        &self,
        image: &RgbaImage,
        kind: GarmentType,
        silhouette: Option<&SilhouetteMask>,
    ) -> VestureResult<RgbaImage> {
        let keypoints = self.detect_keypoints(image);
        crop_garment_region(
            image,
            kind,
            keypoints.as_ref(),
            silhouette,
            self.config.crop_pad_px,
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/vision/service.rs"]
mod tests;
