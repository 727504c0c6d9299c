#![forbid(unsafe_code)]

pub mod assets;
pub mod compositor;
pub mod foundation;
pub mod garment;
pub mod generation;
pub mod geometry;
pub mod session;
pub mod vision;

pub use assets::manager::{AssetState, ModelManager, PressureOutcome};
pub use assets::manifest::{Manifest, ManifestEntry};
pub use assets::transport::Transport;
#[cfg(feature = "http")]
pub use assets::transport::HttpTransport;
pub use compositor::fast::FastCompositor;
pub use compositor::preview::{PreviewController, PreviewState};
pub use foundation::config::TryOnConfig;
pub use foundation::core::{Canvas, Mask, SilhouetteMask, ZoneMask};
pub use foundation::error::{ErrorKind, VestureError, VestureResult};
pub use garment::{GarmentReference, GarmentType, OutfitSelection, Slot};
pub use generation::engine::{EngineLoader, InpaintEngine, InpaintRequest};
pub use generation::orchestrator::{GenerationState, Generator};
pub use session::{RenderOutcome, RenderTier, TryOnSession};
pub use vision::keypoints::{Joint, KeypointSet};
pub use vision::service::VisionService;
