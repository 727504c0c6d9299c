use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use image::{GrayImage, RgbaImage};

use crate::assets::manager::ModelManager;
use crate::compositor::fast::FastCompositor;
use crate::foundation::config::{BlendConfig, GenerationConfig};
use crate::foundation::core::Canvas;
use crate::foundation::error::{VestureError, VestureResult};
use crate::foundation::state::StateCell;
use crate::garment::OutfitSelection;
use crate::generation::engine::InpaintRequest;
use crate::generation::finisher::blend;
use crate::generation::prompt::build_prompt;
use crate::geometry::build_zones;
use crate::vision::service::VisionService;

/// Completed denoising steps out of the total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerationProgress {
    pub step: u32,
    pub total: u32,
}

impl GenerationProgress {
    pub fn fraction(self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.step.min(self.total)) / f64::from(self.total)
    }

    fn pack(self) -> u64 {
        (u64::from(self.step) << 32) | u64::from(self.total)
    }

    fn unpack(v: u64) -> Self {
        Self {
            step: (v >> 32) as u32,
            total: v as u32,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GenerationOutput {
    pub image: RgbaImage,
    pub seed: u64,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub enum GenerationState {
    Idle,
    Generating(GenerationProgress),
    Done(Arc<GenerationOutput>),
    Error(String),
}

struct Inner {
    state: StateCell<GenerationState>,
    progress: AtomicU64,
    last_output: Mutex<Option<Arc<GenerationOutput>>>,
    serial: Mutex<()>,
    models: ModelManager,
    vision: VisionService,
    compositor: FastCompositor,
    config: GenerationConfig,
    blend: BlendConfig,
}

/// Runs diffusion inpainting over a composited base, one call at a time.
#[derive(Clone)]
pub struct Generator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("config", &self.inner.config)
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

impl Generator {
    pub fn new(
        models: ModelManager,
        vision: VisionService,
        compositor: FastCompositor,
        config: GenerationConfig,
        blend: BlendConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: StateCell::new(GenerationState::Idle),
                progress: AtomicU64::new(0),
                last_output: Mutex::new(None),
                serial: Mutex::new(()),
                models,
                vision,
                compositor,
                config,
                blend,
            }),
        }
    }

    pub fn state(&self) -> GenerationState {
        self.inner.state.get()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<GenerationState> {
        self.inner.state.subscribe()
    }

    /// Progress of the running call. Safe to poll from any thread.
    pub fn progress(&self) -> GenerationProgress {
        GenerationProgress::unpack(self.inner.progress.load(Ordering::Acquire))
    }

    /// Most recent successful result. Failed calls leave it in place.
    pub fn last_output(&self) -> Option<Arc<GenerationOutput>> {
        lock(&self.inner.last_output).clone()
    }

    /// Generate with the configured seed, or a random one.
    pub fn generate(&self, photo: &RgbaImage, outfit: &OutfitSelection) -> VestureResult<RgbaImage> {
        self.run(photo, outfit, self.inner.config.seed)
    }

    pub fn generate_seeded(
        &self,
        photo: &RgbaImage,
        outfit: &OutfitSelection,
        seed: u64,
    ) -> VestureResult<RgbaImage> {
        self.run(photo, outfit, Some(seed))
    }

    fn run(
        &self,
        photo: &RgbaImage,
        outfit: &OutfitSelection,
        seed: Option<u64>,
    ) -> VestureResult<RgbaImage> {
        if outfit.is_empty() {
            return Ok(photo.clone());
        }
        let inner = &self.inner;
        // Held for the whole call so eviction cannot pull the engine out from under it.
        let engine = match inner.models.acquire_engine() {
            Ok(engine) => engine,
            Err(err) => {
                tracing::warn!(%err, "generation rejected");
                // A run already in flight owns the state until it finishes.
                inner.state.transition(
                    |s| !matches!(s, GenerationState::Generating(_)),
                    GenerationState::Error(err.to_string()),
                );
                return Err(err);
            }
        };

        let _serial = lock(&inner.serial);
        let started = Instant::now();
        let seed = seed.unwrap_or_else(rand::random);
        let total = inner.config.steps;
        self.report(GenerationProgress { step: 0, total });

        let result = (|| {
            let canvas = Canvas::of(photo);
            if canvas.is_empty() {
                return Err(VestureError::validation("cannot generate onto an empty photo"));
            }
            let silhouette = inner.vision.segment_person(photo);
            let keypoints = inner.vision.detect_keypoints(photo);
            let base = inner
                .compositor
                .compose(photo, outfit, silhouette.as_ref(), keypoints.as_ref())?;
            let prompt = build_prompt(outfit);
            let zones = build_zones(outfit, canvas, keypoints.as_ref());

            let res = inner.config.resolution;
            let request = InpaintRequest {
                image: image::imageops::resize(&base, res, res, FilterType::CatmullRom),
                mask: binarize(&zones.mask.mask().resized(res, res).to_gray()),
                prompt: prompt.positive,
                negative_prompt: prompt.negative,
                steps: total,
                guidance_scale: inner.config.guidance_scale,
                seed,
            };
            request.validate()?;
            tracing::info!(seed, steps = total, res, "inpainting");

            let candidates = engine.inpaint(&request, &|step, total| {
                self.report(GenerationProgress { step, total });
            })?;
            let Some(generated) = candidates.into_iter().next() else {
                return Err(VestureError::inference("generator returned no images"));
            };

            let _writing = inner.models.begin_output_write();
            blend(
                photo,
                &generated,
                &zones.mask,
                silhouette.as_ref(),
                inner.blend.feather_radius,
            )
        })();

        match result {
            Ok(image) => {
                let output = Arc::new(GenerationOutput {
                    image: image.clone(),
                    seed,
                    elapsed: started.elapsed(),
                });
                *lock(&inner.last_output) = Some(Arc::clone(&output));
                inner.state.set(GenerationState::Done(output));
                tracing::info!(
                    seed,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generation finished"
                );
                Ok(image)
            }
            Err(err) => {
                tracing::error!(%err, "generation failed");
                inner.state.set(GenerationState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    fn report(&self, progress: GenerationProgress) {
        self.inner.progress.store(progress.pack(), Ordering::Release);
        self.inner.state.set(GenerationState::Generating(progress));
    }
}

/// Inpainting masks are hard: anything at least half covered is repainted.
fn binarize(mask: &GrayImage) -> GrayImage {
    let mut out = mask.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] >= 128 { 255 } else { 0 };
    }
    out
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
#[path = "../../tests/unit/generation/orchestrator.rs"]
mod tests;
