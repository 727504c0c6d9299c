use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::RgbaImage;
use xxhash_rust::xxh3::Xxh3;

use crate::compositor::fast::FastCompositor;
use crate::foundation::error::{VestureError, VestureResult};
use crate::foundation::state::StateCell;
use crate::garment::OutfitSelection;
use crate::vision::service::VisionService;

/// A finished preview.
#[derive(Clone, Debug)]
pub struct PreviewOutput {
    pub image: RgbaImage,
    /// Identity of the photo + outfit pair this preview was rendered for.
    pub key: u64,
    /// Time from request to result, including the display floor.
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub enum PreviewState {
    Idle,
    Processing,
    Done(Arc<PreviewOutput>),
    Error(String),
}

impl PreviewState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, PreviewState::Processing)
    }
}

/// Handle for one preview request.
#[derive(Debug)]
pub struct PreviewTicket {
    pub token: u64,
    handle: Option<JoinHandle<()>>,
}

impl PreviewTicket {
    /// `false` when the request matched the last or in-flight one and no work was started.
    pub fn started(&self) -> bool {
        self.handle.is_some()
    }

    /// Block until this request's worker has finished.
    pub fn wait(self) {
        if let Some(h) = self.handle
            && h.join().is_err()
        {
            tracing::error!(token = self.token, "preview worker panicked");
        }
    }
}

struct Shared {
    state: StateCell<PreviewState>,
    latest: AtomicU64,
    in_flight: Mutex<Option<u64>>,
    vision: VisionService,
    compositor: FastCompositor,
    min_display: Duration,
}

/// Runs fast previews on worker threads and owns the preview state machine.
///
/// A newer request supersedes an older one: the older result is dropped on arrival. Every
/// request stays in `Processing` for at least the configured display floor.
#[derive(Clone)]
pub struct PreviewController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for PreviewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewController")
            .field("state", &self.shared.state.get())
            .field("min_display", &self.shared.min_display)
            .finish_non_exhaustive()
    }
}

impl PreviewController {
    pub fn new(vision: VisionService, compositor: FastCompositor) -> Self {
        let min_display = compositor.config().min_display();
        Self {
            shared: Arc::new(Shared {
                state: StateCell::new(PreviewState::Idle),
                latest: AtomicU64::new(0),
                in_flight: Mutex::new(None),
                vision,
                compositor,
                min_display,
            }),
        }
    }

    pub fn state(&self) -> PreviewState {
        self.shared.state.get()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<PreviewState> {
        self.shared.state.subscribe()
    }

    /// Block until the state leaves `Processing` or `timeout` elapses.
    pub fn wait_settled(&self, timeout: Duration) -> Option<PreviewState> {
        self.shared.state.wait_until(timeout, PreviewState::is_settled)
    }

    /// Start a preview of `outfit` on `photo`.
    pub fn request(
        &self,
        photo: Arc<RgbaImage>,
        outfit: OutfitSelection,
    ) -> VestureResult<PreviewTicket> {
        let key = request_key(&photo, &outfit);
        let shared = &self.shared;

        let duplicate = match shared.state.get() {
            PreviewState::Done(out) => out.key == key,
            PreviewState::Processing => *lock(&shared.in_flight) == Some(key),
            _ => false,
        };
        if duplicate {
            tracing::debug!(key, "preview request matches current one; skipped");
            return Ok(PreviewTicket {
                token: shared.latest.load(Ordering::SeqCst),
                handle: None,
            });
        }

        let token = shared.latest.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&shared.in_flight) = Some(key);
        shared.state.set(PreviewState::Processing);

        let worker = Arc::clone(shared);
        let handle = std::thread::Builder::new()
            .name("vesture-preview".to_string())
            .spawn(move || run_preview(&worker, token, key, &photo, &outfit))
            .map_err(|e| VestureError::Other(anyhow::anyhow!("spawn preview worker: {e}")))?;
        Ok(PreviewTicket {
            token,
            handle: Some(handle),
        })
    }

    /// Return to `Idle`, discarding any in-flight result.
    pub fn reset(&self) {
        self.shared.latest.fetch_add(1, Ordering::SeqCst);
        *lock(&self.shared.in_flight) = None;
        self.shared.state.set(PreviewState::Idle);
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Identity of a photo + outfit pair.
pub fn request_key(photo: &RgbaImage, outfit: &OutfitSelection) -> u64 {
    let mut h = Xxh3::new();
    h.update(&photo.width().to_le_bytes());
    h.update(&photo.height().to_le_bytes());
    h.update(photo.as_raw());
    h.update(&outfit.fingerprint().to_le_bytes());
    h.digest()
}

fn run_preview(
    shared: &Shared,
    token: u64,
    key: u64,
    photo: &RgbaImage,
    outfit: &OutfitSelection,
) {
    let started = Instant::now();
    let result = std::thread::scope(|s| {
        let compute = s.spawn(|| render(shared, photo, outfit));
        std::thread::sleep(shared.min_display);
        compute.join()
    });
    let elapsed = started.elapsed();

    let next = match result {
        Ok(Ok(image)) => PreviewState::Done(Arc::new(PreviewOutput {
            image,
            key,
            elapsed,
        })),
        Ok(Err(err)) => {
            tracing::warn!(%err, "preview failed");
            PreviewState::Error(err.to_string())
        }
        Err(_) => PreviewState::Error("preview worker panicked".to_string()),
    };

    let applied = shared
        .state
        .transition(|_| shared.latest.load(Ordering::SeqCst) == token, next);
    if applied.is_some() {
        *lock(&shared.in_flight) = None;
        tracing::debug!(token, elapsed_ms = elapsed.as_millis() as u64, "preview finished");
    } else {
        tracing::debug!(token, "preview superseded; result dropped");
    }
}

fn render(
    shared: &Shared,
    photo: &RgbaImage,
    outfit: &OutfitSelection,
) -> VestureResult<RgbaImage> {
    if outfit.is_empty() {
        return Ok(photo.clone());
    }
    let silhouette = shared.vision.segment_person(photo);
    let keypoints = shared.vision.detect_keypoints(photo);
    shared
        .compositor
        .compose(photo, outfit, silhouette.as_ref(), keypoints.as_ref())
}

#[cfg(test)]
#[path = "../../tests/unit/compositor/preview.rs"]
mod tests;
