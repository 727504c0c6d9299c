use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::assets::download::{DownloadProgress, Downloader, RateMeter};
use crate::assets::extract::extract_zip;
use crate::assets::manifest::{ArchiveKind, Manifest, ManifestEntry, remove_if_exists};
use crate::assets::transport::Transport;
use crate::foundation::config::AssetConfig;
use crate::foundation::error::{VestureError, VestureResult};
use crate::foundation::state::StateCell;
use crate::generation::engine::{EngineLoader, InpaintEngine};

/// Minimum change in overall fraction before a new `Downloading` state is published.
const PUBLISH_STEP: f64 = 0.005;

#[derive(Clone, Debug, PartialEq)]
pub enum AssetState {
    Absent,
    Checking,
    Downloading(DownloadProgress),
    Extracting { entry: String },
    Loading,
    Ready,
    Error(String),
}

impl AssetState {
    /// An operation owns the state machine and others must not start.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            AssetState::Checking
                | AssetState::Downloading(_)
                | AssetState::Extracting { .. }
                | AssetState::Loading
        )
    }
}

/// A secondary model that can drop its weights when memory runs low.
pub trait Evictable: Send + Sync {
    fn name(&self) -> &str;
    fn evict(&self);
}

/// What a memory-pressure notification did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressureOutcome {
    EvictedEngine,
    EvictedAuxiliary(usize),
    /// A generation is writing its output; eviction runs once it finishes.
    Deferred,
    Nothing,
}

struct Inner {
    state: StateCell<AssetState>,
    engine: Mutex<Option<Arc<dyn InpaintEngine>>>,
    auxiliary: Mutex<Vec<Arc<dyn Evictable>>>,
    writers: AtomicUsize,
    eviction_pending: AtomicBool,
    /// Set by an eviction that lands while an operation is on its way to `Ready`.
    evict_requested: AtomicBool,
    progress: Mutex<DownloadProgress>,
    manifest: Manifest,
    root: PathBuf,
    rate_interval: Duration,
    transport: Arc<dyn Transport>,
    loader: Arc<dyn EngineLoader>,
}

/// Owns the generative model's files and its single live handle.
///
/// Every inference call gets its engine through [`ModelManager::acquire_engine`], so evicting
/// here invalidates the handle for new callers while in-flight calls finish on their own
/// reference.
#[derive(Clone)]
pub struct ModelManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("root", &self.inner.root)
            .field("state", &self.inner.state.get())
            .finish_non_exhaustive()
    }
}

impl ModelManager {
    pub fn new(
        config: &AssetConfig,
        manifest: Manifest,
        transport: Arc<dyn Transport>,
        loader: Arc<dyn EngineLoader>,
    ) -> Self {
        let progress = DownloadProgress {
            entries_total: manifest.entries.len(),
            ..DownloadProgress::default()
        };
        Self {
            inner: Arc::new(Inner {
                state: StateCell::new(AssetState::Absent),
                engine: Mutex::new(None),
                auxiliary: Mutex::new(Vec::new()),
                writers: AtomicUsize::new(0),
                eviction_pending: AtomicBool::new(false),
                evict_requested: AtomicBool::new(false),
                progress: Mutex::new(progress),
                manifest,
                root: config.model_root.clone(),
                rate_interval: config.rate_sample_interval(),
                transport,
                loader,
            }),
        }
    }

    pub fn state(&self) -> AssetState {
        self.inner.state.get()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<AssetState> {
        self.inner.state.subscribe()
    }

    pub fn wait_until(
        &self,
        timeout: Duration,
        pred: impl FnMut(&AssetState) -> bool,
    ) -> Option<AssetState> {
        self.inner.state.wait_until(timeout, pred)
    }

    /// Latest download snapshot.
    pub fn progress(&self) -> DownloadProgress {
        lock(&self.inner.progress).clone()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn register_auxiliary(&self, model: Arc<dyn Evictable>) {
        tracing::debug!(name = model.name(), "auxiliary model registered");
        lock(&self.inner.auxiliary).push(model);
    }

    /// Scan the model root. When every file is present, start loading on a worker thread.
    ///
    /// Returns whether all manifest files exist locally.
    #[tracing::instrument(skip_all)]
    pub fn check_availability(&self) -> bool {
        let inner = &self.inner;
        let started = inner
            .state
            .transition(|s| !s.is_busy() && *s != AssetState::Ready, AssetState::Checking);
        if started.is_none() {
            return inner.manifest.is_complete(&inner.root);
        }
        inner.evict_requested.store(false, Ordering::SeqCst);

        let missing = inner.manifest.missing(&inner.root);
        if !missing.is_empty() {
            tracing::info!(missing = missing.len(), "model files missing");
            inner.state.set(AssetState::Absent);
            return false;
        }

        inner.state.set(AssetState::Loading);
        let me = self.clone();
        let spawned = std::thread::Builder::new()
            .name("vesture-load".to_string())
            .spawn(move || {
                let _ = me.load_files();
            });
        if let Err(e) = spawned {
            self.fail(&VestureError::Other(anyhow::anyhow!("spawn loader: {e}")));
        }
        true
    }

    /// Fetch every missing file, then load. Blocks; see [`ModelManager::spawn_download`].
    #[tracing::instrument(skip_all)]
    pub fn download(&self) -> VestureResult<()> {
        let inner = &self.inner;
        if inner.state.get() == AssetState::Ready {
            return Ok(());
        }
        let start = DownloadProgress {
            entries_total: inner.manifest.entries.len(),
            ..DownloadProgress::default()
        };
        let started = inner
            .state
            .transition(|s| !s.is_busy(), AssetState::Downloading(start.clone()));
        if started.is_none() {
            return Err(VestureError::precondition(
                "another model operation is in progress",
            ));
        }
        inner.evict_requested.store(false, Ordering::SeqCst);
        *lock(&inner.progress) = start;

        if let Err(err) = self.fetch_all() {
            self.fail(&err);
            return Err(err);
        }
        self.load_files()
    }

    pub fn spawn_download(&self) -> VestureResult<JoinHandle<VestureResult<()>>> {
        let me = self.clone();
        std::thread::Builder::new()
            .name("vesture-download".to_string())
            .spawn(move || me.download())
            .map_err(|e| VestureError::Other(anyhow::anyhow!("spawn download worker: {e}")))
    }

    fn fetch_all(&self) -> VestureResult<()> {
        let inner = &self.inner;
        let root = inner.root.as_path();
        let weights = inner.manifest.weights();
        let downloader = Downloader::new(inner.transport.as_ref(), root);

        let mut base = 0.0;
        for (i, (entry, weight)) in inner.manifest.entries.iter().zip(weights).enumerate() {
            if entry.is_present(root) {
                tracing::debug!(entry = %entry.id, "already present; skipped");
            } else {
                let snapshot = self.update_progress(|p| {
                    p.current_entry = Some(entry.id.clone());
                    p.fraction = base;
                    p.bytes_done = 0;
                    p.bytes_total = entry.expected_size;
                    p.bytes_per_sec = 0.0;
                });
                inner.state.set(AssetState::Downloading(snapshot));

                let mut meter = RateMeter::new(inner.rate_interval, Instant::now());
                let mut last_done: Option<u64> = None;
                let mut last_published = base;
                downloader.fetch(entry, &mut |done, total| {
                    // The first report carries resumed bytes, which were not transferred now.
                    let resampled = match last_done {
                        Some(prev) => meter
                            .record(done.saturating_sub(prev), Instant::now())
                            .is_some(),
                        None => false,
                    };
                    last_done = Some(done);
                    let file_fraction = match total {
                        Some(t) if t > 0 => (done as f64 / t as f64).min(1.0),
                        _ => 0.0,
                    };
                    let fraction = base + weight * file_fraction;
                    let snapshot = self.update_progress(|p| {
                        p.fraction = fraction;
                        p.bytes_done = done;
                        p.bytes_total = total;
                        p.bytes_per_sec = meter.rate();
                    });
                    if resampled || fraction - last_published >= PUBLISH_STEP || Some(done) == total
                    {
                        last_published = fraction;
                        inner.state.set(AssetState::Downloading(snapshot));
                    }
                })?;
            }

            self.extract_if_needed(entry, true)?;
            base += weight;
            let snapshot = self.update_progress(|p| {
                p.fraction = base.min(1.0);
                p.entries_done = i + 1;
            });
            inner.state.set(AssetState::Downloading(snapshot));
        }

        self.update_progress(|p| {
            p.fraction = 1.0;
            p.current_entry = None;
        });
        Ok(())
    }

    /// Unpack `entry` when it is an archive whose directory is missing.
    fn extract_if_needed(&self, entry: &ManifestEntry, publish: bool) -> VestureResult<()> {
        let root = self.inner.root.as_path();
        let (Some(ArchiveKind::Zip), Some(dir)) = (entry.archive, entry.extract_dir(root)) else {
            return Ok(());
        };
        if dir.is_dir() {
            return Ok(());
        }
        if publish {
            self.inner.state.set(AssetState::Extracting {
                entry: entry.id.clone(),
            });
        }
        let archive = entry.local_path(root);
        if let Err(err) = extract_zip(&archive, &dir) {
            // A corrupt archive must not keep the manifest looking complete.
            remove_if_exists(&archive)?;
            let _ = std::fs::remove_dir_all(&dir);
            return Err(err);
        }
        Ok(())
    }

    /// Load the engine from files already on disk.
    pub fn load(&self) -> VestureResult<()> {
        let started = self
            .inner
            .state
            .transition(|s| !s.is_busy(), AssetState::Loading);
        if started.is_none() {
            return Err(VestureError::precondition(
                "another model operation is in progress",
            ));
        }
        self.inner.evict_requested.store(false, Ordering::SeqCst);
        self.load_files()
    }

    #[tracing::instrument(skip_all)]
    fn load_files(&self) -> VestureResult<()> {
        let inner = &self.inner;
        inner.state.set(AssetState::Loading);
        let result = (|| {
            let missing = inner.manifest.missing(&inner.root);
            if !missing.is_empty() {
                let ids: Vec<&str> = missing.iter().map(|e| e.id.as_str()).collect();
                return Err(VestureError::asset(format!(
                    "missing model files: {}",
                    ids.join(", ")
                )));
            }
            for entry in &inner.manifest.entries {
                self.extract_if_needed(entry, false)?;
            }
            inner.loader.load(&inner.root, &inner.manifest)
        })();

        match result {
            Ok(engine) => {
                // Store and publish under the engine lock so an eviction sees both or neither.
                let mut slot = lock(&inner.engine);
                if inner.evict_requested.swap(false, Ordering::SeqCst) {
                    drop(engine);
                    inner.state.set(AssetState::Absent);
                    tracing::info!("engine evicted while loading; not kept");
                    return Err(VestureError::precondition("model evicted while loading"));
                }
                *slot = Some(engine);
                inner.eviction_pending.store(false, Ordering::SeqCst);
                inner.state.set(AssetState::Ready);
                drop(slot);
                tracing::info!(root = %inner.root.display(), "model ready");
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// The live engine, or "engine not available" unless the state is `Ready`.
    pub fn acquire_engine(&self) -> VestureResult<Arc<dyn InpaintEngine>> {
        if self.inner.state.get() != AssetState::Ready {
            return Err(VestureError::engine_not_available());
        }
        lock(&self.inner.engine)
            .clone()
            .ok_or_else(VestureError::engine_not_available)
    }

    /// Drop the engine and every auxiliary model. Callers holding an engine keep it alive until
    /// they release it.
    pub fn evict(&self) {
        let engine = self.evict_engine();
        let auxiliary = self.evict_auxiliary();
        tracing::info!(engine, auxiliary, "models evicted");
    }

    /// Evict, delete every local file, then download from scratch.
    #[tracing::instrument(skip_all)]
    pub fn reset_and_redownload(&self) -> VestureResult<()> {
        if self.inner.state.get().is_busy() {
            return Err(VestureError::precondition(
                "another model operation is in progress",
            ));
        }
        self.evict();
        if let Err(err) = self.inner.manifest.clear(&self.inner.root) {
            self.fail(&err);
            return Err(err);
        }
        self.update_progress(|p| {
            *p = DownloadProgress {
                entries_total: p.entries_total,
                ..DownloadProgress::default()
            };
        });
        self.inner.state.set(AssetState::Absent);
        self.download()
    }

    /// Free memory: the engine first, auxiliary models once the engine is gone.
    pub fn on_memory_pressure(&self) -> PressureOutcome {
        if self.inner.writers.load(Ordering::SeqCst) > 0 {
            self.inner.eviction_pending.store(true, Ordering::SeqCst);
            tracing::warn!("memory pressure during output write; eviction deferred");
            return PressureOutcome::Deferred;
        }
        self.relieve_pressure()
    }

    /// Mark a generation as writing its final output. Eviction is deferred until every guard is
    /// dropped.
    pub fn begin_output_write(&self) -> OutputWriteGuard {
        self.inner.writers.fetch_add(1, Ordering::SeqCst);
        OutputWriteGuard {
            manager: self.clone(),
        }
    }

    pub fn eviction_pending(&self) -> bool {
        self.inner.eviction_pending.load(Ordering::SeqCst)
    }

    fn relieve_pressure(&self) -> PressureOutcome {
        if self.evict_engine() {
            tracing::info!("engine evicted under memory pressure");
            return PressureOutcome::EvictedEngine;
        }
        match self.evict_auxiliary() {
            0 => PressureOutcome::Nothing,
            n => PressureOutcome::EvictedAuxiliary(n),
        }
    }

    /// Drop the engine, or stop an in-progress operation from keeping the one it loads.
    fn evict_engine(&self) -> bool {
        let inner = &self.inner;
        let mut slot = lock(&inner.engine);
        let had = slot.take().is_some();
        inner
            .state
            .transition(|s| *s == AssetState::Ready, AssetState::Absent);
        let busy = inner.state.get().is_busy();
        if busy {
            inner.evict_requested.store(true, Ordering::SeqCst);
        }
        drop(slot);
        had || busy
    }

    fn evict_auxiliary(&self) -> usize {
        let models = std::mem::take(&mut *lock(&self.inner.auxiliary));
        for m in &models {
            tracing::debug!(name = m.name(), "auxiliary model evicted");
            m.evict();
        }
        models.len()
    }

    fn update_progress(&self, f: impl FnOnce(&mut DownloadProgress)) -> DownloadProgress {
        let mut p = lock(&self.inner.progress);
        f(&mut p);
        p.clone()
    }

    fn fail(&self, err: &VestureError) {
        tracing::error!(%err, "model operation failed");
        self.inner.state.set(AssetState::Error(err.to_string()));
    }
}

/// Held while a generation writes its final output.
#[derive(Debug)]
pub struct OutputWriteGuard {
    manager: ModelManager,
}

impl Drop for OutputWriteGuard {
    fn drop(&mut self) {
        let inner = &self.manager.inner;
        if inner.writers.fetch_sub(1, Ordering::SeqCst) == 1
            && inner.eviction_pending.swap(false, Ordering::SeqCst)
        {
            let outcome = self.manager.relieve_pressure();
            tracing::info!(?outcome, "deferred eviction ran");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
#[path = "../../tests/unit/assets/manager.rs"]
mod tests;
