use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use image::Rgba;

use super::*;
use crate::assets::manager::AssetState;
use crate::assets::manifest::{Manifest, ManifestEntry};
use crate::assets::transport::{TransferStream, Transport};
use crate::foundation::config::AssetConfig;
use crate::foundation::error::ErrorKind;
use crate::garment::{GarmentId, GarmentReference, GarmentType, Gradient, SampleGarment};
use crate::generation::engine::{EngineLoader, InpaintEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Solid,
    Empty,
    Fail,
}

struct ScriptedEngine {
    mode: Mutex<Mode>,
    seen: Mutex<Vec<(u32, u32, u64, String)>>,
    evict_during_run: OnceLock<ModelManager>,
    /// Issues another generation from inside a run, after the eviction.
    generate_during_run: OnceLock<Generator>,
    nested: Mutex<Option<VestureResult<RgbaImage>>>,
}

impl ScriptedEngine {
    fn new() -> Self {
        Self {
            mode: Mutex::new(Mode::Solid),
            seen: Mutex::new(Vec::new()),
            evict_during_run: OnceLock::new(),
            generate_during_run: OnceLock::new(),
            nested: Mutex::new(None),
        }
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }
}

impl InpaintEngine for ScriptedEngine {
    fn inpaint(
        &self,
        request: &InpaintRequest,
        progress: &dyn Fn(u32, u32),
    ) -> VestureResult<Vec<RgbaImage>> {
        self.seen.lock().unwrap().push((
            request.mask.width(),
            request.mask.height(),
            request.seed,
            request.prompt.clone(),
        ));
        if let Some(models) = self.evict_during_run.get() {
            models.evict();
        }
        if let Some(g) = self.generate_during_run.get() {
            let outfit = OutfitSelection::new().with(sample("n", "boots", GarmentType::Shoes));
            *self.nested.lock().unwrap() = Some(g.generate(&request.image, &outfit));
        }
        for step in 1..=request.steps {
            progress(step, request.steps);
        }
        let (w, h) = request.image.dimensions();
        match *self.mode.lock().unwrap() {
            Mode::Solid => Ok(vec![RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255]))]),
            Mode::Empty => Ok(Vec::new()),
            Mode::Fail => Err(VestureError::inference("unet produced NaNs")),
        }
    }
}

struct ScriptedLoader(Arc<ScriptedEngine>);

impl EngineLoader for ScriptedLoader {
    fn load(&self, _root: &Path, _manifest: &Manifest) -> VestureResult<Arc<dyn InpaintEngine>> {
        Ok(self.0.clone())
    }
}

struct Offline;

impl Transport for Offline {
    fn open(&self, url: &str, _offset: u64) -> VestureResult<TransferStream> {
        Err(VestureError::transport(format!("offline: {url}")))
    }
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vesture_generate_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn models(name: &str, engine: &Arc<ScriptedEngine>, present: bool) -> ModelManager {
    let root = scratch(name);
    if present {
        std::fs::write(root.join("model.bin"), b"weights").unwrap();
    }
    let manifest = Manifest::new(vec![ManifestEntry::new("model", "mem://model", "model.bin")])
        .unwrap();
    let config = AssetConfig {
        model_root: root,
        ..AssetConfig::default()
    };
    let m = ModelManager::new(
        &config,
        manifest,
        Arc::new(Offline),
        Arc::new(ScriptedLoader(engine.clone())),
    );
    if present {
        m.load().unwrap();
    }
    m
}

fn generator(models: ModelManager, seed: Option<u64>) -> Generator {
    let config = GenerationConfig {
        steps: 4,
        resolution: 64,
        seed,
        ..GenerationConfig::default()
    };
    Generator::new(
        models,
        VisionService::default(),
        FastCompositor::default(),
        config,
        BlendConfig::default(),
    )
}

fn sample(id: &str, name: &str, kind: GarmentType) -> GarmentReference {
    GarmentReference::Sample(SampleGarment {
        id: GarmentId::new(id),
        name: name.to_string(),
        kind,
        gradient: Gradient {
            start: [220, 220, 220],
            end: [90, 90, 90],
        },
        icon: "shirt".to_string(),
        thermal_index: 0.5,
    })
}

fn photo() -> RgbaImage {
    RgbaImage::from_fn(48, 96, |x, y| Rgba([(x * 3) as u8, (y * 2) as u8, 40, 255]))
}

#[test]
fn absent_engine_fails_immediately() {
    let engine = Arc::new(ScriptedEngine::new());
    let m = models("absent", &engine, false);
    let g = generator(m.clone(), None);
    let outfit = OutfitSelection::new()
        .with(sample("t", "linen shirt", GarmentType::Top))
        .with(sample("b", "jeans", GarmentType::Bottom))
        .with(sample("s", "loafers", GarmentType::Shoes));

    let err = g.generate(&photo(), &outfit).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.to_string().contains("engine not available"));
    assert!(matches!(g.state(), GenerationState::Error(_)));
    assert_eq!(m.state(), AssetState::Absent);
    assert!(engine.seen.lock().unwrap().is_empty());
}

#[test]
fn empty_outfit_returns_the_photo() {
    let engine = Arc::new(ScriptedEngine::new());
    let g = generator(models("empty", &engine, false), None);
    let p = photo();
    assert_eq!(g.generate(&p, &OutfitSelection::new()).unwrap(), p);
    assert!(matches!(g.state(), GenerationState::Idle));
}

#[test]
fn generated_pixels_land_only_inside_the_zone() {
    let engine = Arc::new(ScriptedEngine::new());
    let g = generator(models("zone", &engine, true), None);
    let outfit = OutfitSelection::new().with(sample("t", "linen shirt", GarmentType::Top));
    let p = photo();
    let out = g.generate_seeded(&p, &outfit, 42).unwrap();

    assert_eq!(out.dimensions(), p.dimensions());
    assert_eq!(out.get_pixel(24, 80), p.get_pixel(24, 80));
    let inside = out.get_pixel(24, 34);
    assert!(inside.0[0] >= 254 && inside.0[1] <= 1);

    let seen = engine.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    let (w, h, seed, prompt) = &seen[0];
    assert_eq!((*w, *h, *seed), (64, 64, 42));
    assert!(prompt.contains("linen shirt"));

    assert_eq!(g.progress(), GenerationProgress { step: 4, total: 4 });
    assert_eq!(g.progress().fraction(), 1.0);
    assert!(matches!(g.state(), GenerationState::Done(ref o) if o.seed == 42));
}

#[test]
fn zero_results_fail_and_keep_the_previous_output() {
    let engine = Arc::new(ScriptedEngine::new());
    let g = generator(models("zero", &engine, true), Some(7));
    let outfit = OutfitSelection::new().with(sample("b", "jeans", GarmentType::Bottom));
    g.generate(&photo(), &outfit).unwrap();
    assert_eq!(g.last_output().unwrap().seed, 7);

    engine.set_mode(Mode::Empty);
    let err = g.generate(&photo(), &outfit).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inference);
    assert!(matches!(g.state(), GenerationState::Error(_)));
    assert_eq!(g.last_output().unwrap().seed, 7);

    engine.set_mode(Mode::Fail);
    let err = g.generate(&photo(), &outfit).unwrap_err();
    assert!(err.to_string().contains("NaNs"));
}

#[test]
fn seeds_are_random_unless_configured() {
    let engine = Arc::new(ScriptedEngine::new());
    let g = generator(models("seed", &engine, true), None);
    let outfit = OutfitSelection::new().with(sample("s", "boots", GarmentType::Shoes));
    g.generate(&photo(), &outfit).unwrap();
    g.generate(&photo(), &outfit).unwrap();
    let seen = engine.seen.lock().unwrap();
    assert_ne!(seen[0].2, seen[1].2);
}

#[test]
fn eviction_mid_run_does_not_break_the_call() {
    let engine = Arc::new(ScriptedEngine::new());
    let m = models("evict", &engine, true);
    assert!(engine.evict_during_run.set(m.clone()).is_ok());
    let g = generator(m.clone(), None);
    let outfit = OutfitSelection::new().with(sample("t", "hoodie", GarmentType::Top));

    assert!(g.generate(&photo(), &outfit).is_ok());
    assert_eq!(m.state(), AssetState::Absent);
    let err = g.generate(&photo(), &outfit).unwrap_err();
    assert!(err.to_string().contains("engine not available"));
}

#[test]
fn rejected_call_leaves_the_running_generation_state_alone() {
    let engine = Arc::new(ScriptedEngine::new());
    let m = models("rejected", &engine, true);
    let g = generator(m.clone(), None);
    assert!(engine.evict_during_run.set(m.clone()).is_ok());
    assert!(engine.generate_during_run.set(g.clone()).is_ok());
    let states = g.subscribe();
    let outfit = OutfitSelection::new().with(sample("t", "hoodie", GarmentType::Top));

    assert!(g.generate(&photo(), &outfit).is_ok());

    let nested = engine.nested.lock().unwrap().take().unwrap();
    assert_eq!(nested.unwrap_err().kind(), ErrorKind::Precondition);
    let seen: Vec<GenerationState> = states.try_iter().collect();
    assert!(
        !seen.iter().any(|s| matches!(s, GenerationState::Error(_))),
        "{seen:?}"
    );
    assert!(matches!(seen.last(), Some(GenerationState::Done(_))));
}
