use std::collections::HashMap;
use std::io::Write as _;
use std::sync::atomic::AtomicUsize;

use image::RgbaImage;

use super::*;
use crate::assets::transport::TransferStream;
use crate::foundation::error::ErrorKind;
use crate::generation::engine::InpaintRequest;

#[derive(Default)]
struct MemoryTransport {
    files: HashMap<String, (u16, Vec<u8>)>,
    calls: Mutex<Vec<String>>,
}

impl MemoryTransport {
    fn serve(mut self, url: &str, status: u16, body: &[u8]) -> Self {
        self.files.insert(url.to_string(), (status, body.to_vec()));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for MemoryTransport {
    fn open(&self, url: &str, _offset: u64) -> VestureResult<TransferStream> {
        self.calls.lock().unwrap().push(url.to_string());
        let (status, body) = self
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| VestureError::transport(format!("no route to {url}")))?;
        Ok(TransferStream {
            status,
            content_length: Some(body.len() as u64),
            body: Box::new(std::io::Cursor::new(body)),
        })
    }
}

struct EchoEngine;

impl InpaintEngine for EchoEngine {
    fn inpaint(
        &self,
        request: &InpaintRequest,
        progress: &dyn Fn(u32, u32),
    ) -> VestureResult<Vec<RgbaImage>> {
        progress(request.steps, request.steps);
        Ok(vec![request.image.clone()])
    }
}

#[derive(Default)]
struct FakeLoader {
    fail: bool,
    loads: AtomicUsize,
}

impl EngineLoader for FakeLoader {
    fn load(&self, _root: &Path, _manifest: &Manifest) -> VestureResult<Arc<dyn InpaintEngine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VestureError::asset("unet weights are corrupt"));
        }
        Ok(Arc::new(EchoEngine))
    }
}

struct Cache {
    evicted: AtomicBool,
}

impl Evictable for Cache {
    fn name(&self) -> &str {
        "segmenter"
    }

    fn evict(&self) {
        self.evicted.store(true, Ordering::SeqCst);
    }
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vesture_manager_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn three_files() -> Manifest {
    Manifest::new(vec![
        ManifestEntry::new("one", "mem://one", "one.bin"),
        ManifestEntry::new("two", "mem://two", "two.bin"),
        ManifestEntry::new("three", "mem://three", "three.bin"),
    ])
    .unwrap()
}

fn healthy_transport() -> MemoryTransport {
    MemoryTransport::default()
        .serve("mem://one", 200, b"1111")
        .serve("mem://two", 200, b"2222")
        .serve("mem://three", 200, b"3333")
}

fn manager(
    root: &Path,
    manifest: Manifest,
    transport: Arc<MemoryTransport>,
    loader: Arc<FakeLoader>,
) -> ModelManager {
    let config = AssetConfig {
        model_root: root.to_path_buf(),
        ..AssetConfig::default()
    };
    ModelManager::new(&config, manifest, transport, loader)
}

fn ready_manager(name: &str) -> ModelManager {
    let root = scratch(name);
    let m = manager(
        &root,
        three_files(),
        Arc::new(healthy_transport()),
        Arc::new(FakeLoader::default()),
    );
    m.download().unwrap();
    assert_eq!(m.state(), AssetState::Ready);
    m
}

#[test]
fn failing_file_stops_the_download() {
    let root = scratch("scenario_c");
    let transport = Arc::new(
        MemoryTransport::default()
            .serve("mem://one", 200, b"1111")
            .serve("mem://two", 500, b"")
            .serve("mem://three", 200, b"3333"),
    );
    let loader = Arc::new(FakeLoader::default());
    let m = manager(&root, three_files(), transport.clone(), loader.clone());

    let err = m.download().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(matches!(m.state(), AssetState::Error(_)));
    assert!((m.progress().fraction - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(m.progress().current_entry.as_deref(), Some("two"));
    assert_eq!(transport.calls(), vec!["mem://one", "mem://two"]);
    assert!(!m.manifest().is_complete(&root));
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    assert_eq!(
        m.acquire_engine().err().unwrap().kind(),
        ErrorKind::Precondition
    );
}

#[test]
fn download_reaches_ready_and_skips_present_files() {
    let root = scratch("full");
    std::fs::write(root.join("one.bin"), b"local").unwrap();
    let transport = Arc::new(healthy_transport());
    let m = manager(
        &root,
        three_files(),
        transport.clone(),
        Arc::new(FakeLoader::default()),
    );
    let states = m.subscribe();

    m.download().unwrap();
    assert_eq!(m.state(), AssetState::Ready);
    assert_eq!(transport.calls(), vec!["mem://two", "mem://three"]);
    assert_eq!(std::fs::read(root.join("one.bin")).unwrap(), b"local");
    assert_eq!(m.progress().fraction, 1.0);
    assert!(m.acquire_engine().is_ok());

    let seen: Vec<AssetState> = states.try_iter().collect();
    assert!(matches!(seen.first(), Some(AssetState::Downloading(_))));
    assert!(seen.contains(&AssetState::Loading));
    assert_eq!(seen.last(), Some(&AssetState::Ready));
}

#[test]
fn availability_requires_every_file_nonempty() {
    let root = scratch("availability");
    let m = manager(
        &root,
        three_files(),
        Arc::new(MemoryTransport::default()),
        Arc::new(FakeLoader::default()),
    );
    assert!(!m.check_availability());
    assert_eq!(m.state(), AssetState::Absent);

    std::fs::write(root.join("one.bin"), b"1").unwrap();
    std::fs::write(root.join("two.bin"), b"").unwrap();
    std::fs::write(root.join("three.bin.part"), b"33").unwrap();
    assert!(!m.check_availability());

    std::fs::write(root.join("two.bin"), b"2").unwrap();
    std::fs::write(root.join("three.bin"), b"3").unwrap();
    assert!(m.check_availability());
    let settled = m.wait_until(Duration::from_secs(5), |s| !s.is_busy());
    assert_eq!(settled, Some(AssetState::Ready));
}

#[test]
fn load_failure_is_an_asset_error() {
    let root = scratch("load_fail");
    let loader = Arc::new(FakeLoader {
        fail: true,
        ..FakeLoader::default()
    });
    let m = manager(
        &root,
        three_files(),
        Arc::new(healthy_transport()),
        loader,
    );
    let err = m.download().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Asset);
    assert!(matches!(m.state(), AssetState::Error(d) if d.contains("corrupt")));
    assert!(m.acquire_engine().is_err());
}

#[test]
fn load_without_files_reports_missing_ids() {
    let root = scratch("load_missing");
    let m = manager(
        &root,
        three_files(),
        Arc::new(MemoryTransport::default()),
        Arc::new(FakeLoader::default()),
    );
    let err = m.load().unwrap_err();
    assert!(err.to_string().contains("one, two, three"));
    assert!(matches!(m.state(), AssetState::Error(_)));
}

#[test]
fn archives_are_extracted_after_download() {
    let root = scratch("archive");
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    zip.start_file("vocab.json", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"{\"a\":0}").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let manifest = Manifest::new(vec![
        ManifestEntry::new("weights", "mem://w", "w.bin"),
        ManifestEntry::new("tokenizer", "mem://t", "tokenizer.zip").with_archive(ArchiveKind::Zip),
    ])
    .unwrap();
    let transport = Arc::new(
        MemoryTransport::default()
            .serve("mem://w", 200, b"w")
            .serve("mem://t", 200, &bytes),
    );
    let m = manager(&root, manifest, transport, Arc::new(FakeLoader::default()));
    let states = m.subscribe();
    m.download().unwrap();

    assert!(root.join("tokenizer/vocab.json").is_file());
    assert!(root.join("tokenizer.zip").is_file());
    let seen: Vec<AssetState> = states.try_iter().collect();
    assert!(seen.contains(&AssetState::Extracting {
        entry: "tokenizer".to_string()
    }));
}

#[test]
fn corrupt_archive_is_removed() {
    let root = scratch("bad_archive");
    let manifest = Manifest::new(vec![
        ManifestEntry::new("tokenizer", "mem://t", "tokenizer.zip").with_archive(ArchiveKind::Zip),
    ])
    .unwrap();
    let transport = Arc::new(MemoryTransport::default().serve("mem://t", 200, b"garbage"));
    let m = manager(&root, manifest, transport, Arc::new(FakeLoader::default()));
    let err = m.download().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Asset);
    assert!(!root.join("tokenizer.zip").exists());
    assert!(!m.check_availability());
}

#[test]
fn reset_passes_through_absent() {
    let m = ready_manager("reset");
    let states = m.subscribe();
    m.reset_and_redownload().unwrap();

    let seen: Vec<AssetState> = states.try_iter().collect();
    let absent = seen.iter().position(|s| *s == AssetState::Absent).unwrap();
    let downloading = seen
        .iter()
        .position(|s| matches!(s, AssetState::Downloading(_)))
        .unwrap();
    assert!(absent < downloading);
    assert_eq!(seen.last(), Some(&AssetState::Ready));
}

#[test]
fn evicted_engine_stays_usable_for_holders() {
    let m = ready_manager("evict");
    let held = m.acquire_engine().unwrap();
    m.evict();
    assert_eq!(m.state(), AssetState::Absent);
    assert!(m.acquire_engine().is_err());

    let request = InpaintRequest {
        image: RgbaImage::new(8, 8),
        mask: image::GrayImage::new(8, 8),
        prompt: String::new(),
        negative_prompt: String::new(),
        steps: 1,
        guidance_scale: 7.5,
        seed: 0,
    };
    assert_eq!(held.inpaint(&request, &|_, _| {}).unwrap().len(), 1);
}

#[test]
fn memory_pressure_defers_while_writing_output() {
    let m = ready_manager("pressure");
    let cache = Arc::new(Cache {
        evicted: AtomicBool::new(false),
    });
    m.register_auxiliary(cache.clone());

    let guard = m.begin_output_write();
    assert_eq!(m.on_memory_pressure(), PressureOutcome::Deferred);
    assert!(m.eviction_pending());
    assert!(m.acquire_engine().is_ok());

    drop(guard);
    assert!(!m.eviction_pending());
    assert_eq!(m.state(), AssetState::Absent);
    assert!(!cache.evicted.load(Ordering::SeqCst));

    assert_eq!(m.on_memory_pressure(), PressureOutcome::EvictedAuxiliary(1));
    assert!(cache.evicted.load(Ordering::SeqCst));
    assert_eq!(m.on_memory_pressure(), PressureOutcome::Nothing);
}

/// Blocks inside `load` until the test releases it.
struct GatedLoader {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl EngineLoader for GatedLoader {
    fn load(&self, _root: &Path, _manifest: &Manifest) -> VestureResult<Arc<dyn InpaintEngine>> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        Ok(Arc::new(EchoEngine))
    }
}

fn gated_manager(name: &str) -> (ModelManager, mpsc::Receiver<()>, mpsc::Sender<()>) {
    let root = scratch(name);
    for (file, body) in [("one.bin", "1"), ("two.bin", "2"), ("three.bin", "3")] {
        std::fs::write(root.join(file), body).unwrap();
    }
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let loader = Arc::new(GatedLoader {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let config = AssetConfig {
        model_root: root,
        ..AssetConfig::default()
    };
    let m = ModelManager::new(
        &config,
        three_files(),
        Arc::new(MemoryTransport::default()),
        loader,
    );
    (m, entered_rx, release_tx)
}

#[test]
fn memory_pressure_during_load_discards_the_loaded_engine() {
    let (m, entered, release) = gated_manager("pressure_loading");
    assert!(m.check_availability());
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(m.state(), AssetState::Loading);

    assert_eq!(m.on_memory_pressure(), PressureOutcome::EvictedEngine);
    release.send(()).unwrap();

    let settled = m
        .wait_until(Duration::from_secs(5), |s| !s.is_busy())
        .unwrap();
    assert_eq!(settled, AssetState::Absent);
    assert!(m.acquire_engine().is_err());
}

#[test]
fn evict_during_explicit_load_reports_and_keeps_nothing() {
    let (m, entered, release) = gated_manager("evict_loading");
    let worker = {
        let m = m.clone();
        std::thread::spawn(move || m.load())
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    m.evict();
    release.send(()).unwrap();

    let err = worker.join().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(m.state(), AssetState::Absent);
    assert!(m.acquire_engine().is_err());

    // A later load is unaffected by the earlier eviction.
    let again = {
        let m = m.clone();
        std::thread::spawn(move || m.load())
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();
    release.send(()).unwrap();
    again.join().unwrap().unwrap();
    assert_eq!(m.state(), AssetState::Ready);
    assert!(m.acquire_engine().is_ok());
}
