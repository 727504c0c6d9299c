use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use vesture::foundation::config::TryOnConfig;
use vesture::garment::{GarmentRecord, SampleGarment, StoredGarment};
use vesture::vision::classify::{LabelScore, classify_labels};

#[derive(Parser, Debug)]
#[command(name = "vesture", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Pipeline configuration JSON. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report which model files are present.
    Status(ModelArgs),
    /// Download every missing model file.
    Fetch(ModelArgs),
    /// Render a fast preview of an outfit on a photo.
    Preview(PreviewArgs),
    /// Score classifier labels into a garment category.
    Classify(ClassifyArgs),
}

#[derive(Parser, Debug)]
struct ModelArgs {
    /// Model root; overrides `assets.model_root` from the configuration.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Manifest JSON. Without it the stock inpainting manifest is used.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Base URL for the stock manifest.
    #[arg(long, default_value = "https://models.vesture.dev/sd-inpaint")]
    base_url: String,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Person photo.
    #[arg(long)]
    photo: PathBuf,

    /// Outfit JSON: a list of garments.
    #[arg(long)]
    outfit: PathBuf,

    /// Keypoint JSON from a pose estimator, in photo pixels.
    #[arg(long)]
    keypoints: Option<PathBuf>,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct ClassifyArgs {
    /// `label=confidence` pairs, e.g. `parka=0.8`.
    #[arg(required = true)]
    labels: Vec<String>,
}

/// Garment as written in an outfit file. Stored garments name an image file relative to the
/// outfit file.
#[derive(Deserialize, Debug)]
#[serde(tag = "source", rename_all = "snake_case")]
enum GarmentEntry {
    Sample(SampleGarment),
    Stored {
        id: String,
        name: String,
        kind: vesture::GarmentType,
        image: PathBuf,
        #[serde(default = "neutral_thermal")]
        thermal_index: f32,
        #[serde(default)]
        style_tags: Vec<String>,
    },
}

fn neutral_thermal() -> f32 {
    vesture::vision::classify::NEUTRAL_THERMAL_INDEX
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = match &cli.config {
        Some(path) => TryOnConfig::load(path)?,
        None => TryOnConfig::default(),
    };
    match cli.cmd {
        Command::Status(args) => cmd_status(&config, args),
        Command::Fetch(args) => cmd_fetch(&config, args),
        Command::Preview(args) => cmd_preview(&config, args),
        Command::Classify(args) => cmd_classify(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> anyhow::Result<T> {
    let f = File::open(path).with_context(|| format!("open {what} '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parse {what} JSON"))
}

fn model_setup(
    config: &TryOnConfig,
    args: &ModelArgs,
) -> anyhow::Result<(vesture::Manifest, PathBuf)> {
    let manifest = match &args.manifest {
        Some(path) => vesture::Manifest::load(path)?,
        None => vesture::Manifest::stable_diffusion_inpaint(&args.base_url),
    };
    let root = args
        .root
        .clone()
        .unwrap_or_else(|| config.assets.model_root.clone());
    Ok((manifest, root))
}

fn cmd_status(config: &TryOnConfig, args: ModelArgs) -> anyhow::Result<()> {
    let (manifest, root) = model_setup(config, &args)?;
    for e in &manifest.entries {
        let status = if e.is_present(&root) {
            "present"
        } else if e.partial_path(&root).exists() {
            "partial"
        } else {
            "missing"
        };
        eprintln!("  {:<14} {:<8} {}", e.id, status, e.relative_path);
    }
    let complete = manifest.is_complete(&root);
    eprintln!(
        "{}: {}",
        root.display(),
        if complete { "complete" } else { "incomplete" }
    );
    Ok(())
}

#[cfg(feature = "http")]
fn cmd_fetch(config: &TryOnConfig, args: ModelArgs) -> anyhow::Result<()> {
    use vesture::assets::download::Downloader;
    use vesture::assets::extract::extract_zip;

    let (manifest, root) = model_setup(config, &args)?;
    let transport = vesture::HttpTransport::new(&config.assets)?;
    let downloader = Downloader::new(&transport, &root);
    let weights = manifest.weights();
    let mut base = 0.0;
    for (entry, weight) in manifest.entries.iter().zip(weights) {
        if !entry.is_present(&root) {
            downloader.fetch(entry, &mut |done, total| {
                let file = total.map_or(0.0, |t| done as f64 / t.max(1) as f64);
                eprint!(
                    "\r{:>5.1}%  {:<14} {:>12} bytes",
                    (base + weight * file) * 100.0,
                    entry.id,
                    done
                );
            })?;
            eprintln!();
        }
        if let Some(dir) = entry.extract_dir(&root)
            && !dir.is_dir()
        {
            extract_zip(&entry.local_path(&root), &dir)?;
            eprintln!("extracted {}", dir.display());
        }
        base += weight;
    }
    eprintln!("{}: complete", root.display());
    Ok(())
}

#[cfg(not(feature = "http"))]
fn cmd_fetch(_config: &TryOnConfig, _args: ModelArgs) -> anyhow::Result<()> {
    anyhow::bail!("this build has no HTTP transport; rebuild with the `http` feature")
}

fn cmd_preview(config: &TryOnConfig, args: PreviewArgs) -> anyhow::Result<()> {
    let photo = image::open(&args.photo)
        .with_context(|| format!("open photo '{}'", args.photo.display()))?
        .to_rgba8();
    let entries: Vec<GarmentEntry> = read_json(&args.outfit, "outfit")?;
    let outfit_dir = args.outfit.parent().unwrap_or_else(|| Path::new("."));

    let mut outfit = vesture::OutfitSelection::new();
    for entry in entries {
        let garment = match entry {
            GarmentEntry::Sample(s) => vesture::GarmentReference::Sample(s),
            GarmentEntry::Stored {
                id,
                name,
                kind,
                image,
                thermal_index,
                style_tags,
            } => {
                let path = outfit_dir.join(image);
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("read garment image '{}'", path.display()))?;
                let record = GarmentRecord {
                    id,
                    name,
                    kind,
                    thermal_index,
                    style_tags,
                    image_bytes: bytes,
                    thumbnail_bytes: None,
                    embedding: None,
                    created_at: 0,
                    times_worn: 0,
                };
                vesture::GarmentReference::Stored(StoredGarment::from_record(&record)?)
            }
        };
        if let Some(rejected) = outfit.wear(garment) {
            eprintln!(
                "skipping '{}': {} has no body slot",
                rejected.name(),
                rejected.kind().as_str()
            );
        }
    }

    let keypoints: Option<vesture::KeypointSet> = match &args.keypoints {
        Some(path) => Some(read_json(path, "keypoints")?),
        None => None,
    };

    let compositor = vesture::FastCompositor::new(config.preview.clone());
    let out = compositor.compose(&photo, &outfit, None, keypoints.as_ref())?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    out.save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_classify(args: ClassifyArgs) -> anyhow::Result<()> {
    let labels = args
        .labels
        .iter()
        .map(|pair| parse_label(pair))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let c = classify_labels(&labels);
    let tags: Vec<String> = c.tags.iter().map(ToString::to_string).collect();
    println!("type:       {}", c.kind.as_str());
    println!("confidence: {:.2}", c.confidence);
    println!("thermal:    {:.2}", c.thermal_index);
    println!("tags:       {}", tags.join(", "));
    Ok(())
}

fn parse_label(pair: &str) -> anyhow::Result<LabelScore> {
    let (label, conf) = pair
        .rsplit_once('=')
        .with_context(|| format!("expected label=confidence, got '{pair}'"))?;
    let confidence: f32 = conf
        .trim()
        .parse()
        .with_context(|| format!("bad confidence in '{pair}'"))?;
    Ok(LabelScore::new(label.trim(), confidence))
}
