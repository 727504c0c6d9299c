use super::*;

#[test]
fn empty_document_uses_defaults() {
    let cfg: TryOnConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg, TryOnConfig::default());
    cfg.validate().unwrap();
    assert_eq!(cfg.preview.min_display(), Duration::from_millis(600));
    assert_eq!(cfg.generation.resolution, 512);
}

#[test]
fn partial_sections_merge_with_defaults() {
    let cfg: TryOnConfig =
        serde_json::from_str(r#"{ "generation": { "steps": 30, "seed": 7 } }"#).unwrap();
    assert_eq!(cfg.generation.steps, 30);
    assert_eq!(cfg.generation.seed, Some(7));
    assert_eq!(cfg.generation.guidance_scale, 7.5);
}

#[test]
fn unknown_fields_are_rejected() {
    let err = serde_json::from_str::<TryOnConfig>(r#"{ "preview": { "fps": 3 } }"#);
    assert!(err.is_err());
}

#[test]
fn validate_rejects_out_of_range_values() {
    let mut cfg = TryOnConfig::default();
    cfg.generation.steps = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = TryOnConfig::default();
    cfg.generation.resolution = 500;
    assert!(cfg.validate().is_err());

    let mut cfg = TryOnConfig::default();
    cfg.preview.garment_opacity = 1.5;
    assert!(cfg.validate().is_err());

    let mut cfg = TryOnConfig::default();
    cfg.vision.keypoint_threshold = -0.1;
    assert!(cfg.validate().is_err());
}

#[test]
fn load_reads_json_file() {
    let dir = std::env::temp_dir().join(format!("vesture_config_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("cfg.json");
    std::fs::write(&path, r#"{ "blend": { "feather_radius": 12 } }"#).unwrap();

    let cfg = TryOnConfig::load(&path).unwrap();
    assert_eq!(cfg.blend.feather_radius, 12);
    assert!(TryOnConfig::load(&dir.join("missing.json")).is_err());

    std::fs::remove_dir_all(&dir).ok();
}
