use super::*;

fn labels(pairs: &[(&str, f32)]) -> Vec<LabelScore> {
    pairs.iter().map(|&(l, c)| LabelScore::new(l, c)).collect()
}

#[test]
fn parka_dominates_outerwear_and_reads_cold() {
    let out = classify_labels(&labels(&[("parka", 0.8), ("sneaker", 0.3)]));
    assert_eq!(out.kind, GarmentType::Outerwear);
    assert!((out.confidence - 0.8).abs() < 1e-6);
    assert!(out.thermal_index < 0.2, "thermal {}", out.thermal_index);
}

#[test]
fn confidences_accumulate_per_type() {
    let out = classify_labels(&labels(&[
        ("jean", 0.1),
        ("jeans", 0.3),
        ("miniskirt, mini", 0.05),
        ("skirt", 0.2),
        ("cardigan", 0.4),
    ]));
    assert_eq!(out.kind, GarmentType::Bottom);
}

#[test]
fn words_do_not_match_inside_other_words() {
    let out = classify_labels(&labels(&[("laptop, laptop computer", 0.9)]));
    assert_eq!(out.kind, GarmentType::Top);
    assert_eq!(out.confidence, 0.0);
    assert_eq!(out.thermal_index, NEUTRAL_THERMAL_INDEX);
}

#[test]
fn low_confidence_falls_back_to_top() {
    let out = classify_labels(&labels(&[("sandal", 0.1)]));
    assert_eq!(out.kind, GarmentType::Top);
    assert!((out.confidence - 0.1).abs() < 1e-6);
}

#[test]
fn plurals_and_phrases_match() {
    let out = classify_labels(&labels(&[("running shoes", 0.6)]));
    assert_eq!(out.kind, GarmentType::Shoes);
    assert_eq!(out.tags[0], StyleTag::Sport);
}

#[test]
fn hot_weather_labels_push_thermal_up() {
    let out = classify_labels(&labels(&[("tank top", 0.5), ("shorts", 0.4)]));
    assert!(out.thermal_index > 0.9);
}

#[test]
fn style_ties_default_to_casual() {
    // "suit" is Formal only, "gown" is Elegant only: equal scores tie.
    let out = classify_labels(&labels(&[("suit", 0.4), ("gown", 0.4)]));
    assert_eq!(out.tags[0], StyleTag::Casual);
    assert!(out.tags.contains(&StyleTag::Formal));
    assert!(out.tags.contains(&StyleTag::Elegant));
}

#[test]
fn no_style_match_is_casual() {
    let out = classify_labels(&labels(&[("parka", 0.8)]));
    assert_eq!(out.tags, vec![StyleTag::Casual]);
}

#[test]
fn unique_style_leader_wins() {
    let out = classify_labels(&labels(&[("blazer", 0.7), ("jeans", 0.2)]));
    assert_eq!(out.tags, vec![StyleTag::Formal]);
}

#[test]
fn invalid_confidences_are_ignored() {
    let out = classify_labels(&labels(&[("parka", f32::NAN), ("jeans", -1.0)]));
    assert_eq!(out.kind, GarmentType::Top);
    assert_eq!(out.confidence, 0.0);
}
