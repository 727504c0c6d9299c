use super::*;

#[test]
fn low_confidence_joints_are_absent() {
    let set = KeypointSet::new()
        .with(Joint::Neck, 10.0, 20.0, 0.9)
        .with(Joint::LeftHip, 5.0, 50.0, 0.2)
        .with(Joint::RightHip, 15.0, 50.0, 0.25);
    assert!(set.get(Joint::Neck).is_some());
    assert!(set.get(Joint::LeftHip).is_none());
    assert!(set.get(Joint::RightHip).is_some());
    assert!(set.raw(Joint::LeftHip).is_some());
    assert_eq!(set.present().count(), 2);
}

#[test]
fn threshold_is_configurable() {
    let set = KeypointSet::new()
        .with_threshold(0.5)
        .with(Joint::Neck, 1.0, 1.0, 0.4);
    assert!(set.get(Joint::Neck).is_none());
    assert!(set.is_empty());
}

#[test]
fn aggregates_over_confident_joints() {
    let set = KeypointSet::new()
        .with(Joint::LeftAnkle, 10.0, 90.0, 0.8)
        .with(Joint::RightAnkle, 30.0, 94.0, 0.8)
        .with(Joint::LeftKnee, 0.0, 0.0, 0.1);
    assert_eq!(set.mean_y(&Joint::ANKLES), Some(92.0));
    assert_eq!(set.max_y(&Joint::ANKLES), Some(94.0));
    assert_eq!(set.min_y(&Joint::KNEES), None);
    assert_eq!(
        set.bounds(&Joint::ANKLES),
        Some(Rect::new(10.0, 90.0, 30.0, 94.0))
    );
}

#[test]
fn non_finite_positions_are_absent() {
    let set = KeypointSet::new().with(Joint::Neck, f64::NAN, 1.0, 1.0);
    assert!(set.get(Joint::Neck).is_none());
}

#[test]
fn scaled_moves_positions() {
    let set = KeypointSet::new().with(Joint::Neck, 10.0, 20.0, 1.0);
    let s = set.scaled(2.0, 0.5);
    assert_eq!(s.get(Joint::Neck), Some(Point::new(20.0, 10.0)));
}
