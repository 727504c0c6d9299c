use super::*;

#[test]
fn radius_0_is_identity() {
    let m = Mask::from_raw(2, 2, vec![1, 2, 3, 4]).unwrap();
    assert_eq!(blur_mask(&m, 0, None).unwrap(), m);
}

#[test]
fn constant_mask_is_identity() {
    let m = Mask::filled(7, 5, 200);
    assert_eq!(blur_mask(&m, 3, Some(2.0)).unwrap(), m);
}

#[test]
fn kernel_sums_to_one_in_q16() {
    for radius in [1, 4, 13] {
        let k = gaussian_kernel_q16(radius, radius as f32 / 2.0).unwrap();
        assert_eq!(k.len(), (2 * radius + 1) as usize);
        assert_eq!(k.iter().sum::<u32>(), 1 << 16);
    }
}

#[test]
fn invalid_sigma_is_rejected() {
    assert!(gaussian_kernel_q16(2, 0.0).is_err());
    assert!(gaussian_kernel_q16(2, f32::NAN).is_err());
}

#[test]
fn single_pixel_spreads_and_keeps_energy() {
    let mut m = Mask::new(9, 9);
    m.set(4, 4, 255);
    let out = blur_mask(&m, 2, Some(1.2)).unwrap();
    let nonzero = out.as_raw().iter().filter(|&&v| v != 0).count();
    assert!(nonzero > 1);
    let sum: u32 = out.as_raw().iter().map(|&v| u32::from(v)).sum();
    assert!((sum as i32 - 255).abs() <= 6);
}

#[test]
fn hard_edge_becomes_a_ramp() {
    let mut m = Mask::new(40, 1);
    m.fill_rect(crate::foundation::core::Rect::new(20.0, 0.0, 40.0, 1.0), 255);
    let out = blur_mask(&m, 6, None).unwrap();
    assert_eq!(out.get(0, 0), 0);
    assert_eq!(out.get(39, 0), 255);
    let edge = out.get(20, 0);
    assert!(edge > 64 && edge < 192, "edge {edge}");
}
