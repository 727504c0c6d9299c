use super::*;

#[test]
fn over_opacity_0_is_noop() {
    let dst = [1, 2, 3, 4];
    let src = [200, 200, 200, 200];
    assert_eq!(over(dst, src, 0.0), dst);
}

#[test]
fn over_src_alpha_0_is_noop() {
    let dst = [10, 20, 30, 40];
    let src = [255, 255, 255, 0];
    assert_eq!(over(dst, src, 1.0), dst);
}

#[test]
fn over_src_opaque_replaces_dst() {
    let dst = [0, 0, 0, 255];
    let src = [255, 0, 0, 255];
    assert_eq!(over(dst, src, 1.0), src);
}

#[test]
fn over_keeps_opaque_dst_opaque() {
    let out = over([40, 50, 60, 255], [100, 0, 0, 128], 0.8);
    assert_eq!(out[3], 255);
}

#[test]
fn crossfade_endpoints() {
    let a = [10, 20, 30, 40];
    let b = [200, 210, 220, 230];
    assert_eq!(crossfade(a, b, 0), a);
    assert_eq!(crossfade(a, b, 255), b);
}

#[test]
fn multiply_by_white_is_identity() {
    let px = [12, 200, 90, 255];
    assert_eq!(multiply(px, [255, 255, 255]), px);
    assert_eq!(multiply(px, [0, 0, 0]), [0, 0, 0, 255]);
}

#[test]
fn premultiply_round_trips_opaque_and_clears_transparent() {
    let px = [12, 34, 56, 255];
    assert_eq!(unpremultiply(premultiply(px)), px);
    assert_eq!(unpremultiply(premultiply([90, 90, 90, 0])), [0, 0, 0, 0]);
    let half = premultiply([200, 100, 0, 128]);
    assert_eq!(half, [100, 50, 0, 128]);
}

#[test]
fn mix_with_mask_copies_base_where_mask_is_zero() {
    let base = RgbaImage::from_pixel(3, 1, image::Rgba([10, 20, 30, 255]));
    let top = RgbaImage::from_pixel(3, 1, image::Rgba([250, 240, 230, 255]));
    let alpha = Mask::from_raw(3, 1, vec![0, 128, 255]).unwrap();
    let out = mix_with_mask(&base, &top, &alpha).unwrap();
    assert_eq!(out.get_pixel(0, 0), base.get_pixel(0, 0));
    assert_eq!(out.get_pixel(2, 0), top.get_pixel(2, 0));
    let mid = out.get_pixel(1, 0).0;
    assert!(mid[0] > 10 && mid[0] < 250);
}

#[test]
fn mix_with_mask_rejects_size_mismatch() {
    let base = RgbaImage::new(2, 2);
    let top = RgbaImage::new(2, 3);
    assert!(mix_with_mask(&base, &top, &Mask::new(2, 2)).is_err());
}
