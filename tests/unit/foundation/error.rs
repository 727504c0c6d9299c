use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        VestureError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        VestureError::transport("x")
            .to_string()
            .contains("transport error:")
    );
    assert!(VestureError::asset("x").to_string().contains("asset error:"));
    assert!(
        VestureError::inference("x")
            .to_string()
            .contains("inference error:")
    );
    assert!(
        VestureError::precondition("x")
            .to_string()
            .contains("precondition failed:")
    );
}

#[test]
fn engine_not_available_is_a_precondition() {
    let err = VestureError::engine_not_available();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.to_string().contains("engine not available"));
}

#[test]
fn http_status_keeps_code() {
    let err = VestureError::http_status(500, "https://host/file.bin");
    assert_eq!(err.kind(), ErrorKind::Transport);
    let VestureError::Transport { status, detail } = err else {
        panic!("expected transport error");
    };
    assert_eq!(status, Some(500));
    assert!(detail.contains("500"));
}

#[test]
fn io_errors_are_asset_errors() {
    let err: VestureError = std::io::Error::other("disk gone").into();
    assert_eq!(err.kind(), ErrorKind::Asset);
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = VestureError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
    assert_eq!(err.kind(), ErrorKind::Internal);
}
