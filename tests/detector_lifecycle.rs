//! Lifecycle of the soft cascade detector handle against the stub library.
//!
//! Covers construction failures, idempotent release, use-after-release,
//! and synchronous versus stream-queued detection.

use std::path::PathBuf;
use std::sync::Arc;

use cuda_softcascade::stub::StubDetection;
use cuda_softcascade::{
    CascadeLibrary, DetectorParams, GpuMat, MatType, RejectionCriteria, Size, SoftCascadeDetector,
    SoftCascadeError, Stream, StubLibrary,
};
use tempfile::TempDir;

const FRAME: Size = Size {
    width: 640,
    height: 480,
};

struct Fixture {
    stub: Arc<StubLibrary>,
    lib: Arc<dyn CascadeLibrary>,
    _dir: TempDir,
    model: PathBuf,
}

fn setup() -> Fixture {
    let dir = tempfile::tempdir().expect("temp dir");
    let model = dir.path().join("model.bin");
    std::fs::write(&model, b"soft cascade model").expect("write model");
    let stub = Arc::new(StubLibrary::new());
    let lib: Arc<dyn CascadeLibrary> = stub.clone();
    Fixture {
        stub,
        lib,
        _dir: dir,
        model,
    }
}

fn frame_and_rois(lib: &Arc<dyn CascadeLibrary>) -> (GpuMat, GpuMat) {
    let frame = GpuMat::with_size(lib, FRAME, MatType::Bgr8).expect("frame");
    let rois = GpuMat::with_size(lib, FRAME, MatType::Gray8).expect("rois");
    (frame, rois)
}

#[test]
fn documented_scenario() {
    let fx = setup();
    let params = DetectorParams {
        min_scale: 0.4,
        max_scale: 5.0,
        scales: 55,
        rejection: RejectionCriteria::NoReject,
    };
    let mut detector =
        SoftCascadeDetector::with_params(&fx.lib, &fx.model, params).expect("construct");
    let (frame, rois) = frame_and_rois(&fx.lib);

    let detections = detector.detect(&frame, &rois, None).expect("detect");
    assert!(!detections.is_empty());

    detector.release();
    detector.release();

    let err = detector.detect(&frame, &rois, None).unwrap_err();
    assert!(matches!(err, SoftCascadeError::UseAfterRelease));
}

#[test]
fn handle_is_live_until_release() {
    let fx = setup();
    let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");

    assert!(!detector.is_released());
    assert!(detector.as_raw().is_some());
    assert_eq!(fx.stub.stats().live_detectors, 1);

    detector.release();
    assert!(detector.is_released());
    assert!(detector.as_raw().is_none());
    assert_eq!(fx.stub.stats().live_detectors, 0);
}

#[test]
fn release_twice_frees_once() {
    let fx = setup();
    let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");

    detector.release();
    detector.release();
    drop(detector);

    let stats = fx.stub.stats();
    assert_eq!(stats.detector_releases, 1);
    assert_eq!(stats.invalid_releases, 0);
}

#[test]
fn drop_releases_handle() {
    let fx = setup();
    {
        let _detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
        assert_eq!(fx.stub.stats().live_detectors, 1);
    }
    let stats = fx.stub.stats();
    assert_eq!(stats.live_detectors, 0);
    assert_eq!(stats.detector_releases, 1);
}

#[test]
fn detect_after_release_never_reaches_native_layer() {
    let fx = setup();
    let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
    let (frame, rois) = frame_and_rois(&fx.lib);
    detector.release();

    let mats_before = fx.stub.stats().live_mats;
    for _ in 0..3 {
        let err = detector.detect(&frame, &rois, None).unwrap_err();
        assert!(matches!(err, SoftCascadeError::UseAfterRelease));
    }

    let stats = fx.stub.stats();
    assert_eq!(stats.detect_calls, 0);
    assert_eq!(stats.live_mats, mats_before);
}

#[test]
fn nonexistent_model_is_a_construction_failure() {
    let fx = setup();
    let missing = fx.model.with_file_name("missing.bin");

    let err = SoftCascadeDetector::new(&fx.lib, &missing).unwrap_err();
    match err {
        SoftCascadeError::Construction { path, reason } => {
            assert_eq!(path, missing);
            assert!(reason.contains("unable to open"), "reason: {}", reason);
        }
        other => panic!("expected construction failure, got {:?}", other),
    }

    let stats = fx.stub.stats();
    assert_eq!(stats.live_detectors, 0);
    assert_eq!(stats.live_strings, 0);
}

#[test]
fn synchronous_detect_returns_populated_buffer() {
    let fx = setup();
    let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
    let (frame, rois) = frame_and_rois(&fx.lib);

    let out = detector.detect(&frame, &rois, None).expect("detect");
    let detections = fx.stub.detections(&out).expect("populated");
    assert_eq!(
        detections,
        vec![StubDetection {
            x: 0,
            y: 0,
            w: 640,
            h: 480,
            confidence: 1.0,
            kind: 0,
        }]
    );
}

#[test]
fn stream_detect_is_defined_only_after_wait() {
    let fx = setup();
    let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
    let (frame, rois) = frame_and_rois(&fx.lib);
    let stream = Stream::new(&fx.lib).expect("stream");

    let out = detector
        .detect(&frame, &rois, Some(&stream))
        .expect("queue detect");
    assert!(out.is_empty());
    assert!(fx.stub.detections(&out).is_none());

    stream.wait_for_completion().expect("wait");
    assert!(!out.is_empty());
    assert_eq!(fx.stub.detections(&out).map(|d| d.len()), Some(1));
}

#[test]
fn each_detect_allocates_a_fresh_buffer() {
    let fx = setup();
    let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
    let (frame, rois) = frame_and_rois(&fx.lib);

    let a = detector.detect(&frame, &rois, None).expect("first");
    let b = detector.detect(&frame, &rois, None).expect("second");
    assert_ne!(a.as_raw(), b.as_raw());

    drop(a);
    drop(b);
    drop(frame);
    drop(rois);
    drop(detector);
    let stats = fx.stub.stats();
    assert_eq!(stats.live_mats, 0);
    assert_eq!(stats.invalid_releases, 0);
}

#[test]
fn output_buffer_outlives_detector() {
    let fx = setup();
    let (frame, rois) = frame_and_rois(&fx.lib);
    let out = {
        let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
        detector.detect(&frame, &rois, None).expect("detect")
    };
    assert_eq!(fx.stub.stats().live_detectors, 0);
    assert!(fx.stub.detections(&out).is_some());
}

#[test]
fn native_failure_surfaces_as_detection_error() {
    let fx = setup();
    let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
    let (frame, rois) = frame_and_rois(&fx.lib);

    fx.stub.fail_detect(true);
    match detector.detect(&frame, &rois, None).unwrap_err() {
        SoftCascadeError::Detection(native) => assert_eq!(native.status, -215),
        other => panic!("expected detection failure, got {:?}", other),
    }
    assert!(!detector.is_released());
}

#[test]
fn detector_can_move_to_another_thread() {
    let fx = setup();
    let detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
    let lib = Arc::clone(&fx.lib);

    let released = std::thread::spawn(move || {
        let mut detector = detector;
        let (frame, rois) = frame_and_rois(&lib);
        detector.detect(&frame, &rois, None).expect("detect");
        detector.release();
        detector.is_released()
    })
    .join()
    .expect("thread");

    assert!(released);
    assert_eq!(fx.stub.stats().live_detectors, 0);
}

#[test]
fn buffers_from_another_library_are_rejected() {
    let fx = setup();
    let other = setup();
    let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
    let (frame, rois) = frame_and_rois(&fx.lib);
    let (foreign_frame, foreign_rois) = frame_and_rois(&other.lib);
    let foreign_stream = Stream::new(&other.lib).expect("stream");
    let mats_before = fx.stub.stats().live_mats;

    let cases = [
        detector.detect(&foreign_frame, &rois, None),
        detector.detect(&frame, &foreign_rois, None),
        detector.detect(&frame, &rois, Some(&foreign_stream)),
    ];
    let rejected: Vec<_> = cases
        .into_iter()
        .map(|result| match result {
            Err(SoftCascadeError::ForeignHandle(what)) => what,
            other => panic!("expected foreign handle rejection, got {:?}", other),
        })
        .collect();
    assert_eq!(rejected, ["image", "rois", "stream"]);

    assert_eq!(fx.stub.stats().detect_calls, 0);
    assert_eq!(other.stub.stats().detect_calls, 0);
    assert_eq!(fx.stub.stats().live_mats, mats_before);
}

#[test]
fn stream_wait_failure_surfaces_as_stream_error() {
    let fx = setup();
    let mut detector = SoftCascadeDetector::new(&fx.lib, &fx.model).expect("construct");
    let (frame, rois) = frame_and_rois(&fx.lib);
    let stream = Stream::new(&fx.lib).expect("stream");

    let out = detector
        .detect(&frame, &rois, Some(&stream))
        .expect("queue detect");
    fx.stub.fail_stream_wait(true);
    match stream.wait_for_completion().unwrap_err() {
        SoftCascadeError::Stream(native) => assert!(native.status < 0),
        other => panic!("expected stream failure, got {:?}", other),
    }
    assert!(fx.stub.detections(&out).is_none());
}

#[test]
fn negative_frame_size_is_an_allocation_failure() {
    let fx = setup();
    let size = Size {
        width: -1,
        height: 480,
    };
    let err = GpuMat::with_size(&fx.lib, size, MatType::Bgr8).unwrap_err();
    assert!(matches!(err, SoftCascadeError::Allocation(_)));
    assert_eq!(fx.stub.stats().live_mats, 0);
}

#[test]
fn model_path_with_nul_byte_never_reaches_native_layer() {
    let fx = setup();
    let path = PathBuf::from("models/bad\0name.bin");

    match SoftCascadeDetector::new(&fx.lib, &path).unwrap_err() {
        SoftCascadeError::Construction { path: reported, reason } => {
            assert_eq!(reported, path);
            assert!(reason.contains("NUL"), "reason: {}", reason);
        }
        other => panic!("expected construction failure, got {:?}", other),
    }

    let stats = fx.stub.stats();
    assert_eq!(stats.created_strings, 0);
    assert_eq!(stats.created_detectors, 0);
}
