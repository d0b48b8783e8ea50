//! In-process stand-in for the native library.
//!
//! `StubLibrary` implements [`CascadeLibrary`] without a GPU. Handles are
//! opaque tokens that are never dereferenced, and every create and release is
//! counted so that leaks, double frees and calls on dead handles show up in
//! [`StubStats`].
//!
//! Behaviour:
//! - detector create succeeds only for a readable, non-empty file;
//! - detect writes a detection record into the output matrix: a little-endian
//!   `i32` count followed by one 16-byte entry per detection (one entry
//!   covering the whole frame, or none for an empty frame);
//! - with a stream, that write is deferred until the stream is waited on.
//! - handles are drawn from one process-wide counter, so two instances never
//!   issue the same handle.

use std::collections::HashMap;
use std::ffi::{c_int, c_void, CStr};
use std::fs;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cuda::GpuMat;
use crate::error::NativeError;
use crate::ffi::{CascadeLibrary, Size};

/// OpenCV `StsNullPtr`.
const STATUS_BAD_HANDLE: i32 = -27;
/// OpenCV `StsError`.
const STATUS_ERROR: i32 = -2;
/// OpenCV `StsAssert`.
const STATUS_ASSERT: i32 = -215;
/// OpenCV `GpuApiCallError`.
const STATUS_GPU_API: i32 = -217;

const HANDLE_STEP: usize = 0x10;

/// Shared by every instance so handles never collide across libraries.
static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(0x1000);

/// Bytes per detection entry: x, y, w, h as `u16`, confidence `f32`, kind `i32`.
pub const DETECTION_ENTRY_BYTES: usize = 16;

/// Counters of native calls made against a [`StubLibrary`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StubStats {
    pub created_strings: usize,
    pub live_strings: usize,
    pub created_detectors: usize,
    pub live_detectors: usize,
    pub detector_releases: usize,
    pub live_mats: usize,
    pub live_streams: usize,
    pub detect_calls: usize,
    /// Releases of handles that were unknown or already released.
    pub invalid_releases: usize,
}

/// Arguments a stub detector was created with.
#[derive(Clone, Debug, PartialEq)]
pub struct CreatedParams {
    pub path: String,
    pub min_scale: f64,
    pub max_scale: f64,
    pub scales: i32,
    pub flags: i32,
}

/// Detection entry decoded from a stub output matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StubDetection {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    pub confidence: f32,
    pub kind: i32,
}

#[derive(Default)]
struct StubMat {
    width: i32,
    height: i32,
    data: Vec<u8>,
}

enum Object {
    Str(String),
    Detector(CreatedParams),
    Mat(StubMat),
    Stream(Vec<PendingWrite>),
}

struct PendingWrite {
    target: usize,
    record: Vec<u8>,
}

struct StubState {
    objects: HashMap<usize, Object>,
    stats: StubStats,
}

impl StubState {
    fn insert(&mut self, object: Object) -> NonNull<c_void> {
        let id = NEXT_HANDLE.fetch_add(HANDLE_STEP, Ordering::Relaxed);
        self.objects.insert(id, object);
        // `id` starts above zero and only grows.
        NonNull::new(id as *mut c_void).unwrap_or(NonNull::dangling())
    }

    fn mat(&self, raw: NonNull<c_void>) -> Option<&StubMat> {
        match self.objects.get(&key(raw.as_ptr())) {
            Some(Object::Mat(mat)) => Some(mat),
            _ => None,
        }
    }
}

/// GPU-less implementation of [`CascadeLibrary`].
pub struct StubLibrary {
    state: Mutex<StubState>,
    fail_detect: AtomicBool,
    fail_stream_wait: AtomicBool,
}

impl StubLibrary {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState {
                objects: HashMap::new(),
                stats: StubStats::default(),
            }),
            fail_detect: AtomicBool::new(false),
            fail_stream_wait: AtomicBool::new(false),
        }
    }

    /// Shared handle, ready to hand to the wrappers.
    pub fn shared() -> Arc<dyn CascadeLibrary> {
        Arc::new(Self::new())
    }

    pub fn stats(&self) -> StubStats {
        self.lock().stats
    }

    /// Make subsequent detect calls report a native error.
    pub fn fail_detect(&self, fail: bool) {
        self.fail_detect.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent stream waits report a native error. Queued work is discarded.
    pub fn fail_stream_wait(&self, fail: bool) {
        self.fail_stream_wait.store(fail, Ordering::SeqCst);
    }

    /// Decode the detections written into `mat`, or `None` if nothing was written.
    pub fn detections(&self, mat: &GpuMat) -> Option<Vec<StubDetection>> {
        let state = self.lock();
        let data = &state.mat(mat.as_raw())?.data;
        if data.len() < 4 {
            return None;
        }
        let count = i32::from_le_bytes(data[0..4].try_into().ok()?).max(0) as usize;
        let decoded = data[4..]
            .chunks_exact(DETECTION_ENTRY_BYTES)
            .take(count)
            .map(decode_entry)
            .collect();
        decoded
    }

    /// Contents of a live native string.
    pub fn string_value(&self, raw: NonNull<c_void>) -> Option<String> {
        match self.lock().objects.get(&key(raw.as_ptr())) {
            Some(Object::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Arguments of a live detector.
    pub fn detector_params(&self, raw: NonNull<c_void>) -> Option<CreatedParams> {
        match self.lock().objects.get(&key(raw.as_ptr())) {
            Some(Object::Detector(params)) => Some(params.clone()),
            _ => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, raw: &mut *mut c_void, is_kind: fn(&Object) -> bool) -> bool {
        let mut state = self.lock();
        let id = key(*raw);
        let known = state.objects.get(&id).is_some_and(is_kind);
        if known {
            state.objects.remove(&id);
        } else {
            state.stats.invalid_releases += 1;
        }
        *raw = ptr::null_mut();
        known
    }
}

impl Default for StubLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl CascadeLibrary for StubLibrary {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn string_create(&self, value: &CStr) -> Option<NonNull<c_void>> {
        let mut state = self.lock();
        state.stats.created_strings += 1;
        state.stats.live_strings += 1;
        Some(state.insert(Object::Str(value.to_string_lossy().into_owned())))
    }

    unsafe fn string_release(&self, string: &mut *mut c_void) {
        if self.release(string, |o| matches!(o, Object::Str(_))) {
            self.lock().stats.live_strings -= 1;
        }
    }

    unsafe fn detector_create(
        &self,
        path: NonNull<c_void>,
        min_scale: f64,
        max_scale: f64,
        scales: c_int,
        flags: c_int,
    ) -> std::result::Result<NonNull<c_void>, NativeError> {
        let path = self
            .string_value(path)
            .ok_or_else(|| bad_handle("file name"))?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            Ok(_) => {
                return Err(native(
                    STATUS_ERROR,
                    format!("cascade file {} is empty or not a file", path),
                ))
            }
            Err(e) => {
                return Err(native(
                    STATUS_ERROR,
                    format!("unable to open cascade file {}: {}", path, e),
                ))
            }
        }

        let mut state = self.lock();
        state.stats.created_detectors += 1;
        state.stats.live_detectors += 1;
        Ok(state.insert(Object::Detector(CreatedParams {
            path,
            min_scale,
            max_scale,
            scales,
            flags,
        })))
    }

    unsafe fn detector_detect(
        &self,
        detector: NonNull<c_void>,
        image: NonNull<c_void>,
        rois: NonNull<c_void>,
        objects: NonNull<c_void>,
        stream: *mut c_void,
    ) -> std::result::Result<(), NativeError> {
        let mut state = self.lock();
        state.stats.detect_calls += 1;

        if !matches!(
            state.objects.get(&key(detector.as_ptr())),
            Some(Object::Detector(_))
        ) {
            return Err(bad_handle("detector"));
        }
        let image = state.mat(image).ok_or_else(|| bad_handle("image"))?;
        let size = (image.width, image.height);
        state.mat(rois).ok_or_else(|| bad_handle("rois"))?;
        state.mat(objects).ok_or_else(|| bad_handle("objects"))?;

        if self.fail_detect.load(Ordering::SeqCst) {
            return Err(NativeError {
                status: STATUS_ASSERT,
                function: "cv::softcascade::SCascade::detect".into(),
                message: "stub detection failure".into(),
                file: file!().into(),
                line: line!() as i32,
            });
        }

        let write = PendingWrite {
            target: key(objects.as_ptr()),
            record: detection_record(size.0, size.1),
        };
        if stream.is_null() {
            apply(&mut state, write);
        } else {
            match state.objects.get_mut(&key(stream)) {
                Some(Object::Stream(queue)) => queue.push(write),
                _ => return Err(bad_handle("stream")),
            }
        }
        Ok(())
    }

    unsafe fn detector_release(&self, detector: &mut *mut c_void) {
        if self.release(detector, |o| matches!(o, Object::Detector(_))) {
            let mut state = self.lock();
            state.stats.live_detectors -= 1;
            state.stats.detector_releases += 1;
        }
    }

    fn gpu_mat_create(&self) -> Option<NonNull<c_void>> {
        let mut state = self.lock();
        state.stats.live_mats += 1;
        Some(state.insert(Object::Mat(StubMat::default())))
    }

    fn gpu_mat_create_sized(
        &self,
        rows: c_int,
        cols: c_int,
        _mat_type: c_int,
    ) -> Option<NonNull<c_void>> {
        if rows < 0 || cols < 0 {
            return None;
        }
        let mut state = self.lock();
        state.stats.live_mats += 1;
        Some(state.insert(Object::Mat(StubMat {
            width: cols,
            height: rows,
            data: Vec::new(),
        })))
    }

    unsafe fn gpu_mat_release(&self, mat: &mut *mut c_void) {
        if self.release(mat, |o| matches!(o, Object::Mat(_))) {
            self.lock().stats.live_mats -= 1;
        }
    }

    unsafe fn gpu_mat_is_empty(&self, mat: NonNull<c_void>) -> bool {
        self.lock()
            .mat(mat)
            .map_or(true, |m| m.width <= 0 || m.height <= 0)
    }

    unsafe fn gpu_mat_size(&self, mat: NonNull<c_void>) -> Size {
        self.lock().mat(mat).map_or(Size::default(), |m| Size {
            width: m.width,
            height: m.height,
        })
    }

    fn stream_create(&self) -> Option<NonNull<c_void>> {
        let mut state = self.lock();
        state.stats.live_streams += 1;
        Some(state.insert(Object::Stream(Vec::new())))
    }

    unsafe fn stream_release(&self, stream: &mut *mut c_void) {
        if self.release(stream, |o| matches!(o, Object::Stream(_))) {
            self.lock().stats.live_streams -= 1;
        }
    }

    unsafe fn stream_wait(&self, stream: NonNull<c_void>) -> std::result::Result<(), NativeError> {
        let mut state = self.lock();
        let queued = match state.objects.get_mut(&key(stream.as_ptr())) {
            Some(Object::Stream(queue)) => std::mem::take(queue),
            _ => return Err(bad_handle("stream")),
        };
        if self.fail_stream_wait.load(Ordering::SeqCst) {
            return Err(native(
                STATUS_GPU_API,
                format!("stream synchronisation dropped {} queued write(s)", queued.len()),
            ));
        }
        for write in queued {
            apply(&mut state, write);
        }
        Ok(())
    }
}

fn key(raw: *mut c_void) -> usize {
    raw as usize
}

fn native(status: i32, message: String) -> NativeError {
    NativeError {
        status,
        message,
        ..NativeError::default()
    }
}

fn bad_handle(what: &str) -> NativeError {
    native(STATUS_BAD_HANDLE, format!("invalid {} handle", what))
}

/// Matrix released before its queued write ran: the write is dropped.
fn apply(state: &mut StubState, write: PendingWrite) {
    if let Some(Object::Mat(mat)) = state.objects.get_mut(&write.target) {
        mat.width = write.record.len() as i32;
        mat.height = 1;
        mat.data = write.record;
    }
}

fn detection_record(width: i32, height: i32) -> Vec<u8> {
    let mut record = Vec::with_capacity(4 + DETECTION_ENTRY_BYTES);
    if width <= 0 || height <= 0 {
        record.extend_from_slice(&0i32.to_le_bytes());
        return record;
    }
    record.extend_from_slice(&1i32.to_le_bytes());
    for v in [0u16, 0, clamp_u16(width), clamp_u16(height)] {
        record.extend_from_slice(&v.to_le_bytes());
    }
    record.extend_from_slice(&1.0f32.to_le_bytes());
    record.extend_from_slice(&0i32.to_le_bytes());
    record
}

fn clamp_u16(v: i32) -> u16 {
    v.clamp(0, u16::MAX as i32) as u16
}

fn decode_entry(chunk: &[u8]) -> Option<StubDetection> {
    let u16_at = |i: usize| Some(u16::from_le_bytes(chunk.get(i..i + 2)?.try_into().ok()?));
    Some(StubDetection {
        x: u16_at(0)?,
        y: u16_at(2)?,
        w: u16_at(4)?,
        h: u16_at(6)?,
        confidence: f32::from_le_bytes(chunk.get(8..12)?.try_into().ok()?),
        kind: i32::from_le_bytes(chunk.get(12..16)?.try_into().ok()?),
    })
}
