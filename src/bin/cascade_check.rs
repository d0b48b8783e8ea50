//! cascade_check - load a trained soft cascade and report whether the GPU accepts it
//!
//! This tool:
//! 1. Resolves the model path and search parameters (config file, env, flags)
//! 2. Creates the detector through the native library
//! 3. Optionally runs probe detections on an uninitialised frame
//! 4. Releases every native resource before exiting

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use cuda_softcascade::config::{CascadeConfig, CONFIG_ENV};
use cuda_softcascade::{
    CascadeLibrary, GpuMat, MatType, RejectionCriteria, Size, SoftCascadeDetector, Stream,
    StubLibrary,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON config file.
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,
    /// Trained soft cascade model file.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Minimum search scale relative to the frame.
    #[arg(long)]
    min_scale: Option<f64>,
    /// Maximum search scale relative to the frame.
    #[arg(long)]
    max_scale: Option<f64>,
    /// Number of scale levels between min and max.
    #[arg(long)]
    scales: Option<i32>,
    /// Rejection criteria (no_reject|dollar|nms_mask|default).
    #[arg(long)]
    rejection: Option<RejectionCriteria>,
    /// Run this many probe detections after loading.
    #[arg(long, default_value_t = 0)]
    probe: u32,
    /// Probe frame width in pixels.
    #[arg(long, default_value_t = 640)]
    width: i32,
    /// Probe frame height in pixels.
    #[arg(long, default_value_t = 480)]
    height: i32,
    /// Queue probe detections on a stream instead of running them synchronously.
    #[arg(long)]
    async_probe: bool,
    /// Use the in-process stub library instead of cvextern.
    #[arg(long)]
    stub: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = resolve_config(&args)?;

    let lib = select_library(args.stub);
    let model = cfg.require_model_path()?;

    let started = Instant::now();
    let mut detector = SoftCascadeDetector::with_params(&lib, model, cfg.params)
        .with_context(|| format!("loading {}", model.display()))?;
    log::info!(
        "loaded {} via {} in {:?} (scales {}..{} x{}, rejection {})",
        model.display(),
        lib.name(),
        started.elapsed(),
        cfg.params.min_scale,
        cfg.params.max_scale,
        cfg.params.scales,
        cfg.params.rejection
    );

    if args.probe > 0 {
        let size = Size {
            width: args.width,
            height: args.height,
        };
        let frame = GpuMat::with_size(&lib, size, MatType::Bgr8)?;
        let rois = GpuMat::with_size(&lib, size, MatType::Gray8)?;
        let stream = if args.async_probe {
            Some(Stream::new(&lib)?)
        } else {
            None
        };

        let started = Instant::now();
        let mut outputs = Vec::with_capacity(args.probe as usize);
        for _ in 0..args.probe {
            outputs.push(detector.detect(&frame, &rois, stream.as_ref())?);
        }
        if let Some(stream) = &stream {
            stream.wait_for_completion()?;
        }
        log::info!(
            "{} probe detection(s) completed in {:?}",
            outputs.len(),
            started.elapsed()
        );
    }

    detector.release();
    println!("ok: {}", model.display());
    Ok(())
}

/// File settings, then environment, then command-line flags.
fn resolve_config(args: &Args) -> Result<CascadeConfig> {
    let mut cfg = CascadeConfig::load_from(args.config.as_deref())?;
    if let Some(model) = &args.model {
        cfg.model_path = Some(model.clone());
    }
    if let Some(v) = args.min_scale {
        cfg.params.min_scale = v;
    }
    if let Some(v) = args.max_scale {
        cfg.params.max_scale = v;
    }
    if let Some(v) = args.scales {
        cfg.params.scales = v;
    }
    if let Some(v) = args.rejection {
        cfg.params.rejection = v;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn select_library(force_stub: bool) -> Arc<dyn CascadeLibrary> {
    if force_stub {
        return StubLibrary::shared();
    }
    #[cfg(feature = "cvextern")]
    {
        Arc::new(cuda_softcascade::CvExtern::new())
    }
    #[cfg(not(feature = "cvextern"))]
    {
        log::warn!("built without the cvextern feature; using the stub library");
        StubLibrary::shared()
    }
}
