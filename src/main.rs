mod cancel;
mod capture;
mod compose;
mod detect;
mod output;
mod pipeline;
mod render;
mod stats;
mod tracking;

use anyhow::{Context, Result};
use cancel::CancellationToken;
use capture::{CaptureSource, ImageSequence, WebcamCapture};
use clap::Parser;
use detect::{Detector, OverlayFlags, YoloConfig, YoloDetector};
use output::{DisplaySink, FrameDirOutput, V4L2Output};
use pipeline::{Pipeline, PipelineConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Read frames from a directory of images instead of the webcam
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Capture frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Output v4l2loopback device path
    #[arg(short, long)]
    output_device: Option<PathBuf>,

    /// Write composites as PNGs into this directory instead
    #[arg(long, conflicts_with = "output_device")]
    output_dir: Option<PathBuf>,

    /// Path to the detection model (ONNX file)
    #[arg(long)]
    model: PathBuf,

    /// Class labels file, one label per line
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Minimum detection confidence
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    /// IoU above which overlapping boxes of one class are merged
    #[arg(long, default_value_t = 0.45)]
    iou: f32,

    /// Square network input size
    #[arg(long, default_value_t = 640)]
    input_size: u32,

    /// Run the network in FP16 where the execution provider supports it
    #[arg(long)]
    fp16: bool,

    /// Annotations drawn on the live frame: box, labels, conf or none
    #[arg(long, default_value = "box,labels,conf")]
    overlay: String,

    /// Font for printing class names and confidences on the overlay
    #[arg(long)]
    font: Option<PathBuf>,

    /// Overlay text height in pixels
    #[arg(long, default_value_t = 14.0)]
    font_size: f32,

    /// Longest to wait for a frame before checking the source again
    #[arg(long, default_value_t = 1000)]
    capture_timeout_ms: u64,

    /// Log stats every N frames
    #[arg(long, default_value_t = 30)]
    stats_interval: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Trackball starting");

    let overlay: OverlayFlags = args.overlay.parse().context("Invalid --overlay")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            tracing::info!("Received SIGINT, stopping");
            cancel.cancel();
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    // Initialize capture
    let mut source: Box<dyn CaptureSource> = match &args.input_dir {
        Some(dir) => Box::new(ImageSequence::open(dir).context("Failed to open image sequence")?),
        None => Box::new(
            WebcamCapture::new(
                args.input_device,
                args.capture_width,
                args.capture_height,
                args.fps,
            )
            .context("Failed to initialize webcam capture")?,
        ),
    };
    let (width, height) = source.resolution();
    tracing::info!("Capture: {}x{}", width, height);

    // Initialize output, sized for the side-by-side composite
    let mut sink: Option<Box<dyn DisplaySink>> = if let Some(device) = &args.output_device {
        let output = V4L2Output::new(device, width * 2, height)
            .context("Failed to initialize v4l2loopback output")?;
        Some(Box::new(output))
    } else if let Some(dir) = &args.output_dir {
        Some(Box::new(FrameDirOutput::new(dir).context("Failed to initialize frame output")?))
    } else {
        None
    };

    // Initialize detector
    let mut detector: Box<dyn Detector> = Box::new(
        YoloDetector::new(YoloConfig {
            model_path: args.model.clone(),
            labels_path: args.labels.clone(),
            input_size: args.input_size,
            conf_threshold: args.threshold,
            iou_threshold: args.iou,
            fp16: args.fp16,
            font_path: args.font.clone(),
            font_size: args.font_size,
        })
        .context("Failed to load detection model")?,
    );

    let config = PipelineConfig {
        capture_timeout: Duration::from_millis(args.capture_timeout_ms),
        stats_interval: args.stats_interval,
        overlay,
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(width, height, config);

    tracing::info!("Press Ctrl+C to stop");
    let result = pipeline.run(
        source.as_mut(),
        detector.as_mut(),
        sink.as_mut().map(|s| s.as_mut() as &mut dyn DisplaySink),
        &cancel,
    );

    // Stop producing before tearing down consumers
    tracing::info!("Shutting down...");
    drop(source);
    drop(sink);
    drop(detector);
    tracing::info!("Shutdown complete");

    let reason = result?;
    tracing::info!("Exited: {:?}", reason);
    Ok(())
}
