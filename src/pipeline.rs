use crate::cancel::CancellationToken;
use crate::capture::{CaptureError, CaptureSource};
use crate::compose::Compositor;
use crate::detect::{Detection, Detector, OverlayFlags};
use crate::output::DisplaySink;
use crate::render::{TrailRenderer, TrailStyle};
use crate::stats::{PipelineStats, Stage};
use crate::tracking::{reduce_centroid, Trajectory};
use anyhow::{Context, Result};
use image::RgbaImage;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Longest a single capture may block
    pub capture_timeout: Duration,
    /// Log a stats summary every this many processed frames
    pub stats_interval: u64,
    pub overlay: OverlayFlags,
    pub trail: TrailStyle,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capture_timeout: Duration::from_millis(1000),
            stats_interval: 30,
            overlay: OverlayFlags {
                boxes: true,
                labels: true,
                confidence: true,
            },
            trail: TrailStyle::default(),
        }
    }
}

/// Why a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Cancelled,
    EndOfStream,
    ViewerClosed,
}

enum Captured {
    Frame(RgbaImage),
    Skipped,
    EndOfStream,
}

/// Per-stream tracking loop
///
/// Owns everything that survives between iterations: the trajectory, the
/// trail canvas and the composite buffer. The canvas and composite are sized
/// once from the stream resolution and reused for every frame.
pub struct Pipeline {
    config: PipelineConfig,
    width: u32,
    height: u32,
    trajectory: Trajectory,
    canvas: RgbaImage,
    compositor: Compositor,
    renderer: TrailRenderer,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(width: u32, height: u32, config: PipelineConfig) -> Self {
        let renderer = TrailRenderer::new(config.trail);
        Self {
            canvas: RgbaImage::from_pixel(width, height, config.trail.background),
            compositor: Compositor::new(width, height),
            trajectory: Trajectory::new(),
            stats: PipelineStats::default(),
            renderer,
            width,
            height,
            config,
        }
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn composite(&self) -> &RgbaImage {
        self.compositor.buffer()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Run until cancelled, the source ends or the viewer closes
    ///
    /// Capture trouble is logged and skipped; only a detector failure ends the
    /// run with an error.
    pub fn run<S, D>(
        &mut self,
        source: &mut S,
        detector: &mut D,
        mut sink: Option<&mut dyn DisplaySink>,
        cancel: &CancellationToken,
    ) -> Result<ExitReason>
    where
        S: CaptureSource + ?Sized,
        D: Detector + ?Sized,
    {
        tracing::info!(
            "Starting tracking loop at {}x{} (composite {}x{})",
            self.width,
            self.height,
            self.compositor.dimensions().0,
            self.compositor.dimensions().1
        );
        if sink.is_none() {
            tracing::info!("No display configured, running headless");
        }

        let mut viewer_closed = false;
        let reason = loop {
            if cancel.is_cancelled() {
                break if viewer_closed {
                    ExitReason::ViewerClosed
                } else {
                    ExitReason::Cancelled
                };
            }

            let mut frame = match self.capture(source) {
                Captured::Frame(frame) => frame,
                Captured::Skipped => continue,
                Captured::EndOfStream => {
                    cancel.cancel();
                    break ExitReason::EndOfStream;
                }
            };

            self.process_frame(&mut frame, detector)?;

            if let Some(sink) = sink.as_deref_mut() {
                if !self.display(sink, detector) {
                    tracing::info!("Viewer closed, stopping");
                    viewer_closed = true;
                    cancel.cancel();
                }
            }

            detector.log_profiler_times();
            if self.config.stats_interval > 0 && self.stats.frames % self.config.stats_interval == 0 {
                self.stats.log_summary();
            }
        };

        self.stats.log_summary();
        tracing::info!("Tracking loop finished: {:?}", reason);
        Ok(reason)
    }

    fn capture<S: CaptureSource + ?Sized>(&mut self, source: &mut S) -> Captured {
        let start = Instant::now();
        let result = source.capture(self.config.capture_timeout);
        self.stats.record(Stage::Capture, start.elapsed());

        match result {
            Ok(frame) if frame.dimensions() == (self.width, self.height) => Captured::Frame(frame),
            Ok(frame) => {
                tracing::warn!(
                    "Dropping {:?} frame from a {}x{} stream",
                    frame.dimensions(),
                    self.width,
                    self.height
                );
                self.stats.capture_errors += 1;
                Captured::Skipped
            }
            Err(e) if !source.is_streaming() => {
                tracing::info!("End of stream ({})", e);
                Captured::EndOfStream
            }
            Err(CaptureError::Timeout(wait)) => {
                tracing::warn!("No frame within {:?}, source still live", wait);
                self.stats.timeouts += 1;
                Captured::Skipped
            }
            Err(e) => {
                tracing::error!("Failed to capture video frame: {}", e);
                self.stats.capture_errors += 1;
                Captured::Skipped
            }
        }
    }

    /// Detect, track, draw the trail and composite one frame
    ///
    /// Returns the number of detections. A frame without detections still
    /// gets a cleared canvas and a fresh composite, but leaves the trajectory
    /// where it was.
    pub fn process_frame<D: Detector + ?Sized>(
        &mut self,
        frame: &mut RgbaImage,
        detector: &mut D,
    ) -> Result<usize> {
        let start = Instant::now();
        let detections = detector
            .detect(frame, self.config.overlay)
            .context("Detector failed")?;
        self.stats.record(Stage::Detect, start.elapsed());
        log_detections(&detections, detector);

        let start = Instant::now();
        self.renderer.clear(&mut self.canvas);
        if let Some(centroid) = reduce_centroid(&detections) {
            let motion = self.trajectory.advance(centroid);
            let arrow = self.renderer.draw(&mut self.canvas, motion);
            tracing::debug!(
                "Tracked point ({}, {}), arrow ({}, {}) -> ({}, {})",
                centroid.x,
                centroid.y,
                arrow.tail.x,
                arrow.tail.y,
                arrow.head.x,
                arrow.head.y
            );
            self.stats.frames_with_detections += 1;
        }
        self.stats.record(Stage::Render, start.elapsed());

        let start = Instant::now();
        self.compositor.compose(frame, &self.canvas)?;
        self.stats.record(Stage::Composite, start.elapsed());

        self.stats.frames += 1;
        Ok(detections.len())
    }

    /// Push the composite and status line; false once the viewer is gone
    fn display<D: Detector + ?Sized>(&mut self, sink: &mut dyn DisplaySink, detector: &D) -> bool {
        let start = Instant::now();
        if let Err(e) = sink.render(self.compositor.buffer()) {
            tracing::error!("Failed to render composite: {:#}", e);
        }
        sink.set_status(&status_line(detector, &self.stats));
        self.stats.record(Stage::Display, start.elapsed());

        sink.is_streaming()
    }
}

fn status_line<D: Detector + ?Sized>(detector: &D, stats: &PipelineStats) -> String {
    format!(
        "{} | {} | Network {:.0} FPS | Pipeline {:.1} FPS",
        detector.runtime(),
        detector.precision(),
        detector.network_fps(),
        stats.throughput_fps()
    )
}

fn log_detections<D: Detector + ?Sized>(detections: &[Detection], detector: &D) {
    if detections.is_empty() {
        return;
    }
    tracing::debug!("{} objects detected", detections.len());
    for (n, det) in detections.iter().enumerate() {
        tracing::debug!(
            "detected obj {}  class #{} ({})  confidence={:.3}",
            n,
            det.class_id,
            detector.class_desc(det.class_id),
            det.confidence
        );
        tracing::debug!(
            "bounding box {}  ({:.1}, {:.1})  ({:.1}, {:.1})  w={:.1}  h={:.1}",
            n,
            det.left,
            det.top,
            det.right,
            det.bottom,
            det.width(),
            det.height()
        );
    }
}
