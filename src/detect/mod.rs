mod labels;
mod overlay;
mod yolo;

pub use overlay::OverlayFlags;
pub use yolo::{YoloConfig, YoloDetector};

use anyhow::Result;
use image::RgbaImage;
use std::fmt;

/// One object found in a frame, in frame pixel coordinates
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Detection {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &Detection) -> f32 {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

/// Numeric precision the detector network runs at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Fp32,
    Fp16,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Fp32 => f.write_str("FP32"),
            Precision::Fp16 => f.write_str("FP16"),
        }
    }
}

/// Trait for object detectors
/// The pipeline only sees boxes and metadata; backends are free to run
/// whatever model and runtime they like behind it.
pub trait Detector {
    /// Detect objects in `frame`, drawing the annotations selected by
    /// `overlay` directly onto it
    ///
    /// An error here means the model or runtime is unusable.
    fn detect(&mut self, frame: &mut RgbaImage, overlay: OverlayFlags) -> Result<Vec<Detection>>;

    /// Human readable label for a class id
    fn class_desc(&self, class_id: u32) -> &str;

    fn precision(&self) -> Precision;

    /// Rolling inference throughput
    fn network_fps(&self) -> f32;

    /// Name of the inference runtime, shown in the status line
    fn runtime(&self) -> &str;

    /// Emit per-stage timings of the last detection
    fn log_profiler_times(&self) {}
}
