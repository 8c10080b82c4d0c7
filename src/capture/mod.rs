mod image_sequence;
mod v4l_capture;

pub use image_sequence::ImageSequence;
pub use v4l_capture::WebcamCapture;

use image::RgbaImage;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No frame arrived within the wait
    #[error("no frame within {0:?}")]
    Timeout(Duration),

    /// The source will not produce any more frames
    #[error("capture stream closed")]
    Closed,

    #[error("capture device error: {0}")]
    Device(String),
}

/// Trait for frame sources
pub trait CaptureSource {
    /// Block for the next frame, waiting at most `timeout`
    fn capture(&mut self, timeout: Duration) -> Result<RgbaImage, CaptureError>;

    /// Whether more frames may still arrive
    ///
    /// Used after a failed capture to tell a stall from end-of-stream.
    fn is_streaming(&self) -> bool;

    /// Get the resolution of captured frames, fixed for the stream
    fn resolution(&self) -> (u32, u32);
}
