mod frame_dir;
mod loopback;

pub use frame_dir::FrameDirOutput;
pub use loopback::V4L2Output;

use anyhow::Result;
use image::RgbaImage;

/// Trait for display destinations
pub trait DisplaySink {
    /// Show a frame
    fn render(&mut self, frame: &RgbaImage) -> Result<()>;

    /// Replace the status line shown alongside the frames
    fn set_status(&mut self, status: &str);

    /// False once the viewer has gone away
    fn is_streaming(&self) -> bool;
}
