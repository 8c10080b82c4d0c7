mod canvas;
mod trail;

pub use canvas::PixelCanvas;
pub use trail::{TrailRenderer, TrailStyle};
