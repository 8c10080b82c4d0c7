use super::DisplaySink;
use anyhow::{Context, Result};
use image::RgbaImage;
use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

/// errno for a device that vanished under an open file
const ENODEV: i32 = 19;

/// Writes composites to a v4l2loopback device as YUYV
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    yuyv: Vec<u8>,
    status: String,
    open: bool,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let mut format = Output::format(&device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YUYV");
        let format = Output::set_format(&device, &format).context("Failed to set YUYV output format")?;
        tracing::debug!("Negotiated output format: {}", format);

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
            yuyv: Vec::with_capacity((width * height * 2) as usize),
            status: String::new(),
            open: true,
        })
    }
}

/// Whether a write error means nobody is reading the device any more
fn consumer_gone(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::BrokenPipe | ErrorKind::NotFound) || e.raw_os_error() == Some(ENODEV)
}

/// Convert an RGBA frame to YUV422 (YUYV), ignoring alpha
fn rgba_to_yuyv(image: &RgbaImage, out: &mut Vec<u8>) {
    let (width, height) = image.dimensions();
    out.clear();

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let pixel1 = image.get_pixel(x, y);
            let pixel2 = if x + 1 < width {
                image.get_pixel(x + 1, y)
            } else {
                pixel1
            };

            let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
            let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

            // Average U and V for the pair of pixels
            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            // YUYV format: Y0 U Y1 V
            out.extend_from_slice(&[y1, u, y2, v]);
        }
    }
}

/// Convert RGB to YUV color space
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl DisplaySink for V4L2Output {
    fn render(&mut self, frame: &RgbaImage) -> Result<()> {
        let resized;
        let frame = if frame.dimensions() != (self.width, self.height) {
            resized = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            &resized
        } else {
            frame
        };

        rgba_to_yuyv(frame, &mut self.yuyv);

        match self.file.write_all(&self.yuyv) {
            Ok(()) => Ok(()),
            Err(e) => {
                if consumer_gone(&e) {
                    tracing::warn!("v4l2loopback consumer went away: {}", e);
                    self.open = false;
                }
                Err(e).context("Failed to write frame to v4l2loopback device")
            }
        }
    }

    fn set_status(&mut self, status: &str) {
        if self.status != status {
            tracing::debug!("Status: {}", status);
            self.status.clear();
            self.status.push_str(status);
        }
    }

    fn is_streaming(&self) -> bool {
        self.open
    }
}
