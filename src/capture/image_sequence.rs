use super::{CaptureError, CaptureSource};
use anyhow::{bail, Context, Result};
use image::{imageops, RgbaImage};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// File-backed source that plays a directory of images in name order
///
/// Every frame is delivered at the first image's size; the stream ends once
/// the last file has been handed out.
pub struct ImageSequence {
    pending: VecDeque<PathBuf>,
    first: Option<RgbaImage>,
    width: u32,
    height: u32,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!("Opening image sequence in {}", dir.display());

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_image_extension(path))
            .collect();
        files.sort();

        let mut pending: VecDeque<PathBuf> = files.into();
        let first_path = match pending.pop_front() {
            Some(path) => path,
            None => bail!("No images found in {}", dir.display()),
        };
        let first = image::open(&first_path)
            .with_context(|| format!("Failed to decode {}", first_path.display()))?
            .to_rgba8();
        let (width, height) = first.dimensions();

        tracing::info!(
            "Image sequence ready: {} frames at {}x{}",
            pending.len() + 1,
            width,
            height
        );

        Ok(Self {
            pending,
            first: Some(first),
            width,
            height,
        })
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl CaptureSource for ImageSequence {
    fn capture(&mut self, _timeout: Duration) -> Result<RgbaImage, CaptureError> {
        if let Some(first) = self.first.take() {
            return Ok(first);
        }

        let path = self.pending.pop_front().ok_or(CaptureError::Closed)?;
        let frame = image::open(&path)
            .map_err(|e| CaptureError::Device(format!("{}: {}", path.display(), e)))?
            .to_rgba8();

        if frame.dimensions() == (self.width, self.height) {
            Ok(frame)
        } else {
            tracing::debug!(
                "Resizing {} from {:?} to {}x{}",
                path.display(),
                frame.dimensions(),
                self.width,
                self.height
            );
            Ok(imageops::resize(
                &frame,
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            ))
        }
    }

    fn is_streaming(&self) -> bool {
        self.first.is_some() || !self.pending.is_empty()
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const WAIT: Duration = Duration::from_millis(10);

    fn write_frame(dir: &Path, name: &str, width: u32, height: u32, shade: u8) {
        RgbaImage::from_pixel(width, height, Rgba([shade, shade, shade, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn plays_frames_in_name_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "002.png", 8, 6, 20);
        write_frame(dir.path(), "001.png", 8, 6, 10);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequence::open(dir.path()).unwrap();
        assert_eq!(source.resolution(), (8, 6));

        assert_eq!(source.capture(WAIT).unwrap().get_pixel(0, 0)[0], 10);
        assert!(source.is_streaming());
        assert_eq!(source.capture(WAIT).unwrap().get_pixel(0, 0)[0], 20);
        assert!(!source.is_streaming());
        assert!(matches!(source.capture(WAIT), Err(CaptureError::Closed)));
    }

    #[test]
    fn resizes_to_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "a.png", 8, 6, 0);
        write_frame(dir.path(), "b.png", 16, 12, 0);

        let mut source = ImageSequence::open(dir.path()).unwrap();
        source.capture(WAIT).unwrap();
        assert_eq!(source.capture(WAIT).unwrap().dimensions(), (8, 6));
    }

    #[test]
    fn unreadable_file_is_a_device_error() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "a.png", 4, 4, 0);
        std::fs::write(dir.path().join("b.png"), b"not a png").unwrap();
        write_frame(dir.path(), "c.png", 4, 4, 0);

        let mut source = ImageSequence::open(dir.path()).unwrap();
        source.capture(WAIT).unwrap();
        assert!(matches!(source.capture(WAIT), Err(CaptureError::Device(_))));
        assert!(source.is_streaming());
        assert!(source.capture(WAIT).is_ok());
    }

    #[test]
    fn empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequence::open(dir.path()).is_err());
    }
}
