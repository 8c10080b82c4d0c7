use super::DisplaySink;
use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Saves every composite as a numbered PNG
pub struct FrameDirOutput {
    dir: PathBuf,
    next_index: u64,
    status: String,
}

impl FrameDirOutput {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        tracing::info!("Writing composites to {}", dir.display());

        Ok(Self {
            dir,
            next_index: 0,
            status: String::new(),
        })
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn frames_written(&self) -> u64 {
        self.next_index
    }
}

impl DisplaySink for FrameDirOutput {
    fn render(&mut self, frame: &RgbaImage) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", self.next_index));
        frame
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.next_index += 1;
        Ok(())
    }

    fn set_status(&mut self, status: &str) {
        self.status.clear();
        self.status.push_str(status);
    }

    /// A directory never closes on us
    fn is_streaming(&self) -> bool {
        true
    }
}

impl Drop for FrameDirOutput {
    fn drop(&mut self) {
        tracing::info!("Wrote {} composites to {}", self.next_index, self.dir.display());
    }
}
