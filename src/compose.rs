use image::{imageops, RgbaImage};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CompositeError {
    #[error("{pane} is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        pane: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Side-by-side output: live frame on the left, trail canvas on the right
///
/// The output buffer is allocated once for the stream and overwritten on
/// every call.
pub struct Compositor {
    buffer: RgbaImage,
    pane: (u32, u32),
}

impl Compositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: RgbaImage::new(width * 2, height),
            pane: (width, height),
        }
    }

    pub fn compose(
        &mut self,
        frame: &RgbaImage,
        canvas: &RgbaImage,
    ) -> Result<&RgbaImage, CompositeError> {
        self.check("frame", frame)?;
        self.check("canvas", canvas)?;

        imageops::replace(&mut self.buffer, frame, 0, 0);
        imageops::replace(&mut self.buffer, canvas, i64::from(self.pane.0), 0);
        Ok(&self.buffer)
    }

    fn check(&self, pane: &'static str, image: &RgbaImage) -> Result<(), CompositeError> {
        if image.dimensions() == self.pane {
            Ok(())
        } else {
            Err(CompositeError::DimensionMismatch {
                pane,
                expected: self.pane,
                actual: image.dimensions(),
            })
        }
    }

    pub fn buffer(&self) -> &RgbaImage {
        &self.buffer
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }
}
