use super::labels::ClassLabels;
use super::Detection;
use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use std::str::FromStr;

/// Height of the class tab drawn above a box when there is no font
const TAB_HEIGHT: u32 = 8;

const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

const PALETTE: [[u8; 3]; 8] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [52, 69, 147],
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OverlayFlagsError {
    #[error("unknown overlay flag `{0}` (expected box, labels, conf or none)")]
    UnknownFlag(String),
}

/// Annotations the detector draws onto the frame itself
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayFlags {
    pub boxes: bool,
    pub labels: bool,
    pub confidence: bool,
}

impl OverlayFlags {
    pub fn is_empty(&self) -> bool {
        !(self.boxes || self.labels || self.confidence)
    }
}

impl FromStr for OverlayFlags {
    type Err = OverlayFlagsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut flags = OverlayFlags::default();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "box" => flags.boxes = true,
                "labels" => flags.labels = true,
                "conf" => flags.confidence = true,
                "none" => {}
                _ => return Err(OverlayFlagsError::UnknownFlag(token.to_string())),
            }
        }
        Ok(flags)
    }
}

pub(super) fn class_color(class_id: u32) -> Rgba<u8> {
    let [r, g, b] = PALETTE[class_id as usize % PALETTE.len()];
    Rgba([r, g, b, 255])
}

/// Font used to print class names and confidences on the box tabs
pub struct LabelFont {
    font: FontVec,
    scale: PxScale,
}

impl LabelFont {
    pub fn load<P: AsRef<Path>>(path: P, size: f32) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow!("Failed to parse font {}: {}", path.display(), e))?;
        tracing::info!("Loaded label font from {}", path.display());
        Ok(Self {
            font,
            scale: PxScale::from(size),
        })
    }

    fn tab_height(&self) -> u32 {
        self.scale.y.ceil() as u32 + 2
    }
}

/// Text printed on a detection's tab, e.g. "ball 87%"
pub(super) fn tab_text(det: &Detection, flags: OverlayFlags, labels: &ClassLabels) -> Option<String> {
    let percent = (det.confidence.clamp(0.0, 1.0) * 100.0).round() as u32;
    match (flags.labels, flags.confidence) {
        (true, true) => Some(format!("{} {}%", labels.describe(det.class_id), percent)),
        (true, false) => Some(labels.describe(det.class_id).to_string()),
        (false, true) => Some(format!("{}%", percent)),
        (false, false) => None,
    }
}

/// Draw detection annotations onto the frame
///
/// With a font, `labels` and `conf` print the class name and confidence on a
/// tab over the box. Without one, the tab is a plain class-coloured bar and
/// `conf` scales its width by the detection confidence.
pub(super) fn draw_overlay(
    frame: &mut RgbaImage,
    detections: &[Detection],
    flags: OverlayFlags,
    labels: &ClassLabels,
    font: Option<&LabelFont>,
) {
    if flags.is_empty() {
        return;
    }

    for det in detections {
        let color = class_color(det.class_id);
        let left = det.left.round() as i32;
        let top = det.top.round() as i32;
        let width = det.width().round().max(1.0) as u32;
        let height = det.height().round().max(1.0) as u32;

        if flags.boxes {
            draw_hollow_rect_mut(frame, Rect::at(left, top).of_size(width, height), color);
        }

        let Some(text) = tab_text(det, flags, labels) else {
            continue;
        };

        match font {
            Some(font) => {
                let tab_height = font.tab_height();
                let tab_top = (top - tab_height as i32).max(0);
                draw_filled_rect_mut(
                    frame,
                    Rect::at(left, tab_top).of_size(width, tab_height),
                    color,
                );
                draw_text_mut(
                    frame,
                    TEXT_COLOR,
                    left + 2,
                    tab_top + 1,
                    font.scale,
                    &font.font,
                    &text,
                );
            }
            None => {
                let tab_width = if flags.confidence {
                    ((width as f32 * det.confidence.clamp(0.0, 1.0)).round() as u32).max(1)
                } else {
                    width
                };
                let tab_top = (top - TAB_HEIGHT as i32).max(0);
                draw_filled_rect_mut(
                    frame,
                    Rect::at(left, tab_top).of_size(tab_width, TAB_HEIGHT),
                    color,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_flag_string() {
        let flags: OverlayFlags = "box,labels,conf".parse().unwrap();
        assert!(flags.boxes && flags.labels && flags.confidence);
    }

    #[test]
    fn parses_none_and_whitespace() {
        let flags: OverlayFlags = " none ".parse().unwrap();
        assert!(flags.is_empty());

        let flags: OverlayFlags = "box, conf".parse().unwrap();
        assert!(flags.boxes);
        assert!(!flags.labels);
        assert!(flags.confidence);
    }

    #[test]
    fn rejects_unknown_flag() {
        let err = "box,outline".parse::<OverlayFlags>().unwrap_err();
        assert_eq!(err, OverlayFlagsError::UnknownFlag("outline".to_string()));
    }

    #[test]
    fn draws_box_outline_only_where_requested() {
        let mut frame = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        let det = Detection {
            class_id: 1,
            confidence: 0.5,
            left: 20.0,
            top: 20.0,
            right: 40.0,
            bottom: 40.0,
        };

        let labels = ClassLabels::default();
        draw_overlay(&mut frame, &[det], OverlayFlags::default(), &labels, None);
        assert!(frame.pixels().all(|p| *p == Rgba([0, 0, 0, 255])));

        let flags = OverlayFlags {
            boxes: true,
            ..OverlayFlags::default()
        };
        draw_overlay(&mut frame, &[det], flags, &labels, None);
        assert_eq!(*frame.get_pixel(20, 30), class_color(1));
        assert_eq!(*frame.get_pixel(30, 30), Rgba([0, 0, 0, 255]));
    }

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    /// 20x20 box at (20, 20)
    fn det_with_confidence(confidence: f32) -> Detection {
        Detection {
            class_id: 2,
            confidence,
            left: 20.0,
            top: 20.0,
            right: 40.0,
            bottom: 40.0,
        }
    }

    #[test]
    fn labels_draw_tab_above_box() {
        let mut frame = RgbaImage::from_pixel(64, 64, BLACK);
        let flags = OverlayFlags {
            labels: true,
            ..OverlayFlags::default()
        };

        let det = det_with_confidence(0.5);
        draw_overlay(&mut frame, &[det], flags, &ClassLabels::default(), None);

        let tab_top = 20 - TAB_HEIGHT;
        assert_eq!(*frame.get_pixel(20, tab_top), class_color(2));
        assert_eq!(*frame.get_pixel(39, 19), class_color(2));
        assert_eq!(*frame.get_pixel(40, tab_top), BLACK);
        assert_eq!(*frame.get_pixel(20, tab_top - 1), BLACK);
        // No outline without `box`
        assert_eq!(*frame.get_pixel(20, 30), BLACK);
    }

    #[test]
    fn conf_scales_tab_width() {
        let mut frame = RgbaImage::from_pixel(64, 64, BLACK);
        let flags = OverlayFlags {
            confidence: true,
            ..OverlayFlags::default()
        };

        let det = det_with_confidence(0.5);
        draw_overlay(&mut frame, &[det], flags, &ClassLabels::default(), None);

        let row = 20 - TAB_HEIGHT;
        assert_eq!(*frame.get_pixel(29, row), class_color(2));
        assert_eq!(*frame.get_pixel(30, row), BLACK);
    }

    #[test]
    fn tab_text_follows_flags() {
        let labels = ClassLabels::parse("person\nball\ncone");
        let det = det_with_confidence(0.874);
        let flags = |labels, confidence| OverlayFlags {
            boxes: true,
            labels,
            confidence,
        };

        assert_eq!(tab_text(&det, flags(true, true), &labels).as_deref(), Some("cone 87%"));
        assert_eq!(tab_text(&det, flags(true, false), &labels).as_deref(), Some("cone"));
        assert_eq!(tab_text(&det, flags(false, true), &labels).as_deref(), Some("87%"));
        assert_eq!(tab_text(&det, flags(false, false), &labels), None);
    }

    #[test]
    fn invalid_font_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();

        assert!(LabelFont::load(&path, 14.0).is_err());
        assert!(LabelFont::load(dir.path().join("missing.ttf"), 14.0).is_err());
    }
}
