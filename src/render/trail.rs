use super::canvas::PixelCanvas;
use crate::tracking::{Motion, Point};
use image::Rgba;

/// Appearance of the trail overlay
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrailStyle {
    pub background: Rgba<u8>,
    pub dot_color: Rgba<u8>,
    pub dot_radius: i32,
    pub arrow_color: Rgba<u8>,
    pub line_thickness: u32,
    /// How far past the current point the arrow reaches, in multiples of
    /// the last displacement
    pub extrapolation: i32,
    pub head_length: f32,
    pub head_spread_deg: f32,
}

impl Default for TrailStyle {
    fn default() -> Self {
        Self {
            background: Rgba([255, 255, 255, 0]),
            dot_color: Rgba([255, 0, 0, 255]),
            dot_radius: 10,
            arrow_color: Rgba([0, 255, 0, 255]),
            line_thickness: 2,
            extrapolation: 3,
            head_length: 10.0,
            head_spread_deg: 30.0,
        }
    }
}

/// Arrow geometry for one frame of motion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arrow {
    pub tail: Point,
    pub head: Point,
    /// End points of the two barbs, both drawn from `head`
    pub barbs: Option<[Point; 2]>,
}

/// Draws the dot-and-arrow trail onto a canvas
#[derive(Clone, Debug, Default)]
pub struct TrailRenderer {
    style: TrailStyle,
}

impl TrailRenderer {
    pub fn new(style: TrailStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &TrailStyle {
        &self.style
    }

    pub fn clear<C: PixelCanvas + ?Sized>(&self, canvas: &mut C) {
        canvas.clear(self.style.background);
    }

    /// Arrow from the prior point, overshooting the current one in the
    /// direction of travel
    pub fn arrow_for(&self, motion: Motion) -> Arrow {
        let head = motion.to + (motion.to - motion.from) * self.style.extrapolation;
        Arrow {
            tail: motion.from,
            head,
            barbs: arrow_barbs(
                motion.from,
                head,
                self.style.head_length,
                self.style.head_spread_deg,
            ),
        }
    }

    /// Draw the dot at the current point and the motion arrow
    pub fn draw<C: PixelCanvas + ?Sized>(&self, canvas: &mut C, motion: Motion) -> Arrow {
        let style = &self.style;
        canvas.draw_filled_circle(motion.to, style.dot_radius, style.dot_color);

        let arrow = self.arrow_for(motion);
        canvas.draw_thick_line(arrow.tail, arrow.head, style.line_thickness, style.arrow_color);
        if let Some(barbs) = arrow.barbs {
            for barb in barbs {
                canvas.draw_thick_line(arrow.head, barb, style.line_thickness, style.arrow_color);
            }
        }
        arrow
    }
}

/// Barb end points, swept `spread_deg` either side of the reversed shaft
///
/// A zero length shaft has no direction, so it gets no head.
pub fn arrow_barbs(tail: Point, head: Point, length: f32, spread_deg: f32) -> Option<[Point; 2]> {
    if tail == head {
        return None;
    }
    let back = ((tail.y - head.y) as f32).atan2((tail.x - head.x) as f32);
    let spread = spread_deg.to_radians();
    let barb = |angle: f32| {
        Point::new(
            head.x + (length * angle.cos()).round() as i32,
            head.y + (length * angle.sin()).round() as i32,
        )
    };
    Some([barb(back + spread), barb(back - spread)])
}
