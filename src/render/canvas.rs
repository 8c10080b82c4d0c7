use crate::tracking::Point;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

/// Minimal drawing surface the trail renderer paints on
///
/// Coordinates may fall outside the surface; implementations clip.
pub trait PixelCanvas {
    fn dimensions(&self) -> (u32, u32);

    /// Reset every pixel to `color`
    fn clear(&mut self, color: Rgba<u8>);

    fn set_pixel(&mut self, at: Point, color: Rgba<u8>);

    /// One pixel wide line segment, end points included
    fn draw_line(&mut self, from: Point, to: Point, color: Rgba<u8>) {
        // Bresenham, all octants
        let dx = (to.x - from.x).abs();
        let dy = -(to.y - from.y).abs();
        let step_x = if from.x < to.x { 1 } else { -1 };
        let step_y = if from.y < to.y { 1 } else { -1 };
        let mut err = dx + dy;
        let mut at = from;
        loop {
            self.set_pixel(at, color);
            if at == to {
                break;
            }
            let doubled = 2 * err;
            if doubled >= dy {
                err += dy;
                at.x += step_x;
            }
            if doubled <= dx {
                err += dx;
                at.y += step_y;
            }
        }
    }

    fn draw_filled_circle(&mut self, center: Point, radius: i32, color: Rgba<u8>) {
        let (width, height) = self.dimensions();
        let radius = radius.max(0);
        let x_range = (center.x - radius).max(0)..=(center.x + radius).min(width as i32 - 1);
        let y_range = (center.y - radius).max(0)..=(center.y + radius).min(height as i32 - 1);
        for y in y_range {
            for x in x_range.clone() {
                let (dx, dy) = (x - center.x, y - center.y);
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(Point::new(x, y), color);
                }
            }
        }
    }

    /// Line of the given thickness, built from parallel one pixel lines
    /// offset along the minor axis
    fn draw_thick_line(&mut self, from: Point, to: Point, thickness: u32, color: Rgba<u8>) {
        let thickness = thickness.max(1) as i32;
        let delta = to - from;
        let offset = if delta.x.abs() >= delta.y.abs() {
            Point::new(0, 1)
        } else {
            Point::new(1, 0)
        };
        let first = -(thickness - 1) / 2;
        for k in first..first + thickness {
            self.draw_line(from + offset * k, to + offset * k, color);
        }
    }
}

impl PixelCanvas for RgbaImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbaImage::dimensions(self)
    }

    fn clear(&mut self, color: Rgba<u8>) {
        for pixel in self.pixels_mut() {
            *pixel = color;
        }
    }

    fn set_pixel(&mut self, at: Point, color: Rgba<u8>) {
        let (width, height) = RgbaImage::dimensions(self);
        if at.x >= 0 && at.y >= 0 && (at.x as u32) < width && (at.y as u32) < height {
            self.put_pixel(at.x as u32, at.y as u32, color);
        }
    }

    fn draw_line(&mut self, from: Point, to: Point, color: Rgba<u8>) {
        draw_line_segment_mut(
            self,
            (from.x as f32, from.y as f32),
            (to.x as f32, to.y as f32),
            color,
        );
    }

    fn draw_filled_circle(&mut self, center: Point, radius: i32, color: Rgba<u8>) {
        draw_filled_circle_mut(self, (center.x, center.y), radius, color);
    }
}
