use crate::detect::Detection;
use std::ops::{Add, Mul, Sub};

/// Integer pixel coordinate in frame space
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<i32> for Point {
    type Output = Point;

    fn mul(self, rhs: i32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Detection {
    /// Box midpoint, truncated to whole pixels
    pub fn centroid(&self) -> Point {
        Point::new(
            ((self.left + self.right) / 2.0) as i32,
            ((self.top + self.bottom) / 2.0) as i32,
        )
    }
}

/// Reduce a frame's detections to the single tracked point
///
/// Every detection is visited in order and the last one wins, so with several
/// simultaneous detections the point follows whichever the detector listed
/// last. `None` when nothing was detected.
pub fn reduce_centroid(detections: &[Detection]) -> Option<Point> {
    detections.iter().map(Detection::centroid).last()
}

/// Movement between the two most recent tracked points
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Motion {
    pub from: Point,
    pub to: Point,
}

/// The tracked point and the one before it
///
/// Only updated on frames that had a detection; frames without one leave it
/// frozen. Both points start at the origin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Trajectory {
    current: Point,
    previous: Point,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Point {
        self.current
    }

    pub fn previous(&self) -> Point {
        self.previous
    }

    /// Record a new tracked point and return the motion that led to it
    pub fn advance(&mut self, centroid: Point) -> Motion {
        self.previous = self.current;
        self.current = centroid;
        Motion {
            from: self.previous,
            to: self.current,
        }
    }
}
