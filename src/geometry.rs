//! Integer and fractional geometry primitives shared by the scene core

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in integer surface or global coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A point with sub-pixel precision, used for pointer and touch locations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle. Width and height are never interpreted as negative:
/// a rectangle with a non-positive extent is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        !self.is_empty() && x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.x >= self.x
                && other.y >= self.y
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        let rect = Rect::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1));
        (!rect.is_empty()).then_some(rect)
    }

    /// Smallest rectangle covering both inputs. Empty inputs are ignored.
    pub fn bounding_union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = self.right().max(other.right());
        let y2 = self.bottom().max(other.bottom());
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Pieces of `self` not covered by `other`, at most four.
    pub fn subtract(&self, other: &Rect) -> Vec<Rect> {
        let Some(hole) = self.intersection(other) else {
            return if self.is_empty() { Vec::new() } else { vec![*self] };
        };
        let pieces = [
            Rect::new(self.x, self.y, self.width, hole.y - self.y),
            Rect::new(self.x, hole.bottom(), self.width, self.bottom() - hole.bottom()),
            Rect::new(self.x, hole.y, hole.x - self.x, hole.height),
            Rect::new(hole.right(), hole.y, self.right() - hole.right(), hole.height),
        ];
        pieces.into_iter().filter(|r| !r.is_empty()).collect()
    }

    /// Rectangle scaled down by an integer buffer scale, rounding outwards.
    pub fn to_surface_space(&self, scale: i32) -> Rect {
        let scale = scale.max(1);
        let x1 = self.x.div_euclid(scale);
        let y1 = self.y.div_euclid(scale);
        let x2 = (self.right() + scale - 1).div_euclid(scale);
        let y2 = (self.bottom() + scale - 1).div_euclid(scale);
        Rect::new(x1, y1, x2 - x1, y2 - y1)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// Fractional rectangle used for viewport source crops
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RectF {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_and_union() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 10, 10);
        assert_eq!(a.intersection(&b), Some(Rect::new(5, 5, 5, 5)));
        assert_eq!(a.bounding_union(&b), Rect::new(0, 0, 15, 15));
        assert_eq!(a.intersection(&Rect::new(20, 20, 1, 1)), None);
    }

    #[test]
    fn test_subtract_center_hole() {
        let outer = Rect::new(0, 0, 30, 30);
        let pieces = outer.subtract(&Rect::new(10, 10, 10, 10));
        assert_eq!(pieces.len(), 4);
        let area: i64 = pieces.iter().map(Rect::area).sum();
        assert_eq!(area, 900 - 100);
        assert!(pieces.iter().all(|p| !p.contains(15, 15)));
    }

    #[test]
    fn test_subtract_disjoint_and_full() {
        let r = Rect::new(0, 0, 5, 5);
        assert_eq!(r.subtract(&Rect::new(10, 10, 5, 5)), vec![r]);
        assert!(r.subtract(&Rect::new(-1, -1, 10, 10)).is_empty());
    }

    #[test]
    fn test_surface_space_rounds_outwards() {
        let damage = Rect::new(1, 1, 3, 3);
        assert_eq!(damage.to_surface_space(2), Rect::new(0, 0, 2, 2));
        assert_eq!(damage.to_surface_space(1), damage);
    }
}
