//! Rectangle-set regions for damage, opaque and input state
//!
//! A [`Region`] is stored as a list of pairwise disjoint, non-empty
//! rectangles. Union and subtraction keep that invariant, so the covered area
//! is always the plain sum of the member areas.

use crate::geometry::Rect;

/// Half of the i32 range on each side, large enough to cover any surface
const INFINITE_EXTENT: i32 = i32::MAX / 2;

#[derive(Debug, Clone, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.add(rect);
        region
    }

    /// Region covering every reachable coordinate, the default input region
    pub fn infinite() -> Self {
        Self::from_rect(Rect::new(
            -INFINITE_EXTENT,
            -INFINITE_EXTENT,
            i32::MAX,
            i32::MAX,
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    pub fn add(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        if self.rects.iter().any(|r| r.contains_rect(&rect)) {
            return;
        }
        let mut fresh = vec![rect];
        for existing in &self.rects {
            fresh = fresh.iter().flat_map(|piece| piece.subtract(existing)).collect();
            if fresh.is_empty() {
                return;
            }
        }
        self.rects.extend(fresh);
    }

    pub fn subtract(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        self.rects = self.rects.iter().flat_map(|r| r.subtract(&rect)).collect();
    }

    pub fn union(&mut self, other: &Region) {
        for rect in &other.rects {
            self.add(*rect);
        }
    }

    /// Keeps only the part of the region inside `clip`
    pub fn intersect(&mut self, clip: Rect) {
        self.rects = self
            .rects
            .iter()
            .filter_map(|r| r.intersection(&clip))
            .collect();
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|r| r.contains(x, y))
    }

    pub fn bounds(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::default(), |acc, r| acc.bounding_union(r))
    }

    /// True when both regions cover exactly the same set of points
    pub fn same_coverage(&self, other: &Region) -> bool {
        if self.area() != other.area() {
            return false;
        }
        let mut rest = self.clone();
        for rect in &other.rects {
            rest.subtract(*rect);
        }
        rest.is_empty()
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.same_coverage(other)
    }
}

impl From<Rect> for Region {
    fn from(rect: Rect) -> Self {
        Self::from_rect(rect)
    }
}
