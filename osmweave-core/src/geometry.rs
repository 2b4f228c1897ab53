//! Planar helpers shared by the detector and the splitter.
//!
//! All functions work in the native coordinates of the source layer.

use std::cmp::Ordering;

use geo::{Coord, Rect};

use crate::model::ElementId;

/// A linear feature's point identifiers paired with their coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    /// Feature identifier.
    pub id: ElementId,
    /// Point identifiers in travel order.
    pub nodes: Vec<ElementId>,
    /// Coordinates matching `nodes` one to one.
    pub coords: Vec<Coord<f64>>,
}

impl Polyline {
    /// Pair `nodes` with `coords`.
    ///
    /// Both sequences must have the same length.
    #[must_use]
    pub fn new(id: ElementId, nodes: Vec<ElementId>, coords: Vec<Coord<f64>>) -> Self {
        debug_assert_eq!(nodes.len(), coords.len());
        Self { id, nodes, coords }
    }

    /// Axis-aligned bounds of the coordinates.
    ///
    /// An empty polyline yields a degenerate box at the origin.
    #[must_use]
    pub fn bounds(&self) -> Rect<f64> {
        bounds_of(&self.coords)
    }

    /// Number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.coords.len().saturating_sub(1)
    }

    /// Endpoints of segment `index`, if the polyline has that many.
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<(Coord<f64>, Coord<f64>)> {
        Some((*self.coords.get(index)?, *self.coords.get(index + 1)?))
    }

    /// Endpoints of every segment, in order.
    pub fn segments(&self) -> impl Iterator<Item = (Coord<f64>, Coord<f64>)> + '_ {
        self.coords.windows(2).filter_map(|pair| match pair {
            [a, b] => Some((*a, *b)),
            _ => None,
        })
    }

    /// Identifier of the first or last point when `location` lies on an
    /// endpoint within `tolerance`.
    #[must_use]
    pub fn endpoint_at(&self, location: Coord<f64>, tolerance: f64) -> Option<ElementId> {
        let first = self.coords.first()?;
        let last = self.coords.last()?;
        if distance(*first, location) <= tolerance {
            return self.nodes.first().copied();
        }
        if distance(*last, location) <= tolerance {
            return self.nodes.last().copied();
        }
        None
    }
}

/// Bounds of a coordinate list.
#[must_use]
pub fn bounds_of(coords: &[Coord<f64>]) -> Rect<f64> {
    let mut iter = coords.iter();
    let Some(first) = iter.next() else {
        let origin = Coord { x: 0.0, y: 0.0 };
        return Rect::new(origin, origin);
    };
    let (mut min, mut max) = (*first, *first);
    for c in iter {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    Rect::new(min, max)
}

/// Planar distance between two coordinates.
#[must_use]
pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let d = a - b;
    d.x.hypot(d.y)
}

/// Closest point to `p` on segment `a`–`b`, with its fraction along the
/// segment in `[0, 1]`.
#[must_use]
pub fn project(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> (Coord<f64>, f64) {
    let ab = b - a;
    let len2 = ab.x * ab.x + ab.y * ab.y;
    if len2 == 0.0 {
        return (a, 0.0);
    }
    let ap = p - a;
    let t = ((ap.x * ab.x + ap.y * ab.y) / len2).clamp(0.0, 1.0);
    (a + ab * t, t)
}

/// Position along a polyline: a segment index and a fraction within it.
///
/// Positions on a vertex are normalised to `(vertex, 0.0)`, including the
/// final vertex, so two routes to the same vertex compare equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePosition {
    /// Index of the segment (or vertex when `fraction` is zero).
    pub segment: usize,
    /// Fraction along the segment in `[0, 1)`.
    pub fraction: f64,
}

impl LinePosition {
    /// Position exactly on vertex `index`.
    #[must_use]
    pub const fn vertex(index: usize) -> Self {
        Self {
            segment: index,
            fraction: 0.0,
        }
    }

    /// Vertex index when the position sits on a vertex.
    #[must_use]
    pub fn as_vertex(&self) -> Option<usize> {
        (self.fraction == 0.0).then_some(self.segment)
    }

    /// Total ordering along the line.
    #[must_use]
    pub fn cmp_along(&self, other: &Self) -> Ordering {
        self.segment
            .cmp(&other.segment)
            .then(self.fraction.total_cmp(&other.fraction))
    }
}

/// Position of `location` on segment `segment` of `line`.
///
/// Locations within `tolerance` of either segment end snap to that vertex.
/// A segment past the end of `line` yields its start vertex.
#[must_use]
pub fn position_on_segment(
    line: &Polyline,
    segment: usize,
    location: Coord<f64>,
    tolerance: f64,
) -> LinePosition {
    let Some((a, b)) = line.segment(segment) else {
        return LinePosition::vertex(segment);
    };
    if distance(a, location) <= tolerance {
        return LinePosition::vertex(segment);
    }
    if distance(b, location) <= tolerance {
        return LinePosition::vertex(segment + 1);
    }
    let (_, fraction) = project(location, a, b);
    if fraction >= 1.0 {
        return LinePosition::vertex(segment + 1);
    }
    LinePosition { segment, fraction }
}

/// Closest point on `line` to `location`, with its position and distance.
///
/// Ties resolve to the earliest segment.
#[must_use]
pub fn locate(line: &Polyline, location: Coord<f64>, tolerance: f64) -> Option<(Coord<f64>, LinePosition, f64)> {
    let mut best: Option<(Coord<f64>, usize, f64)> = None;
    for (segment, (a, b)) in line.segments().enumerate() {
        let (closest, _) = project(location, a, b);
        let d = distance(closest, location);
        if best.is_none_or(|(_, _, current)| d < current) {
            best = Some((closest, segment, d));
        }
    }
    best.map(|(closest, segment, d)| {
        (
            closest,
            position_on_segment(line, segment, closest, tolerance),
            d,
        )
    })
}

/// An intersection point on one feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitPoint {
    /// Native coordinates of the intersection.
    pub location: Coord<f64>,
    /// Position along the owning feature.
    pub position: LinePosition,
    /// The other feature involved.
    pub partner: ElementId,
}
