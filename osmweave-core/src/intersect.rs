//! Intersection detection between linear features.
//!
//! Candidates come from a [`SpatialIndex`]; every candidate pair is then
//! tested segment by segment with `geo`'s exact line intersection predicate.
//! Results are collected per feature in discovery order and sorted along the
//! feature on request, so ties keep the order in which they were found.

use std::collections::{BTreeMap, HashMap};

use geo::Line;
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::Coord;

use crate::geometry::{LinePosition, Polyline, SplitPoint, distance, locate, position_on_segment};
use crate::model::ElementId;
use crate::spatial::{SpatialIndex, expand};

/// One crossing between two features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Native coordinates of the crossing.
    pub location: Coord<f64>,
    /// Feature from the primary set.
    pub first: ElementId,
    /// Feature from the primary set (self mode) or the other layer.
    pub second: ElementId,
}

/// Intersection points discovered by an [`IntersectionDetector`].
#[derive(Debug, Clone, Default)]
pub struct IntersectionSet {
    crossings: Vec<Crossing>,
    entries: Vec<(ElementId, SplitPoint)>,
}

impl IntersectionSet {
    fn record(&mut self, location: Coord<f64>, a: (ElementId, LinePosition), b: (ElementId, LinePosition)) {
        self.crossings.push(Crossing {
            location,
            first: a.0,
            second: b.0,
        });
        self.entries.push((
            a.0,
            SplitPoint {
                location,
                position: a.1,
                partner: b.0,
            },
        ));
        self.entries.push((
            b.0,
            SplitPoint {
                location,
                position: b.1,
                partner: a.0,
            },
        ));
    }

    /// Crossings in discovery order, before de-duplication.
    #[must_use]
    pub fn crossings(&self) -> &[Crossing] {
        &self.crossings
    }

    /// Number of crossings found.
    #[must_use]
    pub fn len(&self) -> usize {
        self.crossings.len()
    }

    /// Whether nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.crossings.is_empty()
    }

    /// Append every result from `other`, after the existing ones.
    pub fn extend(&mut self, other: Self) {
        self.crossings.extend(other.crossings);
        self.entries.extend(other.entries);
    }

    /// Split points per feature, ordered along the feature.
    ///
    /// Points at the same position keep discovery order. Points within
    /// `tolerance` of the previous kept point are dropped.
    #[must_use]
    pub fn ordered(&self, tolerance: f64) -> BTreeMap<ElementId, Vec<SplitPoint>> {
        let mut grouped: BTreeMap<ElementId, Vec<SplitPoint>> = BTreeMap::new();
        for (id, point) in &self.entries {
            grouped.entry(*id).or_default().push(*point);
        }
        for points in grouped.values_mut() {
            points.sort_by(|a, b| a.position.cmp_along(&b.position));
            points.dedup_by(|later, kept| distance(later.location, kept.location) <= tolerance);
        }
        grouped
    }
}

/// Finds crossings within one feature set or against another layer.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osmweave_core::{IntersectionDetector, Polyline, SpatialIndex};
///
/// let lines = vec![
///     Polyline::new(1, vec![10, 11], vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 2.0 }]),
///     Polyline::new(2, vec![12, 13], vec![Coord { x: 0.0, y: 2.0 }, Coord { x: 2.0, y: 0.0 }]),
/// ];
/// let index = SpatialIndex::build(lines.iter().map(|l| (l.id, l.bounds())));
/// let found = IntersectionDetector::new(1e-9).self_intersections(&lines, &index);
/// assert_eq!(found.len(), 1);
/// assert_eq!(found.crossings()[0].location, Coord { x: 1.0, y: 1.0 });
/// ```
#[derive(Debug, Clone, Copy)]
pub struct IntersectionDetector {
    tolerance: f64,
}

impl IntersectionDetector {
    /// Create a detector using `tolerance` for exact coincidence checks.
    #[must_use]
    pub const fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Crossings between features of `lines`.
    ///
    /// `index` must hold the bounds of `lines` keyed by feature identifier.
    /// Each unordered pair is tested once.
    #[must_use]
    pub fn self_intersections(&self, lines: &[Polyline], index: &SpatialIndex) -> IntersectionSet {
        let positions: HashMap<ElementId, usize> =
            lines.iter().enumerate().map(|(i, l)| (l.id, i)).collect();
        let mut found = IntersectionSet::default();
        for (i, line) in lines.iter().enumerate() {
            let later = candidates(index, &line.bounds(), &positions).into_iter().filter(|j| *j > i);
            for other in later.filter_map(|j| lines.get(j)) {
                self.test_pair(line, other, None, &mut found);
            }
        }
        found
    }

    /// Crossings between `lines` and features of another layer.
    ///
    /// `other_index` must hold the bounds of `others`. When `buffer` is
    /// positive, a pair with no exact crossing but a gap no wider than the
    /// buffer yields one point snapped onto the other-layer feature.
    #[must_use]
    pub fn cross_intersections(
        &self,
        lines: &[Polyline],
        others: &[Polyline],
        other_index: &SpatialIndex,
        buffer: f64,
    ) -> IntersectionSet {
        let positions: HashMap<ElementId, usize> =
            others.iter().enumerate().map(|(i, l)| (l.id, i)).collect();
        let mut found = IntersectionSet::default();
        for line in lines {
            let query = expand(&line.bounds(), buffer);
            for other in candidates(other_index, &query, &positions).into_iter().filter_map(|j| others.get(j)) {
                if other.id != line.id {
                    self.test_pair(line, other, (buffer > 0.0).then_some(buffer), &mut found);
                }
            }
        }
        found
    }

    fn test_pair(&self, a: &Polyline, b: &Polyline, buffer: Option<f64>, found: &mut IntersectionSet) {
        let mut crossed = false;
        for (i, (a0, a1)) in a.segments().enumerate() {
            for (j, (b0, b1)) in b.segments().enumerate() {
                let Some(location) = crossing_point(Line::new(a0, a1), Line::new(b0, b1)) else {
                    continue;
                };
                if self.shares_endpoint(a, b, location) {
                    continue;
                }
                crossed = true;
                found.record(
                    location,
                    (a.id, position_on_segment(a, i, location, self.tolerance)),
                    (b.id, position_on_segment(b, j, location, self.tolerance)),
                );
            }
        }
        if !crossed && let Some(buffer) = buffer {
            self.snap_near_miss(a, b, buffer, found);
        }
    }

    fn shares_endpoint(&self, a: &Polyline, b: &Polyline, location: Coord<f64>) -> bool {
        match (
            a.endpoint_at(location, self.tolerance),
            b.endpoint_at(location, self.tolerance),
        ) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    fn snap_near_miss(&self, a: &Polyline, b: &Polyline, buffer: f64, found: &mut IntersectionSet) {
        let mut best: Option<(f64, Coord<f64>)> = None;
        let mut consider = |gap: f64, snapped: Coord<f64>| {
            if best.is_none_or(|(current, _)| gap < current) {
                best = Some((gap, snapped));
            }
        };
        for vertex in &a.coords {
            if let Some((closest, _, gap)) = locate(b, *vertex, self.tolerance) {
                consider(gap, closest);
            }
        }
        for vertex in &b.coords {
            if let Some((_, _, gap)) = locate(a, *vertex, self.tolerance) {
                consider(gap, *vertex);
            }
        }
        let Some((gap, snapped)) = best else {
            return;
        };
        if gap <= self.tolerance || gap > buffer {
            return;
        }
        let on_a = locate(a, snapped, self.tolerance);
        let on_b = locate(b, snapped, self.tolerance);
        if let (Some((_, pa, _)), Some((_, pb, _))) = (on_a, on_b) {
            found.record(snapped, (a.id, pa), (b.id, pb));
        }
    }
}

fn candidates(index: &SpatialIndex, bounds: &geo::Rect<f64>, positions: &HashMap<ElementId, usize>) -> Vec<usize> {
    let mut hits: Vec<usize> = index
        .query(bounds)
        .into_iter()
        .filter_map(|id| positions.get(&id).copied())
        .collect();
    hits.sort_unstable();
    hits
}

fn crossing_point(p: Line<f64>, q: Line<f64>) -> Option<Coord<f64>> {
    match line_intersection(p, q)? {
        LineIntersection::SinglePoint { intersection, .. } => Some(intersection),
        LineIntersection::Collinear { intersection } => {
            (intersection.start == intersection.end).then_some(intersection.start)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn line(id: ElementId, nodes: &[ElementId], coords: &[(f64, f64)]) -> Polyline {
        Polyline::new(
            id,
            nodes.to_vec(),
            coords.iter().map(|(x, y)| Coord { x: *x, y: *y }).collect(),
        )
    }

    fn index_of(lines: &[Polyline]) -> SpatialIndex {
        SpatialIndex::build(lines.iter().map(|l| (l.id, l.bounds())))
    }

    #[fixture]
    fn detector() -> IntersectionDetector {
        IntersectionDetector::new(1e-9)
    }

    #[rstest]
    fn crossing_pair_reports_one_point(detector: IntersectionDetector) {
        let lines = vec![
            line(1, &[10, 11], &[(0.0, 0.0), (2.0, 2.0)]),
            line(2, &[12, 13], &[(0.0, 2.0), (2.0, 0.0)]),
        ];
        let found = detector.self_intersections(&lines, &index_of(&lines));
        assert_eq!(
            found.crossings(),
            &[Crossing {
                location: Coord { x: 1.0, y: 1.0 },
                first: 1,
                second: 2,
            }]
        );
        let ordered = found.ordered(1e-9);
        assert_eq!(ordered[&1][0].position.fraction, 0.5);
        assert_eq!(ordered[&2][0].partner, 1);
    }

    #[rstest]
    fn shared_endpoint_is_not_a_crossing(detector: IntersectionDetector) {
        let lines = vec![
            line(1, &[10, 11], &[(0.0, 0.0), (1.0, 1.0)]),
            line(2, &[11, 12], &[(1.0, 1.0), (2.0, 0.0)]),
        ];
        assert!(detector.self_intersections(&lines, &index_of(&lines)).is_empty());
    }

    #[rstest]
    fn endpoint_touching_interior_counts(detector: IntersectionDetector) {
        let lines = vec![
            line(1, &[10, 11], &[(0.0, 0.0), (2.0, 0.0)]),
            line(2, &[12, 13], &[(1.0, 0.0), (1.0, 1.0)]),
        ];
        let ordered = detector
            .self_intersections(&lines, &index_of(&lines))
            .ordered(1e-9);
        assert_eq!(ordered[&1][0].position.fraction, 0.5);
        assert_eq!(ordered[&2][0].position, LinePosition::vertex(0));
    }

    #[rstest]
    fn points_are_ordered_along_feature(detector: IntersectionDetector) {
        let lines = vec![
            line(1, &[10, 11], &[(0.0, 0.0), (4.0, 0.0)]),
            line(2, &[12, 13], &[(3.0, -1.0), (3.0, 1.0)]),
            line(3, &[14, 15], &[(1.0, -1.0), (1.0, 1.0)]),
        ];
        let ordered = detector
            .self_intersections(&lines, &index_of(&lines))
            .ordered(1e-9);
        let partners: Vec<_> = ordered[&1].iter().map(|p| p.partner).collect();
        assert_eq!(partners, vec![3, 2]);
    }

    #[rstest]
    fn coincident_points_keep_first_discovery(detector: IntersectionDetector) {
        let lines = vec![
            line(1, &[10, 11], &[(0.0, 0.0), (2.0, 0.0)]),
            line(2, &[12, 13], &[(1.0, -1.0), (1.0, 1.0)]),
            line(3, &[14, 15], &[(0.0, -1.0), (2.0, 1.0)]),
        ];
        let ordered = detector
            .self_intersections(&lines, &index_of(&lines))
            .ordered(1e-9);
        assert_eq!(ordered[&1].len(), 1);
        assert_eq!(ordered[&1][0].partner, 2);
    }

    #[rstest]
    fn buffer_snaps_near_miss_onto_other_layer(detector: IntersectionDetector) {
        let lines = vec![line(1, &[10, 11], &[(0.0, 0.0), (0.0, 0.95)])];
        let others = vec![line(50, &[20, 21], &[(-1.0, 1.0), (1.0, 1.0)])];
        let found = detector.cross_intersections(&lines, &others, &index_of(&others), 0.1);
        assert_eq!(found.len(), 1);
        let location = found.crossings()[0].location;
        assert!((location.x - 0.0).abs() < 1e-12);
        assert!((location.y - 1.0).abs() < 1e-12);
        let ordered = found.ordered(1e-9);
        assert_eq!(ordered[&1][0].position, LinePosition::vertex(1));
        assert_eq!(ordered[&50][0].position.segment, 0);
    }

    #[rstest]
    fn gap_wider_than_buffer_is_ignored(detector: IntersectionDetector) {
        let lines = vec![line(1, &[10, 11], &[(0.0, 0.0), (0.0, 0.5)])];
        let others = vec![line(50, &[20, 21], &[(-1.0, 1.0), (1.0, 1.0)])];
        assert!(
            detector
                .cross_intersections(&lines, &others, &index_of(&others), 0.1)
                .is_empty()
        );
    }

    #[rstest]
    fn self_mode_ignores_buffer_distance(detector: IntersectionDetector) {
        let lines = vec![
            line(1, &[10, 11], &[(0.0, 0.0), (0.0, 0.95)]),
            line(2, &[12, 13], &[(-1.0, 1.0), (1.0, 1.0)]),
        ];
        assert!(detector.self_intersections(&lines, &index_of(&lines)).is_empty());
    }
}
