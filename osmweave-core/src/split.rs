//! Partition linear features at intersection points.

use geo::Coord;
use log::debug;

use crate::geometry::{Polyline, SplitPoint, distance};
use crate::ids::IdAllocator;
use crate::junction::JunctionRegistry;
use crate::model::ElementId;

/// Result of splitting one feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitOutcome {
    /// Point sequences of the children, in travel order.
    pub children: Vec<Vec<ElementId>>,
    /// Points allocated while splitting, with native coordinates.
    pub created_points: Vec<(ElementId, Coord<f64>)>,
}

impl SplitOutcome {
    /// Whether the feature was cut into more than one child.
    #[must_use]
    pub fn is_split(&self) -> bool {
        self.children.len() > 1
    }

    /// Point sequence rebuilt from the children, shared endpoints removed.
    #[must_use]
    pub fn reconstructed(&self) -> Vec<ElementId> {
        let mut nodes: Vec<ElementId> = Vec::new();
        for child in &self.children {
            let skip = usize::from(!nodes.is_empty());
            nodes.extend(child.iter().skip(skip));
        }
        nodes
    }
}

/// Splits features at intersection points and at a point-count limit.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osmweave_core::{FeatureSplitter, IdAllocator, JunctionRegistry, Polyline};
///
/// let line = Polyline::new(
///     1,
///     vec![10, 11, 12],
///     vec![
///         Coord { x: 0.0, y: 0.0 },
///         Coord { x: 1.0, y: 1.0 },
///         Coord { x: 2.0, y: 2.0 },
///     ],
/// );
/// let splitter = FeatureSplitter::new(Some(2), 1e-9);
/// let mut junctions = JunctionRegistry::new(1e-9);
/// let mut ids = IdAllocator::default();
/// let outcome = splitter.split(&line, &[], &mut junctions, &mut ids, true);
/// assert_eq!(outcome.children, vec![vec![10, 11], vec![11, 12]]);
/// assert!(outcome.created_points.is_empty());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FeatureSplitter {
    max_points: Option<usize>,
    tolerance: f64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    id: ElementId,
    cut: bool,
}

impl FeatureSplitter {
    /// Create a splitter.
    ///
    /// `max_points` below two is treated as no limit.
    #[must_use]
    pub fn new(max_points: Option<usize>, tolerance: f64) -> Self {
        Self {
            max_points: max_points.filter(|max| *max >= 2),
            tolerance,
        }
    }

    /// Split `line` at `points`, which must be ordered along the line.
    ///
    /// Points coinciding with a vertex of `line` or with a point already in
    /// `junctions` reuse that identifier. Other points receive a synthetic
    /// identifier when `allocate` is set and are skipped otherwise.
    pub fn split(
        &self,
        line: &Polyline,
        points: &[SplitPoint],
        junctions: &mut JunctionRegistry,
        ids: &mut IdAllocator,
        allocate: bool,
    ) -> SplitOutcome {
        let mut cuts = vec![false; line.nodes.len()];
        let mut inserted: Vec<Vec<(ElementId, Coord<f64>, bool)>> = vec![Vec::new(); line.nodes.len()];

        for point in points {
            if let Some(cut) = self.own_vertex(line, point).and_then(|vertex| cuts.get_mut(vertex)) {
                *cut = true;
                continue;
            }
            let Some(junction) = junctions.resolve(point.location, ids, allocate) else {
                debug!(
                    "feature {}: no point available at ({}, {}); not split there",
                    line.id, point.location.x, point.location.y
                );
                continue;
            };
            let segment = point.position.segment;
            let target = if line.nodes.get(segment) == Some(&junction.id) {
                cuts.get_mut(segment)
            } else if line.nodes.get(segment + 1) == Some(&junction.id) {
                cuts.get_mut(segment + 1)
            } else {
                if let Some(slot) = inserted.get_mut(segment) {
                    slot.push((junction.id, point.location, junction.created));
                }
                None
            };
            if let Some(cut) = target {
                *cut = true;
            }
        }

        let mut slots: Vec<Slot> = Vec::with_capacity(line.nodes.len());
        let mut created_points = Vec::new();
        for ((id, cut), extra) in line.nodes.iter().zip(&cuts).zip(&inserted) {
            push_slot(&mut slots, Slot { id: *id, cut: *cut });
            for (point_id, location, created) in extra {
                if *created {
                    created_points.push((*point_id, *location));
                }
                push_slot(
                    &mut slots,
                    Slot {
                        id: *point_id,
                        cut: true,
                    },
                );
            }
        }

        let children: Vec<Vec<ElementId>> = cut_at_marks(&slots)
            .into_iter()
            .flat_map(|child| self.limit(child))
            .collect();
        debug!(
            "feature {}: {} intersection point(s), {} child feature(s), {} new point(s)",
            line.id,
            points.len(),
            children.len(),
            created_points.len()
        );
        SplitOutcome {
            children,
            created_points,
        }
    }

    fn own_vertex(&self, line: &Polyline, point: &SplitPoint) -> Option<usize> {
        if let Some(vertex) = point.position.as_vertex() {
            return Some(vertex);
        }
        let segment = point.position.segment;
        [segment, segment + 1].into_iter().find(|k| {
            line.coords
                .get(*k)
                .is_some_and(|c| distance(*c, point.location) <= self.tolerance)
        })
    }

    /// Break `nodes` into the fewest children of at most `max_points` points,
    /// spreading segments as evenly as possible.
    fn limit(&self, nodes: Vec<ElementId>) -> Vec<Vec<ElementId>> {
        let Some(max) = self.max_points else {
            return vec![nodes];
        };
        if nodes.len() <= max {
            return vec![nodes];
        }
        let segments = nodes.len() - 1;
        let pieces = segments.div_ceil(max - 1);
        let base = segments / pieces;
        let extra = segments % pieces;
        let mut children = Vec::with_capacity(pieces);
        let mut start = 0;
        for piece in 0..pieces {
            let length = base + usize::from(piece < extra);
            if let Some(child) = nodes.get(start..=start + length) {
                children.push(child.to_vec());
            }
            start += length;
        }
        children
    }
}

fn push_slot(slots: &mut Vec<Slot>, slot: Slot) {
    match slots.last_mut() {
        Some(last) if last.id == slot.id => last.cut |= slot.cut,
        _ => slots.push(slot),
    }
}

fn cut_at_marks(slots: &[Slot]) -> Vec<Vec<ElementId>> {
    let mut children = Vec::new();
    let mut current: Vec<ElementId> = Vec::new();
    let last = slots.len().saturating_sub(1);
    for (i, slot) in slots.iter().enumerate() {
        current.push(slot.id);
        if slot.cut && i > 0 && i < last {
            children.push(std::mem::replace(&mut current, vec![slot.id]));
        }
    }
    if current.len() >= 2 {
        children.push(current);
    }
    children
}
