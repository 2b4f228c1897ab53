//! Bounding-box index over linear features.
//!
//! Entries are `(identifier, bounding box)` pairs held in an R\*-tree. Range
//! queries return candidates only; exact geometry tests happen in the
//! intersection detector.

use std::collections::HashMap;

use geo::{Coord, Rect};
use rstar::{AABB, RTree, RTreeObject};

use crate::model::ElementId;

#[derive(Debug, Clone, PartialEq)]
struct IndexedBounds {
    id: ElementId,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedBounds {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn to_envelope(bounds: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([bounds.min().x, bounds.min().y], [bounds.max().x, bounds.max().y])
}

/// Grow `bounds` by `distance` on every side.
///
/// # Examples
/// ```
/// use geo::{Coord, Rect};
/// use osmweave_core::spatial::expand;
///
/// let grown = expand(&Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }), 0.5);
/// assert_eq!(grown.min(), Coord { x: -0.5, y: -0.5 });
/// ```
#[must_use]
pub fn expand(bounds: &Rect<f64>, distance: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: bounds.min().x - distance,
            y: bounds.min().y - distance,
        },
        Coord {
            x: bounds.max().x + distance,
            y: bounds.max().y + distance,
        },
    )
}

/// In-memory R\*-tree keyed by feature identifier.
///
/// Each identifier holds at most one entry; inserting an identifier again
/// replaces its previous bounding box.
///
/// # Examples
/// ```
/// use geo::{Coord, Rect};
/// use osmweave_core::SpatialIndex;
///
/// let index = SpatialIndex::build([
///     (1, Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 2.0 })),
///     (2, Rect::new(Coord { x: 5.0, y: 5.0 }, Coord { x: 6.0, y: 6.0 })),
/// ]);
/// let hits = index.query(&Rect::new(Coord { x: 1.0, y: 1.0 }, Coord { x: 3.0, y: 3.0 }));
/// assert_eq!(hits, vec![1]);
/// ```
#[derive(Debug, Default)]
pub struct SpatialIndex {
    tree: RTree<IndexedBounds>,
    envelopes: HashMap<ElementId, AABB<[f64; 2]>>,
}

impl SpatialIndex {
    /// Bulk-load an index from `(identifier, bounds)` pairs.
    ///
    /// Later pairs win when an identifier repeats.
    pub fn build<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (ElementId, Rect<f64>)>,
    {
        let mut envelopes = HashMap::new();
        for (id, bounds) in entries {
            envelopes.insert(id, to_envelope(&bounds));
        }
        let items = envelopes
            .iter()
            .map(|(id, envelope)| IndexedBounds {
                id: *id,
                envelope: *envelope,
            })
            .collect();
        Self {
            tree: RTree::bulk_load(items),
            envelopes,
        }
    }

    /// Identifiers whose bounding box overlaps `bounds`, in no particular order.
    #[must_use]
    pub fn query(&self, bounds: &Rect<f64>) -> Vec<ElementId> {
        self.tree
            .locate_in_envelope_intersecting(&to_envelope(bounds))
            .map(|entry| entry.id)
            .collect()
    }

    /// Add or replace the entry for `id`.
    pub fn insert(&mut self, id: ElementId, bounds: Rect<f64>) {
        self.remove(id);
        let envelope = to_envelope(&bounds);
        self.envelopes.insert(id, envelope);
        self.tree.insert(IndexedBounds { id, envelope });
    }

    /// Remove the entry for `id`, returning whether one existed.
    pub fn remove(&mut self, id: ElementId) -> bool {
        match self.envelopes.remove(&id) {
            Some(envelope) => self.tree.remove(&IndexedBounds { id, envelope }).is_some(),
            None => false,
        }
    }

    /// Swap the entry for a split feature with entries for its children.
    pub fn replace<I>(&mut self, old: ElementId, children: I)
    where
        I: IntoIterator<Item = (ElementId, Rect<f64>)>,
    {
        self.remove(old);
        for (id, bounds) in children {
            self.insert(id, bounds);
        }
    }

    /// Whether `id` has an entry.
    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.envelopes.contains_key(&id)
    }

    /// Number of indexed features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
    }

    #[fixture]
    fn index() -> SpatialIndex {
        SpatialIndex::build([
            (1, rect(0.0, 0.0, 2.0, 2.0)),
            (2, rect(1.0, 1.0, 3.0, 3.0)),
            (3, rect(10.0, 10.0, 11.0, 11.0)),
        ])
    }

    fn sorted(mut ids: Vec<ElementId>) -> Vec<ElementId> {
        ids.sort_unstable();
        ids
    }

    #[rstest]
    fn query_returns_overlapping_candidates(index: SpatialIndex) {
        assert_eq!(sorted(index.query(&rect(1.5, 1.5, 1.6, 1.6))), vec![1, 2]);
        assert!(index.query(&rect(5.0, 5.0, 6.0, 6.0)).is_empty());
    }

    #[rstest]
    fn touching_boxes_count_as_overlap(index: SpatialIndex) {
        assert_eq!(index.query(&rect(11.0, 11.0, 12.0, 12.0)), vec![3]);
    }

    #[rstest]
    fn replace_swaps_parent_for_children(mut index: SpatialIndex) {
        index.replace(1, [(-5, rect(0.0, 0.0, 1.0, 1.0)), (-6, rect(1.0, 1.0, 2.0, 2.0))]);
        assert!(!index.contains(1));
        assert_eq!(index.len(), 4);
        assert_eq!(sorted(index.query(&rect(0.1, 0.1, 0.2, 0.2))), vec![-5]);
    }

    #[rstest]
    fn insert_replaces_existing_entry(mut index: SpatialIndex) {
        index.insert(3, rect(20.0, 20.0, 21.0, 21.0));
        assert_eq!(index.len(), 3);
        assert!(index.query(&rect(10.5, 10.5, 10.6, 10.6)).is_empty());
        assert_eq!(index.query(&rect(20.5, 20.5, 20.6, 20.6)), vec![3]);
    }

    #[rstest]
    fn removing_unknown_id_is_noop(mut index: SpatialIndex) {
        assert!(!index.remove(42));
        assert_eq!(index.len(), 3);
    }

    #[rstest]
    fn empty_index_reports_empty() {
        assert!(SpatialIndex::default().is_empty());
    }
}
