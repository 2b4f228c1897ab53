//! Location-keyed registry of point identifiers.
//!
//! Every vertex of every feature taking part in a run is registered by its
//! quantised location. Intersection points that land on a registered
//! location reuse that identifier; other locations receive a synthetic
//! identifier once and share it between every feature crossing there.

use std::collections::HashMap;

use geo::Coord;

use crate::ids::IdAllocator;
use crate::model::ElementId;

/// Quantised location used as a registry key.
pub type LocationKey = (i64, i64);

/// Quantise `location` onto a grid of `tolerance`-sized cells.
///
/// Cell indices saturate at the `i64` range; `NaN` maps to cell 0.
#[must_use]
pub fn location_key(location: Coord<f64>, tolerance: f64) -> LocationKey {
    (
        (location.x / tolerance).round() as i64,
        (location.y / tolerance).round() as i64,
    )
}

/// A resolved junction point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Junction {
    /// Point identifier.
    pub id: ElementId,
    /// Whether this call allocated the identifier.
    pub created: bool,
}

/// Registry mapping locations to point identifiers.
#[derive(Debug, Clone)]
pub struct JunctionRegistry {
    tolerance: f64,
    points: HashMap<LocationKey, ElementId>,
}

impl JunctionRegistry {
    /// Create an empty registry keyed at `tolerance` resolution.
    ///
    /// `tolerance` must be positive.
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            points: HashMap::new(),
        }
    }

    /// Register an existing point. The first registration of a location wins.
    pub fn register(&mut self, location: Coord<f64>, id: ElementId) {
        self.points
            .entry(location_key(location, self.tolerance))
            .or_insert(id);
    }

    /// Identifier registered at `location`, if any.
    #[must_use]
    pub fn lookup(&self, location: Coord<f64>) -> Option<ElementId> {
        self.points
            .get(&location_key(location, self.tolerance))
            .copied()
    }

    /// Resolve `location` to a point, allocating a synthetic identifier when
    /// nothing is registered there and `allocate` is set.
    pub fn resolve(
        &mut self,
        location: Coord<f64>,
        ids: &mut IdAllocator,
        allocate: bool,
    ) -> Option<Junction> {
        let key = location_key(location, self.tolerance);
        if let Some(id) = self.points.get(&key) {
            return Some(Junction {
                id: *id,
                created: false,
            });
        }
        if !allocate {
            return None;
        }
        let id = ids.next_synthetic_point_id();
        self.points.insert(key, id);
        Some(Junction { id, created: true })
    }

    /// Number of registered locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
