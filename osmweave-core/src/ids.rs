//! Identifier allocation for synthetic points and imported features.
//!
//! A single [`IdAllocator`] is created per run and handed by `&mut` to every
//! component that needs fresh identifiers. Synthetic points always receive
//! negative identifiers counting down from the configured floor. Imported
//! features receive either confirmed identifiers counting up from the
//! configured offset or provisional negative identifiers drawn from the same
//! descending sequence, so no `(id, kind)` pair is ever handed out twice.

use crate::model::{ElementId, ElementKind};

/// Selects how identifiers for imported features are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum IdentifierMode {
    /// Negative identifiers pending server assignment.
    #[default]
    Provisional,
    /// Non-negative identifiers confirmed by the caller.
    Confirmed,
}

/// Per-run identifier allocator.
///
/// # Examples
/// ```
/// use osmweave_core::{ElementKind, IdAllocator, IdentifierMode};
///
/// let mut ids = IdAllocator::new(0, 100, IdentifierMode::Confirmed);
/// assert_eq!(ids.next_synthetic_point_id(), -1);
/// assert_eq!(ids.next_synthetic_point_id(), -2);
/// assert_eq!(ids.next_feature_id(ElementKind::Linear), 100);
/// assert_eq!(ids.next_feature_id(ElementKind::Point), 101);
/// ```
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next_negative: ElementId,
    next_positive: ElementId,
    mode: IdentifierMode,
}

impl IdAllocator {
    /// Create an allocator.
    ///
    /// `synthetic_floor` is clamped to zero when positive so synthetic
    /// identifiers stay negative. Callers must pick an offset above every
    /// identifier already present in the target dataset.
    #[must_use]
    pub fn new(synthetic_floor: ElementId, id_offset: ElementId, mode: IdentifierMode) -> Self {
        Self {
            next_negative: synthetic_floor.min(0) - 1,
            next_positive: id_offset,
            mode,
        }
    }

    /// The configured identifier mode.
    #[must_use]
    pub const fn mode(&self) -> IdentifierMode {
        self.mode
    }

    /// Return the next synthetic point identifier.
    pub fn next_synthetic_point_id(&mut self) -> ElementId {
        let id = self.next_negative;
        self.next_negative -= 1;
        id
    }

    /// Return the next identifier for an imported element of `kind`.
    ///
    /// Confirmed identifiers share one ascending counter across kinds.
    /// Provisional identifiers share the descending synthetic counter.
    pub fn next_feature_id(&mut self, _kind: ElementKind) -> ElementId {
        match self.mode {
            IdentifierMode::Confirmed => {
                let id = self.next_positive;
                self.next_positive += 1;
                id
            }
            IdentifierMode::Provisional => self.next_synthetic_point_id(),
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(0, 0, IdentifierMode::Provisional)
    }
}
