//! Create/modify/delete buckets produced by a run.
//!
//! Each bucket is partitioned by element kind and keeps insertion order, so
//! the emitted document is reproducible. An element reference lives in at
//! most one bucket.

use std::fmt;

use indexmap::IndexMap;

use crate::error::ChangeError;
use crate::model::{Element, ElementId, ElementKind, ElementRef};

/// The three change actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Action {
    /// New element.
    Create,
    /// Changed element with a bumped version.
    Modify,
    /// Removed element.
    Delete,
}

impl Action {
    /// Lowercase action name as used by osmChange.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn slot(kind: ElementKind) -> usize {
    match kind {
        ElementKind::Point => 0,
        ElementKind::Linear => 1,
        ElementKind::Grouping => 2,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Bucket {
    by_kind: [IndexMap<ElementId, Element>; 3],
}

impl Bucket {
    fn get(&self, element: ElementRef) -> Option<&Element> {
        self.by_kind[slot(element.kind)].get(&element.id)
    }

    fn contains(&self, element: ElementRef) -> bool {
        self.get(element).is_some()
    }

    fn insert(&mut self, element: Element) {
        self.by_kind[slot(element.kind())].insert(element.id(), element);
    }

    fn len(&self) -> usize {
        self.by_kind.iter().map(IndexMap::len).sum()
    }

    fn kind(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.by_kind[slot(kind)].values()
    }
}

/// Buckets in document order, ready for serialisation.
///
/// Creations and modifications list points, then linear features, then
/// grouping objects. Deletions list the kinds in reverse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedChanges {
    /// Elements to create.
    pub create: Vec<Element>,
    /// Elements to modify.
    pub modify: Vec<Element>,
    /// Elements to delete.
    pub delete: Vec<Element>,
}

impl OrderedChanges {
    /// Whether every bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.modify.is_empty() && self.delete.is_empty()
    }
}

/// Accumulated changes for one run.
///
/// # Examples
/// ```
/// use osmweave_core::{Action, ChangeSet, ElementRef, LinearFeature, Tags};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut changes = ChangeSet::default();
/// changes.delete(LinearFeature::new(10, vec![1, 2], Tags::new())?)?;
/// assert_eq!(changes.action_of(ElementRef::linear(10)), Some(Action::Delete));
/// assert!(changes.modify(LinearFeature::new(10, vec![1, 2], Tags::new())?).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    create: Bucket,
    modify: Bucket,
    delete: Bucket,
}

impl ChangeSet {
    /// Record a new element.
    ///
    /// # Errors
    /// Returns [`ChangeError::IdentifierConflict`] when another kind already
    /// created the same identifier, and [`ChangeError::ActionConflict`] when
    /// the element is already recorded under any action.
    pub fn create(&mut self, element: impl Into<Element>) -> Result<(), ChangeError> {
        let element = element.into();
        let target = element.element_ref();
        if let Some(existing) = ElementKind::ALL
            .into_iter()
            .filter(|kind| *kind != target.kind)
            .find(|kind| {
                self.create.contains(ElementRef {
                    kind: *kind,
                    id: target.id,
                })
            })
        {
            return Err(ChangeError::IdentifierConflict {
                id: target.id,
                existing,
                requested: target.kind,
            });
        }
        if let Some(existing) = self.action_of(target) {
            return Err(ChangeError::ActionConflict {
                element: target,
                existing,
                requested: Action::Create,
            });
        }
        self.create.insert(element);
        Ok(())
    }

    /// Record a modification, replacing any earlier one.
    ///
    /// Modifying an element created in this run updates the creation instead.
    ///
    /// # Errors
    /// Returns [`ChangeError::ActionConflict`] when the element is recorded
    /// as deleted.
    pub fn modify(&mut self, element: impl Into<Element>) -> Result<(), ChangeError> {
        let element = element.into();
        let target = element.element_ref();
        if self.delete.contains(target) {
            return Err(ChangeError::ActionConflict {
                element: target,
                existing: Action::Delete,
                requested: Action::Modify,
            });
        }
        if self.create.contains(target) {
            self.create.insert(element);
        } else {
            self.modify.insert(element);
        }
        Ok(())
    }

    /// Record a deletion.
    ///
    /// # Errors
    /// Returns [`ChangeError::ActionConflict`] when the element is recorded
    /// as created or modified.
    pub fn delete(&mut self, element: impl Into<Element>) -> Result<(), ChangeError> {
        let element = element.into();
        let target = element.element_ref();
        for (bucket, action) in [(&self.create, Action::Create), (&self.modify, Action::Modify)] {
            if bucket.contains(target) {
                return Err(ChangeError::ActionConflict {
                    element: target,
                    existing: action,
                    requested: Action::Delete,
                });
            }
        }
        self.delete.insert(element);
        Ok(())
    }

    /// Bucket holding `element`, if any.
    #[must_use]
    pub fn action_of(&self, element: ElementRef) -> Option<Action> {
        [
            (&self.create, Action::Create),
            (&self.modify, Action::Modify),
            (&self.delete, Action::Delete),
        ]
        .into_iter()
        .find_map(|(bucket, action)| bucket.contains(element).then_some(action))
    }

    /// Recorded element for `element`, whichever bucket holds it.
    #[must_use]
    pub fn get(&self, element: ElementRef) -> Option<&Element> {
        self.create
            .get(element)
            .or_else(|| self.modify.get(element))
            .or_else(|| self.delete.get(element))
    }

    /// References recorded under `action`, points first.
    #[must_use]
    pub fn refs(&self, action: Action) -> Vec<ElementRef> {
        let bucket = self.bucket(action);
        ElementKind::ALL
            .into_iter()
            .flat_map(|kind| bucket.kind(kind).map(Element::element_ref))
            .collect()
    }

    /// Elements of `kind` recorded under `action`, in insertion order.
    pub fn elements(&self, action: Action, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.bucket(action).kind(kind)
    }

    /// Number of elements recorded under `action`.
    #[must_use]
    pub fn count(&self, action: Action) -> usize {
        self.bucket(action).len()
    }

    /// Total number of recorded elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.create.len() + self.modify.len() + self.delete.len()
    }

    /// Whether nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold `other` into this set, applying the same rules as recording.
    ///
    /// # Errors
    /// Propagates the first conflict encountered.
    pub fn merge(&mut self, other: Self) -> Result<(), ChangeError> {
        let ordered = other.into_ordered();
        for element in ordered.create {
            self.create(element)?;
        }
        for element in ordered.modify {
            self.modify(element)?;
        }
        for element in ordered.delete {
            self.delete(element)?;
        }
        Ok(())
    }

    /// Consume the set, yielding buckets in document order.
    #[must_use]
    pub fn into_ordered(self) -> OrderedChanges {
        let forward = |bucket: Bucket| -> Vec<Element> {
            let [points, linears, groupings] = bucket.by_kind;
            points
                .into_values()
                .chain(linears.into_values())
                .chain(groupings.into_values())
                .collect()
        };
        let [points, linears, groupings] = self.delete.by_kind;
        let delete = groupings
            .into_values()
            .chain(linears.into_values())
            .chain(points.into_values())
            .collect();
        OrderedChanges {
            create: forward(self.create),
            modify: forward(self.modify),
            delete,
        }
    }

    const fn bucket(&self, action: Action) -> &Bucket {
        match action {
            Action::Create => &self.create,
            Action::Modify => &self.modify,
            Action::Delete => &self.delete,
        }
    }
}
