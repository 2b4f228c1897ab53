//! Keeps grouping objects consistent with edited members.
//!
//! Grouping objects are fetched lazily from the base map the first time an
//! edited element points at them and then held in a run-local cache, so
//! several edits to the same object accumulate on one copy and bump its
//! version once.

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::changeset::{Action, ChangeSet};
use crate::error::ChangeError;
use crate::model::{ElementId, ElementRef, GroupingObject, Member};
use crate::source::BaseMap;

/// Outcome of one membership edit on one grouping object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationEdit {
    /// Members were replaced or inserted.
    Rewritten {
        /// Edited grouping object.
        relation: ElementId,
        /// Number of member entries that matched.
        matched: usize,
    },
    /// The object no longer references the element; nothing changed.
    Stale {
        /// Grouping object returned by the reverse lookup.
        relation: ElementId,
    },
    /// The object already lists the member; nothing changed.
    AlreadyMember {
        /// Grouping object that was asked to take the member.
        relation: ElementId,
    },
    /// The requested grouping object is not in the base map.
    Missing {
        /// Requested grouping object.
        relation: ElementId,
    },
}

/// Rewrites grouping objects that reference edited elements.
///
/// # Examples
/// ```
/// use osmweave_core::{
///     ChangeSet, ElementKind, ElementRef, GroupingObject, Member, RelationUpdater, Tags,
///     test_support::MemorySource,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut base = MemorySource::default();
/// base.add_relation(GroupingObject::new(
///     1,
///     vec![Member::new(ElementKind::Linear, 10, "outer")],
///     Tags::new(),
///     3,
/// ));
/// let mut changes = ChangeSet::default();
/// let mut updater = RelationUpdater::new(&base);
/// updater.modify_relations_with_object(ElementRef::linear(10), &[101, 102], &mut changes)?;
/// let rewritten = updater.relation(1).unwrap();
/// assert_eq!(rewritten.version, 4);
/// assert_eq!(rewritten.members.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RelationUpdater<B> {
    base: B,
    cache: IndexMap<ElementId, GroupingObject>,
    bumped: HashSet<ElementId>,
    modified: IndexSet<ElementId>,
}

impl<B: BaseMap> RelationUpdater<B> {
    /// Create an updater reading grouping objects from `base`.
    pub fn new(base: B) -> Self {
        Self {
            base,
            cache: IndexMap::new(),
            bumped: HashSet::new(),
            modified: IndexSet::new(),
        }
    }

    /// Grouping objects referencing any element modified or deleted in
    /// `changes`, each listed once.
    ///
    /// Objects that `changes` deletes are skipped. Returned objects reflect
    /// edits already made in this run.
    ///
    /// # Errors
    /// Surfaces base-map failures.
    pub fn get_modified_relations(&mut self, changes: &ChangeSet) -> Result<Vec<GroupingObject>, ChangeError> {
        let mut found = IndexSet::new();
        for element in changes
            .refs(Action::Modify)
            .into_iter()
            .chain(changes.refs(Action::Delete))
        {
            found.extend(self.lookup(element, changes)?);
        }
        Ok(found
            .into_iter()
            .filter_map(|id| self.cache.get(&id).cloned())
            .collect())
    }

    /// Replace every member pointing at `old` with members for `new_ids`.
    ///
    /// Replacement members keep the kind and role of the entry they replace
    /// and occupy its position. An empty `new_ids` removes the entry. Every
    /// edited object is recorded as modified in `changes`.
    ///
    /// # Errors
    /// Surfaces base-map failures and change-set conflicts.
    pub fn modify_relations_with_object(
        &mut self,
        old: ElementRef,
        new_ids: &[ElementId],
        changes: &mut ChangeSet,
    ) -> Result<Vec<RelationEdit>, ChangeError> {
        let mut edits = Vec::new();
        for relation in self.lookup(old, changes)? {
            let Some(object) = self.cache.get_mut(&relation) else {
                continue;
            };
            let matched = replace_members(object, old, new_ids);
            if matched == 0 {
                debug!("relation {relation} no longer references {old}; skipped");
                edits.push(RelationEdit::Stale { relation });
                continue;
            }
            self.commit(relation, changes)?;
            edits.push(RelationEdit::Rewritten { relation, matched });
        }
        Ok(edits)
    }

    /// Insert `member` into grouping object `relation`.
    ///
    /// The member goes before the first entry referencing `before` when
    /// given and present, otherwise at the end. An object that already
    /// references the member's element is left alone.
    ///
    /// # Errors
    /// Surfaces base-map failures and change-set conflicts.
    pub fn add_member(
        &mut self,
        relation: ElementId,
        member: Member,
        before: Option<ElementRef>,
        changes: &mut ChangeSet,
    ) -> Result<RelationEdit, ChangeError> {
        if !self.cache.contains_key(&relation) {
            match self.base.relation(relation)? {
                Some(object) => {
                    self.cache.insert(relation, object);
                }
                None => {
                    debug!("relation {relation} not found; {} not added", member.element());
                    return Ok(RelationEdit::Missing { relation });
                }
            }
        }
        let Some(object) = self.cache.get_mut(&relation) else {
            return Ok(RelationEdit::Missing { relation });
        };
        if object.references(member.element()) {
            return Ok(RelationEdit::AlreadyMember { relation });
        }
        let index = before
            .and_then(|target| object.members.iter().position(|m| m.element() == target))
            .unwrap_or(object.members.len());
        object.members.insert(index, member);
        self.commit(relation, changes)?;
        Ok(RelationEdit::Rewritten {
            relation,
            matched: 1,
        })
    }

    /// Current state of a cached grouping object.
    #[must_use]
    pub fn relation(&self, id: ElementId) -> Option<&GroupingObject> {
        self.cache.get(&id)
    }

    /// Grouping objects edited so far, in first-edit order.
    pub fn modified(&self) -> impl Iterator<Item = &GroupingObject> {
        self.modified.iter().filter_map(|id| self.cache.get(id))
    }

    fn lookup(&mut self, element: ElementRef, changes: &ChangeSet) -> Result<Vec<ElementId>, ChangeError> {
        let mut ids = Vec::new();
        for object in self.base.relations_referencing(element)? {
            if changes.action_of(ElementRef::grouping(object.id)) == Some(Action::Delete) {
                debug!("relation {} is being deleted; lookup for {element} skipped", object.id);
                continue;
            }
            ids.push(object.id);
            self.cache.entry(object.id).or_insert(object);
        }
        Ok(ids)
    }

    fn commit(&mut self, relation: ElementId, changes: &mut ChangeSet) -> Result<(), ChangeError> {
        let Some(object) = self.cache.get_mut(&relation) else {
            return Ok(());
        };
        if self.bumped.insert(relation) {
            object.version += 1;
        }
        self.modified.insert(relation);
        changes.modify(object.clone())
    }
}

fn replace_members(object: &mut GroupingObject, old: ElementRef, new_ids: &[ElementId]) -> usize {
    let mut matched = 0;
    let mut members = Vec::with_capacity(object.members.len() + new_ids.len());
    for member in object.members.drain(..) {
        if member.element() == old {
            matched += 1;
            members.extend(
                new_ids
                    .iter()
                    .map(|id| Member::new(member.kind, *id, member.role.clone())),
            );
        } else {
            members.push(member);
        }
    }
    object.members = members;
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementKind, LinearFeature, Tags};
    use crate::test_support::MemorySource;
    use rstest::{fixture, rstest};

    #[fixture]
    fn base() -> MemorySource {
        let mut base = MemorySource::default();
        base.add_relation(GroupingObject::new(
            1,
            vec![
                Member::new(ElementKind::Linear, 10, "outer"),
                Member::new(ElementKind::Linear, 11, "inner"),
            ],
            Tags::new(),
            1,
        ));
        base.add_relation(GroupingObject::new(
            2,
            vec![
                Member::new(ElementKind::Point, 10, "stop"),
                Member::new(ElementKind::Linear, 10, ""),
                Member::new(ElementKind::Linear, 12, ""),
            ],
            Tags::new(),
            7,
        ));
        base
    }

    fn roles(object: &GroupingObject) -> Vec<(ElementKind, ElementId, &str)> {
        object
            .members
            .iter()
            .map(|m| (m.kind, m.id, m.role.as_str()))
            .collect()
    }

    #[rstest]
    fn split_member_is_replaced_in_place(base: MemorySource) {
        let mut changes = ChangeSet::default();
        let mut updater = RelationUpdater::new(&base);
        updater
            .modify_relations_with_object(ElementRef::linear(10), &[101, 102], &mut changes)
            .unwrap();
        let first = updater.relation(1).unwrap();
        assert_eq!(
            roles(first),
            vec![
                (ElementKind::Linear, 101, "outer"),
                (ElementKind::Linear, 102, "outer"),
                (ElementKind::Linear, 11, "inner"),
            ]
        );
        assert_eq!(first.version, 2);
        let second = updater.relation(2).unwrap();
        assert_eq!(second.members[0], Member::new(ElementKind::Point, 10, "stop"));
        assert_eq!(changes.count(Action::Modify), 2);
    }

    #[rstest]
    fn version_is_bumped_once_per_run(base: MemorySource) {
        let mut changes = ChangeSet::default();
        let mut updater = RelationUpdater::new(&base);
        updater
            .modify_relations_with_object(ElementRef::linear(10), &[101], &mut changes)
            .unwrap();
        updater
            .modify_relations_with_object(ElementRef::linear(12), &[120, 121], &mut changes)
            .unwrap();
        let object = updater.relation(2).unwrap();
        assert_eq!(object.version, 8);
        assert_eq!(object.members.len(), 4);
    }

    #[rstest]
    fn stale_lookup_is_a_noop(base: MemorySource) {
        let mut changes = ChangeSet::default();
        let mut updater = RelationUpdater::new(&base);
        updater
            .modify_relations_with_object(ElementRef::linear(11), &[111], &mut changes)
            .unwrap();
        let edits = updater
            .modify_relations_with_object(ElementRef::linear(11), &[112], &mut changes)
            .unwrap();
        assert_eq!(edits, vec![RelationEdit::Stale { relation: 1 }]);
        assert_eq!(updater.relation(1).unwrap().version, 2);
    }

    #[rstest]
    fn empty_replacement_removes_member(base: MemorySource) {
        let mut changes = ChangeSet::default();
        let mut updater = RelationUpdater::new(&base);
        updater
            .modify_relations_with_object(ElementRef::linear(11), &[], &mut changes)
            .unwrap();
        assert_eq!(
            roles(updater.relation(1).unwrap()),
            vec![(ElementKind::Linear, 10, "outer")]
        );
    }

    #[rstest]
    fn modified_relations_are_deduplicated(base: MemorySource) {
        let mut changes = ChangeSet::default();
        changes
            .delete(LinearFeature::new(10, vec![1, 2], Tags::new()).unwrap())
            .unwrap();
        changes
            .delete(LinearFeature::new(12, vec![3, 4], Tags::new()).unwrap())
            .unwrap();
        let mut updater = RelationUpdater::new(&base);
        let found: Vec<_> = updater
            .get_modified_relations(&changes)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(found, vec![1, 2]);
    }

    #[rstest]
    fn deleted_relations_are_not_rewritten(base: MemorySource) {
        let mut changes = ChangeSet::default();
        changes
            .delete(GroupingObject::new(1, Vec::new(), Tags::new(), 1))
            .unwrap();
        let mut updater = RelationUpdater::new(&base);
        let edits = updater
            .modify_relations_with_object(ElementRef::linear(11), &[111], &mut changes)
            .unwrap();
        assert!(edits.is_empty());
    }

    #[rstest]
    fn members_can_be_added_before_an_anchor(base: MemorySource) {
        let mut changes = ChangeSet::default();
        let mut updater = RelationUpdater::new(&base);
        updater
            .add_member(
                1,
                Member::new(ElementKind::Linear, -5, ""),
                Some(ElementRef::linear(11)),
                &mut changes,
            )
            .unwrap();
        let missing = updater
            .add_member(99, Member::new(ElementKind::Linear, -5, ""), None, &mut changes)
            .unwrap();
        assert_eq!(
            roles(updater.relation(1).unwrap()),
            vec![
                (ElementKind::Linear, 10, "outer"),
                (ElementKind::Linear, -5, ""),
                (ElementKind::Linear, 11, "inner"),
            ]
        );
        assert_eq!(missing, RelationEdit::Missing { relation: 99 });
    }

    #[rstest]
    fn adding_an_existing_member_changes_nothing(base: MemorySource) {
        let mut changes = ChangeSet::default();
        let mut updater = RelationUpdater::new(&base);
        let edit = updater
            .add_member(1, Member::new(ElementKind::Linear, 11, ""), None, &mut changes)
            .unwrap();
        assert_eq!(edit, RelationEdit::AlreadyMember { relation: 1 });
        assert!(changes.is_empty());
        assert_eq!(updater.relation(1).unwrap().version, 1);
    }
}
