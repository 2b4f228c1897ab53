//! Deletes elements a previous run exported that the source no longer has.

use std::collections::{BTreeSet, HashSet};

use geo::Coord;
use log::{debug, info, warn};

use super::ChangeGenerator;
use crate::changeset::{Action, ChangeSet};
use crate::error::ChangeError;
use crate::export::{ExportedElements, SourceKey};
use crate::model::{ElementId, ElementKind, ElementRef, GroupingObject, LinearFeature, Point, Tags};
use crate::relations::RelationUpdater;
use crate::source::{BaseMap, FeatureSource};

impl<S: FeatureSource, B: BaseMap> ChangeGenerator<S, B> {
    /// Keys of every record currently in `layer`.
    ///
    /// These are the keys [`ChangeGenerator::generate_changes`] files its
    /// exported elements under, so an unchanged layer yields the same set.
    ///
    /// # Errors
    /// Surfaces collaborator failures.
    pub fn current_keys(&self, layer: &str) -> Result<BTreeSet<SourceKey>, ChangeError> {
        Ok(self.source.features(layer)?.iter().map(SourceKey::of).collect())
    }

    /// Delete the elements `previous` exported for records missing from
    /// `current`.
    ///
    /// An element still exported for a record in `current` is kept even if
    /// a dropped record listed it too. Versions come from the base map when
    /// it knows the element and default to 1 otherwise. With
    /// `delete_points` set, points of deleted linear features are deleted
    /// too unless a kept element still uses them. Grouping objects lose
    /// their members for deleted elements.
    ///
    /// # Errors
    /// Surfaces collaborator failures and change-set conflicts.
    ///
    /// # Examples
    /// ```
    /// use std::collections::BTreeSet;
    ///
    /// use osmweave_core::{
    ///     Action, ChangeGenerator, ElementRef, ExportedElements, SourceKey, test_support::MemorySource,
    /// };
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let source = MemorySource::default();
    /// let generator = ChangeGenerator::new(&source, &source);
    /// let kept = SourceKey::Element(ElementRef::linear(5));
    /// let dropped = SourceKey::Content(0x2a);
    /// let previous: ExportedElements =
    ///     [(kept, ElementRef::linear(5)), (dropped, ElementRef::linear(4))].into_iter().collect();
    /// let changes = generator.generate_deletions(&previous, &BTreeSet::from([kept]))?;
    /// assert_eq!(changes.refs(Action::Delete), vec![ElementRef::linear(4)]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn generate_deletions(
        &self,
        previous: &ExportedElements,
        current: &BTreeSet<SourceKey>,
    ) -> Result<ChangeSet, ChangeError> {
        let mut changes = ChangeSet::default();
        let mut deleted = Vec::new();
        let mut orphaned: Vec<ElementId> = Vec::new();
        for element in previous.dropped(current) {
            if element.id < 0 {
                warn!("{element} has a provisional identifier; its deletion only applies before upload");
            }
            if let Some(nodes) = self.delete_element(element, &mut changes)? {
                orphaned.extend(nodes);
            }
            deleted.push(element);
        }

        if self.config.delete_points && !orphaned.is_empty() {
            let kept = self.kept_points(&previous.retained(current))?;
            for node in orphaned {
                let element = ElementRef::point(node);
                if kept.contains(&node) || changes.action_of(element).is_some() {
                    continue;
                }
                match self.base.point(node)? {
                    Some(point) => {
                        changes.delete(point)?;
                        deleted.push(element);
                    }
                    None => debug!("point {node} is not in the base map; not deleted"),
                }
            }
        }

        let mut updater = RelationUpdater::new(&self.base);
        for element in &deleted {
            updater.modify_relations_with_object(*element, &[], &mut changes)?;
        }
        info!(
            "deletion pass: {} of {} source record(s) dropped; {} element(s) deleted, {} relation(s) updated",
            previous.keys().filter(|key| !current.contains(key)).count(),
            previous.len(),
            changes.count(Action::Delete),
            updater.modified().count()
        );
        Ok(changes)
    }

    /// Record `element` as deleted, returning the points of a deleted linear
    /// feature when the base map knows them.
    fn delete_element(&self, element: ElementRef, changes: &mut ChangeSet) -> Result<Option<Vec<ElementId>>, ChangeError> {
        let id = element.id;
        match element.kind {
            ElementKind::Point => {
                let point = self
                    .base
                    .point(id)?
                    .unwrap_or_else(|| Point::new(id, Coord { x: 0.0, y: 0.0 }, Tags::new()));
                changes.delete(point)?;
                Ok(None)
            }
            ElementKind::Linear => match self.base.linear(id)? {
                Some(line) => {
                    let nodes = line.nodes.clone();
                    changes.delete(line)?;
                    Ok(Some(nodes))
                }
                None => {
                    changes.delete(LinearFeature {
                        id,
                        nodes: Vec::new(),
                        tags: Tags::new(),
                        version: 1,
                    })?;
                    Ok(None)
                }
            },
            ElementKind::Grouping => {
                let relation = self
                    .base
                    .relation(id)?
                    .unwrap_or_else(|| GroupingObject::new(id, Vec::new(), Tags::new(), 1));
                changes.delete(relation)?;
                Ok(None)
            }
        }
    }

    /// Points listed in `kept` or used by its linear features.
    fn kept_points(&self, kept_elements: &BTreeSet<ElementRef>) -> Result<HashSet<ElementId>, ChangeError> {
        let mut kept = HashSet::new();
        for element in kept_elements {
            match element.kind {
                ElementKind::Point => {
                    kept.insert(element.id);
                }
                ElementKind::Linear => {
                    if let Some(line) = self.base.linear(element.id)? {
                        kept.extend(line.nodes);
                    }
                }
                ElementKind::Grouping => {}
            }
        }
        Ok(kept)
    }
}
