//! Splits work lines and records every resulting element in a change set.

use std::collections::BTreeMap;

use geo::Coord;
use indexmap::IndexMap;

use super::GenerationStats;
use super::intake::{Origin, PolygonGroup, WorkLine, WorkPoint};
use crate::changeset::ChangeSet;
use crate::config::GeneratorConfig;
use crate::crs::Crs;
use crate::error::ChangeError;
use crate::export::ExportedElements;
use crate::geometry::{SplitPoint, distance};
use crate::ids::IdAllocator;
use crate::junction::JunctionRegistry;
use crate::model::{
    Element, ElementId, ElementKind, ElementRef, GroupingObject, LinearFeature, Member, Point, Tags,
};
use crate::split::{FeatureSplitter, SplitOutcome};

/// Smallest coordinate difference the target dataset stores, in degrees.
const COORDINATE_PRECISION: f64 = 1e-7;

/// Mutable state of one generation run after intake.
pub(super) struct Run<'a> {
    pub(super) layer: &'a str,
    pub(super) crs: Crs,
    pub(super) config: &'a GeneratorConfig,
    pub(super) ids: IdAllocator,
    pub(super) changes: ChangeSet,
    /// Published linear features replaced by new ones, with the
    /// replacements in travel order.
    pub(super) replacements: Vec<(ElementRef, Vec<ElementId>)>,
    /// Grouping objects to join, paired with the joining element.
    pub(super) joins: Vec<(ElementId, ElementRef)>,
    /// Elements produced for each source record.
    pub(super) exported: ExportedElements,
    pub(super) stats: GenerationStats,
}

impl Run<'_> {
    /// Record the untagged points allocated for new vertices.
    pub(super) fn create_vertices(&mut self, vertices: &IndexMap<ElementId, Coord<f64>>) -> Result<(), ChangeError> {
        for (id, location) in vertices {
            let point = Point::new(*id, self.crs.to_wgs84(*location), Tags::new());
            self.changes.create(point)?;
        }
        Ok(())
    }

    /// Split every line at its intersection points.
    ///
    /// Other-layer lines without intersection points are left whole.
    pub(super) fn split_lines(
        &mut self,
        lines: &[WorkLine],
        ordered: &BTreeMap<ElementId, Vec<SplitPoint>>,
    ) -> Result<Vec<SplitOutcome>, ChangeError> {
        let tolerance = self.config.coincidence_tolerance;
        let mut junctions = JunctionRegistry::new(tolerance);
        for line in lines {
            for (id, location) in line.polyline.nodes.iter().zip(&line.polyline.coords) {
                junctions.register(*location, *id);
            }
        }
        let splitter = FeatureSplitter::new(self.config.max_points_per_feature, tolerance);
        let allocate = !self.config.skip_nodes;
        let mut outcomes = Vec::with_capacity(lines.len());
        for line in lines {
            let points = ordered.get(&line.polyline.id).map_or(&[][..], Vec::as_slice);
            let outcome = if line.origin == Origin::Other && points.is_empty() {
                SplitOutcome {
                    children: vec![line.polyline.nodes.clone()],
                    created_points: Vec::new(),
                }
            } else {
                splitter.split(&line.polyline, points, &mut junctions, &mut self.ids, allocate)
            };
            self.stats.split_features += usize::from(outcome.is_split());
            self.stats.created_points += outcome.created_points.len();
            for (id, location) in &outcome.created_points {
                let point = Point::new(*id, self.crs.to_wgs84(*location), Tags::new());
                self.changes.create(point)?;
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Record one line's children and return their identifiers in travel
    /// order.
    pub(super) fn classify_line(&mut self, line: &WorkLine, outcome: &SplitOutcome) -> Result<Vec<ElementId>, ChangeError> {
        let id = line.polyline.id;
        let final_ids = match &line.published {
            None => {
                let mut final_ids = Vec::with_capacity(outcome.children.len());
                for (k, nodes) in outcome.children.iter().enumerate() {
                    let child = if k == 0 {
                        id
                    } else {
                        self.ids.next_feature_id(ElementKind::Linear)
                    };
                    let feature = self.feature(child, nodes.clone(), line.tags.clone())?;
                    self.changes.create(feature)?;
                    final_ids.push(child);
                }
                final_ids
            }
            Some(published) => {
                let unchanged =
                    outcome.children.len() == 1 && published.nodes.as_ref() == outcome.children.first();
                if unchanged && line.origin == Origin::Other {
                    return Ok(vec![id]);
                }
                if unchanged && self.config.modify_only {
                    if published.tags.as_ref() != Some(&line.tags) {
                        let feature = self
                            .feature(id, line.polyline.nodes.clone(), line.tags.clone())?
                            .with_version(published.version + 1);
                        self.changes.modify(feature)?;
                    }
                    vec![id]
                } else {
                    let nodes = published
                        .nodes
                        .clone()
                        .unwrap_or_else(|| line.polyline.nodes.clone());
                    let tags = published.tags.clone().unwrap_or_else(|| line.tags.clone());
                    let original = self.feature(id, nodes, tags)?.with_version(published.version);
                    self.changes.delete(original)?;
                    let mut final_ids = Vec::with_capacity(outcome.children.len());
                    for nodes in &outcome.children {
                        let child = self.ids.next_feature_id(ElementKind::Linear);
                        let feature = self.feature(child, nodes.clone(), line.tags.clone())?;
                        self.changes.create(feature)?;
                        final_ids.push(child);
                    }
                    self.replacements
                        .push((ElementRef::linear(id), final_ids.clone()));
                    final_ids
                }
            }
        };
        if line.origin != Origin::Other {
            for relation in &line.memberships {
                self.joins.extend(
                    final_ids
                        .iter()
                        .map(|child| (*relation, ElementRef::linear(*child))),
                );
            }
        }
        if let Some(key) = line.key {
            for child in &final_ids {
                self.exported.record(key, ElementRef::linear(*child));
            }
        }
        Ok(final_ids)
    }

    /// Record a point record as created, modified, or untouched.
    pub(super) fn classify_point(&mut self, point: &WorkPoint) -> Result<(), ChangeError> {
        let location = self.crs.to_wgs84(point.location);
        match &point.published {
            None => self
                .changes
                .create(Point::new(point.id, location, point.tags.clone()))?,
            Some(published) => {
                let moved = published
                    .location
                    .is_none_or(|before| distance(before, location) >= COORDINATE_PRECISION);
                if moved || published.tags.as_ref() != Some(&point.tags) {
                    let updated = Point::new(point.id, location, point.tags.clone()).with_version(published.version + 1);
                    self.changes.modify(updated)?;
                }
            }
        }
        let element = ElementRef::point(point.id);
        self.joins
            .extend(point.memberships.iter().map(|relation| (*relation, element)));
        self.exported.record(point.key, element);
        Ok(())
    }

    /// Create a multipolygon for every polygon with holes or with a ring
    /// split into several lines.
    ///
    /// Tags of a single split ring move from its lines to the multipolygon.
    pub(super) fn classify_group(
        &mut self,
        group: &PolygonGroup,
        lines: &[WorkLine],
        final_ids: &[Vec<ElementId>],
    ) -> Result<(), ChangeError> {
        let members: Vec<Member> = group
            .rings
            .iter()
            .filter_map(|ring| Some((lines.get(*ring)?, final_ids.get(*ring)?)))
            .flat_map(|(line, ids)| {
                let role = match line.origin {
                    Origin::Ring { role, .. } => role,
                    Origin::Primary | Origin::Other => "outer",
                };
                ids.iter()
                    .map(move |id| Member::new(ElementKind::Linear, *id, role))
            })
            .collect();
        if !group.holes && members.len() <= 1 {
            return Ok(());
        }
        if !group.holes {
            for member in &members {
                if let Some(Element::Linear(line)) = self.changes.get(member.element()).cloned() {
                    self.changes.modify(LinearFeature {
                        tags: Tags::new(),
                        ..line
                    })?;
                }
            }
        }
        let id = self.ids.next_feature_id(ElementKind::Grouping);
        let mut tags = group.tags.clone();
        tags.insert("type".to_owned(), "multipolygon".to_owned());
        self.changes
            .create(GroupingObject::new(id, members, tags, 1))?;
        let element = ElementRef::grouping(id);
        self.joins
            .extend(group.memberships.iter().map(|relation| (*relation, element)));
        if let Some(key) = group.key {
            self.exported.record(key, element);
        }
        Ok(())
    }

    fn feature(&self, id: ElementId, nodes: Vec<ElementId>, tags: Tags) -> Result<LinearFeature, ChangeError> {
        let points = nodes.len();
        LinearFeature::new(id, nodes, tags).map_err(|_| ChangeError::MalformedGeometry {
            layer: self.layer.to_owned(),
            feature: id.to_string(),
            points,
        })
    }
}
