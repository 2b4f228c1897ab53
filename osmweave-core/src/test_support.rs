//! In-memory collaborators used by unit, behaviour, and downstream tests.

use std::collections::BTreeMap;

use geo::{Intersects, Rect};
use indexmap::IndexMap;

use crate::changeset::OrderedChanges;
use crate::geometry::bounds_of;
use crate::model::{Element, ElementId, ElementKind, ElementRef, GroupingObject, LinearFeature, Point};
use crate::source::{
    BaseMap, FeatureSource, LayerInfo, SourceError, SourceGeometry, SourceRecord,
};

/// In-memory [`FeatureSource`] and [`BaseMap`].
///
/// Lookups scan linearly and are intended only for small datasets.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    layers: IndexMap<String, (LayerInfo, Vec<SourceRecord>)>,
    points: BTreeMap<ElementId, Point>,
    linears: BTreeMap<ElementId, LinearFeature>,
    relations: BTreeMap<ElementId, GroupingObject>,
}

impl MemorySource {
    /// Add or replace a layer with the given EPSG code and records.
    pub fn add_layer<I>(&mut self, name: &str, epsg: u32, records: I)
    where
        I: IntoIterator<Item = SourceRecord>,
    {
        self.layers.insert(
            name.to_owned(),
            (LayerInfo::new(name, epsg), records.into_iter().collect()),
        );
    }

    /// Builder form of [`Self::add_layer`].
    #[must_use]
    pub fn with_layer<I>(mut self, name: &str, epsg: u32, records: I) -> Self
    where
        I: IntoIterator<Item = SourceRecord>,
    {
        self.add_layer(name, epsg, records);
        self
    }

    /// Publish a point in the base map.
    pub fn add_point(&mut self, point: Point) {
        self.points.insert(point.id, point);
    }

    /// Publish a linear feature in the base map.
    pub fn add_linear(&mut self, linear: LinearFeature) {
        self.linears.insert(linear.id, linear);
    }

    /// Publish a grouping object in the base map.
    pub fn add_relation(&mut self, relation: GroupingObject) {
        self.relations.insert(relation.id, relation);
    }

    /// Apply emitted changes to the base map as a server would.
    pub fn apply(&mut self, changes: &OrderedChanges) {
        for element in changes.create.iter().chain(&changes.modify) {
            match element.clone() {
                Element::Point(p) => self.add_point(p),
                Element::Linear(l) => self.add_linear(l),
                Element::Grouping(g) => self.add_relation(g),
            }
        }
        for element in &changes.delete {
            match element {
                Element::Point(p) => {
                    self.points.remove(&p.id);
                }
                Element::Linear(l) => {
                    self.linears.remove(&l.id);
                }
                Element::Grouping(g) => {
                    self.relations.remove(&g.id);
                }
            }
        }
    }

    fn layer(&self, name: &str) -> Result<&(LayerInfo, Vec<SourceRecord>), SourceError> {
        self.layers.get(name).ok_or_else(|| SourceError::MissingLayer {
            layer: name.to_owned(),
        })
    }
}

fn record_bounds(record: &SourceRecord) -> Rect<f64> {
    match &record.geometry {
        SourceGeometry::Point(c) => Rect::new(*c, *c),
        SourceGeometry::Line(vertices) => {
            bounds_of(&vertices.iter().map(|v| v.location).collect::<Vec<_>>())
        }
        SourceGeometry::Polygon(rings) => {
            bounds_of(&rings.iter().flatten().map(|v| v.location).collect::<Vec<_>>())
        }
    }
}

impl FeatureSource for MemorySource {
    fn layer_info(&self, layer: &str) -> Result<LayerInfo, SourceError> {
        Ok(self.layer(layer)?.0.clone())
    }

    fn features(&self, layer: &str) -> Result<Vec<SourceRecord>, SourceError> {
        Ok(self.layer(layer)?.1.clone())
    }

    fn features_intersecting(&self, layer: &str, bounds: &Rect<f64>) -> Result<Vec<SourceRecord>, SourceError> {
        Ok(self
            .layer(layer)?
            .1
            .iter()
            // `Intersects` treats touching rectangles as overlapping.
            .filter(|record| bounds.intersects(&record_bounds(record)))
            .cloned()
            .collect())
    }
}

impl BaseMap for MemorySource {
    fn point(&self, id: ElementId) -> Result<Option<Point>, SourceError> {
        Ok(self.points.get(&id).cloned())
    }

    fn linear(&self, id: ElementId) -> Result<Option<LinearFeature>, SourceError> {
        Ok(self.linears.get(&id).cloned())
    }

    fn relation(&self, id: ElementId) -> Result<Option<GroupingObject>, SourceError> {
        Ok(self.relations.get(&id).cloned())
    }

    fn relations_referencing(&self, element: ElementRef) -> Result<Vec<GroupingObject>, SourceError> {
        Ok(self
            .relations
            .values()
            .filter(|r| r.references(element))
            .cloned()
            .collect())
    }

    fn max_id(&self, kind: ElementKind) -> Result<Option<ElementId>, SourceError> {
        Ok(match kind {
            ElementKind::Point => self.points.keys().next_back(),
            ElementKind::Linear => self.linears.keys().next_back(),
            ElementKind::Grouping => self.relations.keys().next_back(),
        }
        .copied())
    }
}
