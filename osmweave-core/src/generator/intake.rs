//! Turns source records into work items with resolved point identifiers.
//!
//! Vertices keep the identifier the source supplies, adopt the base map's
//! point identifiers positionally when the counts agree, and otherwise become
//! new points. New points at the same location are merged so features
//! imported together share their junctions.

use std::collections::HashMap;

use geo::Coord;
use indexmap::IndexMap;
use log::{debug, warn};

use crate::config::GeneratorConfig;
use crate::error::ChangeError;
use crate::export::SourceKey;
use crate::geometry::Polyline;
use crate::ids::IdAllocator;
use crate::junction::{LocationKey, location_key};
use crate::model::{ElementId, ElementKind, Tags};
use crate::source::{BaseMap, SourceGeometry, SourceRecord, SourceVertex};

/// Published state of a linear feature.
#[derive(Debug, Clone)]
pub(super) struct PublishedLine {
    pub(super) version: u32,
    pub(super) nodes: Option<Vec<ElementId>>,
    pub(super) tags: Option<Tags>,
}

/// Published state of a point.
#[derive(Debug, Clone)]
pub(super) struct PublishedPoint {
    pub(super) version: u32,
    pub(super) location: Option<Coord<f64>>,
    pub(super) tags: Option<Tags>,
}

/// Where a work line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Origin {
    Primary,
    Other,
    Ring { group: usize, role: &'static str },
}

#[derive(Debug, Clone)]
pub(super) struct WorkLine {
    /// Record the line was read from; `None` for other-layer lines.
    pub(super) key: Option<SourceKey>,
    pub(super) polyline: Polyline,
    pub(super) tags: Tags,
    pub(super) published: Option<PublishedLine>,
    pub(super) memberships: Vec<ElementId>,
    pub(super) origin: Origin,
}

#[derive(Debug, Clone)]
pub(super) struct WorkPoint {
    pub(super) key: SourceKey,
    pub(super) id: ElementId,
    pub(super) location: Coord<f64>,
    pub(super) tags: Tags,
    pub(super) published: Option<PublishedPoint>,
    pub(super) memberships: Vec<ElementId>,
}

/// Rings of one polygon record.
#[derive(Debug, Clone)]
pub(super) struct PolygonGroup {
    pub(super) key: Option<SourceKey>,
    pub(super) tags: Tags,
    pub(super) memberships: Vec<ElementId>,
    pub(super) rings: Vec<usize>,
    pub(super) holes: bool,
}

struct LineSpec<'r> {
    key: Option<SourceKey>,
    label: &'r str,
    id: Option<ElementId>,
    version: Option<u32>,
    tags: Tags,
    memberships: Vec<ElementId>,
    origin: Origin,
}

pub(super) struct Intake<'a, B> {
    base: &'a B,
    config: &'a GeneratorConfig,
    layer: &'a str,
    claimed: HashMap<ElementId, ElementKind>,
    new_vertices: HashMap<LocationKey, ElementId>,
    pub(super) new_points: IndexMap<ElementId, Coord<f64>>,
    pub(super) lines: Vec<WorkLine>,
    pub(super) points: Vec<WorkPoint>,
    pub(super) groups: Vec<PolygonGroup>,
}

impl<'a, B: BaseMap> Intake<'a, B> {
    pub(super) fn new(base: &'a B, config: &'a GeneratorConfig, layer: &'a str) -> Self {
        Self {
            base,
            config,
            layer,
            claimed: HashMap::new(),
            new_vertices: HashMap::new(),
            new_points: IndexMap::new(),
            lines: Vec::new(),
            points: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Accept one record from the primary layer.
    pub(super) fn primary(
        &mut self,
        ids: &mut IdAllocator,
        position: usize,
        record: SourceRecord,
    ) -> Result<(), ChangeError> {
        let key = SourceKey::of(&record);
        let label = record
            .id
            .map_or_else(|| format!("#{position}"), |id| id.to_string());
        let (tags, memberships) = split_memberships(record.tags, self.config.membership_tag.as_deref());
        match record.geometry {
            SourceGeometry::Point(location) => {
                let point = self.point(ids, key, (record.id, record.version), location, tags)?;
                self.points.push(WorkPoint { memberships, ..point });
                Ok(())
            }
            SourceGeometry::Line(vertices) => {
                if let Some(id) = record.id {
                    self.claim(id, ElementKind::Linear)?;
                }
                let spec = LineSpec {
                    key: Some(key),
                    label: &label,
                    id: record.id,
                    version: record.version,
                    tags,
                    memberships,
                    origin: Origin::Primary,
                };
                let line = self.line(ids, vertices, spec)?;
                self.lines.push(line);
                Ok(())
            }
            SourceGeometry::Polygon(rings) => {
                let spec = LineSpec {
                    key: Some(key),
                    label: &label,
                    id: record.id,
                    version: record.version,
                    tags,
                    memberships,
                    origin: Origin::Primary,
                };
                self.polygon(ids, rings, spec)
            }
        }
    }

    /// Accept a published line from the other layer.
    ///
    /// Records without an identifier, non-line records, and features already
    /// taken from the primary layer are skipped.
    pub(super) fn other(&mut self, ids: &mut IdAllocator, record: SourceRecord) -> Result<(), ChangeError> {
        let (Some(id), SourceGeometry::Line(vertices)) = (record.id, record.geometry) else {
            debug!("other layer: skipped a record without an identifier or line geometry");
            return Ok(());
        };
        if self.claimed.contains_key(&id) {
            debug!("other layer: feature {id} already taken from {}", self.layer);
            return Ok(());
        }
        self.claim(id, ElementKind::Linear)?;
        let label = id.to_string();
        let spec = LineSpec {
            key: None,
            label: &label,
            id: Some(id),
            version: Some(record.version.unwrap_or(1)),
            tags: record.tags,
            memberships: Vec::new(),
            origin: Origin::Other,
        };
        let line = self.line(ids, vertices, spec)?;
        self.lines.push(line);
        Ok(())
    }

    fn claim(&mut self, id: ElementId, kind: ElementKind) -> Result<(), ChangeError> {
        match self.claimed.insert(id, kind) {
            Some(existing) => Err(ChangeError::IdentifierConflict {
                id,
                existing,
                requested: kind,
            }),
            None => Ok(()),
        }
    }

    fn point(
        &mut self,
        ids: &mut IdAllocator,
        key: SourceKey,
        (id, version): (Option<ElementId>, Option<u32>),
        location: Coord<f64>,
        tags: Tags,
    ) -> Result<WorkPoint, ChangeError> {
        let published = match id {
            Some(id) => {
                self.claim(id, ElementKind::Point)?;
                let base = self.base.point(id)?;
                match (base, version) {
                    (Some(p), _) => Some(PublishedPoint {
                        version: p.version,
                        location: Some(p.location),
                        tags: Some(p.tags),
                    }),
                    (None, Some(version)) => Some(PublishedPoint {
                        version,
                        location: None,
                        tags: None,
                    }),
                    (None, None) => None,
                }
            }
            None => None,
        };
        Ok(WorkPoint {
            key,
            id: id.unwrap_or_else(|| ids.next_feature_id(ElementKind::Point)),
            location,
            tags,
            published,
            memberships: Vec::new(),
        })
    }

    /// A single ring becomes one closed line; rings with holes become
    /// untagged lines grouped under a new multipolygon.
    fn polygon(
        &mut self,
        ids: &mut IdAllocator,
        rings: Vec<Vec<SourceVertex>>,
        spec: LineSpec<'_>,
    ) -> Result<(), ChangeError> {
        let group = self.groups.len();
        if rings.len() <= 1 {
            if let Some(id) = spec.id {
                self.claim(id, ElementKind::Linear)?;
            }
            let exterior = rings.into_iter().next().unwrap_or_default();
            let key = spec.key;
            let tags = spec.tags.clone();
            let ring = LineSpec {
                origin: Origin::Ring {
                    group,
                    role: "outer",
                },
                ..spec
            };
            let line = self.line(ids, exterior, ring)?;
            self.groups.push(PolygonGroup {
                key,
                tags,
                memberships: Vec::new(),
                rings: vec![self.lines.len()],
                holes: false,
            });
            self.lines.push(line);
            return Ok(());
        }
        if let Some(id) = spec.id {
            warn!("polygon {id} in {} has interior rings; importing it as a new multipolygon", self.layer);
        }
        let mut members = Vec::with_capacity(rings.len());
        for (index, ring) in rings.into_iter().enumerate() {
            let role = if index == 0 { "outer" } else { "inner" };
            let ring_spec = LineSpec {
                key: spec.key,
                label: spec.label,
                id: None,
                version: None,
                tags: Tags::new(),
                memberships: Vec::new(),
                origin: Origin::Ring { group, role },
            };
            let line = self.line(ids, ring, ring_spec)?;
            members.push(self.lines.len());
            self.lines.push(line);
        }
        self.groups.push(PolygonGroup {
            key: spec.key,
            tags: spec.tags,
            memberships: spec.memberships,
            rings: members,
            holes: true,
        });
        Ok(())
    }

    fn line(
        &mut self,
        ids: &mut IdAllocator,
        vertices: Vec<SourceVertex>,
        spec: LineSpec<'_>,
    ) -> Result<WorkLine, ChangeError> {
        let tolerance = self.config.coincidence_tolerance;
        let vertices = collapse(vertices, tolerance);
        if vertices.len() < 2 {
            return Err(self.malformed(spec.label, vertices.len()));
        }
        let base = match spec.id {
            Some(id) => self.base.linear(id)?,
            None => None,
        };
        let published = match (spec.id, &base, spec.version) {
            (Some(_), Some(line), _) => Some(PublishedLine {
                version: line.version,
                nodes: Some(line.nodes.clone()),
                tags: Some(line.tags.clone()),
            }),
            (Some(_), None, Some(version)) => Some(PublishedLine {
                version,
                nodes: vertices.iter().map(|v| v.id).collect(),
                tags: None,
            }),
            _ => None,
        };
        let adopted = base
            .as_ref()
            .map(|line| line.nodes.as_slice())
            .filter(|nodes| nodes.len() == vertices.len());
        if let (Some(id), Some(line), None) = (spec.id, &base, adopted)
            && vertices.iter().any(|v| v.id.is_none())
        {
            warn!(
                "feature {id} in {} has {} vertices but the base map lists {} points; allocating new points",
                self.layer,
                vertices.len(),
                line.nodes.len()
            );
        }

        let mut nodes: Vec<ElementId> = Vec::with_capacity(vertices.len());
        let mut coords: Vec<Coord<f64>> = Vec::with_capacity(vertices.len());
        for (k, vertex) in vertices.iter().enumerate() {
            let id = match vertex
                .id
                .or_else(|| adopted.and_then(|base_nodes| base_nodes.get(k).copied()))
            {
                Some(id) => id,
                None => self.new_vertex(ids, vertex.location, tolerance),
            };
            if nodes.last() != Some(&id) {
                nodes.push(id);
                coords.push(vertex.location);
            }
        }
        if nodes.len() < 2 {
            return Err(self.malformed(spec.label, nodes.len()));
        }
        let id = spec
            .id
            .unwrap_or_else(|| ids.next_feature_id(ElementKind::Linear));
        Ok(WorkLine {
            key: spec.key,
            polyline: Polyline::new(id, nodes, coords),
            tags: spec.tags,
            published,
            memberships: spec.memberships,
            origin: spec.origin,
        })
    }

    fn new_vertex(&mut self, ids: &mut IdAllocator, location: Coord<f64>, tolerance: f64) -> ElementId {
        let key = location_key(location, tolerance);
        if let Some(id) = self.new_vertices.get(&key) {
            return *id;
        }
        let id = ids.next_feature_id(ElementKind::Point);
        self.new_vertices.insert(key, id);
        self.new_points.insert(id, location);
        id
    }

    fn malformed(&self, label: &str, points: usize) -> ChangeError {
        ChangeError::MalformedGeometry {
            layer: self.layer.to_owned(),
            feature: label.to_owned(),
            points,
        }
    }
}

/// Drop vertices repeating their predecessor by identifier or location.
fn collapse(vertices: Vec<SourceVertex>, tolerance: f64) -> Vec<SourceVertex> {
    let mut kept: Vec<SourceVertex> = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        let repeat = kept.last().is_some_and(|prev| match (prev.id, vertex.id) {
            (Some(a), Some(b)) => a == b,
            _ => location_key(prev.location, tolerance) == location_key(vertex.location, tolerance),
        });
        if !repeat {
            kept.push(vertex);
        }
    }
    kept
}

/// Remove membership tags, returning the remaining tags and the listed
/// grouping-object identifiers in order.
pub(super) fn split_memberships(mut tags: Tags, prefix: Option<&str>) -> (Tags, Vec<ElementId>) {
    let Some(prefix) = prefix else {
        return (tags, Vec::new());
    };
    let keys: Vec<String> = tags
        .keys()
        .filter(|key| key.starts_with(prefix))
        .cloned()
        .collect();
    let mut relations = Vec::new();
    for key in keys {
        let Some(value) = tags.remove(&key) else {
            continue;
        };
        for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse::<ElementId>() {
                Ok(id) => relations.push(id),
                Err(_) => warn!("ignoring membership entry {part:?} in tag {key}"),
            }
        }
    }
    (tags, relations)
}
