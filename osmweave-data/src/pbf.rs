//! In-memory base map loaded from an OSM PBF extract.

use std::collections::{BTreeMap, HashMap};

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use log::{debug, info, warn};
use osmpbf::{Element, ElementReader, RelMemberType};
use osmweave_core::{
    BaseMap, ElementId, ElementKind, ElementRef, GroupingObject, LinearFeature, Member, Point, SourceError, Tags,
};
use thiserror::Error;

/// Errors returned when loading a PBF base map.
#[derive(Debug, Error)]
pub enum BaseMapError {
    /// The file could not be opened.
    #[error("failed to open OSM PBF file at {path:?}")]
    Open {
        /// Path of the extract.
        path: Utf8PathBuf,
        /// Source error returned by `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
    /// The file could not be decoded.
    #[error("failed to decode OSM PBF data at {path:?}")]
    Decode {
        /// Path of the extract.
        path: Utf8PathBuf,
        /// Source error returned by `osmpbf`.
        #[source]
        source: osmpbf::Error,
    },
}

/// Element counts of a loaded base map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaseMapSummary {
    /// Points loaded.
    pub points: usize,
    /// Linear features loaded.
    pub linears: usize,
    /// Grouping objects loaded.
    pub relations: usize,
    /// Ways dropped because they had fewer than two points.
    pub degenerate_ways: usize,
}

/// Published elements held in memory and indexed by identifier.
///
/// Grouping objects are additionally indexed by the elements they
/// reference so that [`BaseMap::relations_referencing`] is a lookup.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use osmweave_core::BaseMap;
/// use osmweave_data::PbfBaseMap;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let base = PbfBaseMap::load(Utf8Path::new("region.osm.pbf"))?;
/// if let Some(way) = base.linear(42)? {
///     println!("way 42 has {} nodes", way.nodes.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PbfBaseMap {
    points: HashMap<ElementId, Point>,
    linears: HashMap<ElementId, LinearFeature>,
    relations: BTreeMap<ElementId, GroupingObject>,
    referenced_by: HashMap<ElementRef, Vec<ElementId>>,
    highest_way: Option<ElementId>,
    summary: BaseMapSummary,
}

impl PbfBaseMap {
    /// Read every node, way, and relation of the extract at `path`.
    ///
    /// Blocks are decoded in parallel and merged.
    ///
    /// # Errors
    /// Returns [`BaseMapError::Open`] when the file cannot be opened and
    /// [`BaseMapError::Decode`] when its contents are not valid PBF.
    pub fn load(path: &Utf8Path) -> Result<Self, BaseMapError> {
        let reader = ElementReader::from_path(path.as_std_path()).map_err(|source| BaseMapError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let builder = reader
            .par_map_reduce(
                |element| {
                    let mut builder = BaseMapBuilder::default();
                    builder.process_element(&element);
                    builder
                },
                BaseMapBuilder::default,
                BaseMapBuilder::combine,
            )
            .map_err(|source| BaseMapError::Decode {
                path: path.to_path_buf(),
                source,
            })?;
        let base = builder.build();
        info!(
            "loaded base map {path}: {} point(s), {} way(s), {} relation(s)",
            base.summary.points, base.summary.linears, base.summary.relations
        );
        Ok(base)
    }

    /// Counts of what was loaded.
    #[must_use]
    pub const fn summary(&self) -> BaseMapSummary {
        self.summary
    }
}

impl BaseMap for PbfBaseMap {
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
            .referenced_by
            .get(&element)
            .into_iter()
            .flatten()
            .filter_map(|id| self.relations.get(id).cloned())
            .collect())
    }

    fn max_id(&self, kind: ElementKind) -> Result<Option<ElementId>, SourceError> {
        Ok(match kind {
            ElementKind::Point => self.points.keys().max().copied(),
            ElementKind::Linear => self.highest_way,
            ElementKind::Grouping => self.relations.keys().next_back().copied(),
        })
    }
}

/// Accumulates decoded elements from one or more PBF blocks.
#[derive(Debug, Default)]
struct BaseMapBuilder {
    points: Vec<Point>,
    linears: Vec<LinearFeature>,
    relations: Vec<GroupingObject>,
    degenerate_ways: usize,
    highest_degenerate: Option<ElementId>,
}

fn collect_tags<'a>(tags: impl IntoIterator<Item = (&'a str, &'a str)>) -> Tags {
    tags.into_iter()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect()
}

/// Versions missing from the extract, or outside `u32`, read as 1.
fn version_or_default(version: Option<i32>) -> u32 {
    version.and_then(|v| u32::try_from(v).ok()).filter(|v| *v > 0).unwrap_or(1)
}

const fn member_kind(member_type: &RelMemberType) -> ElementKind {
    match member_type {
        RelMemberType::Node => ElementKind::Point,
        RelMemberType::Way => ElementKind::Linear,
        RelMemberType::Relation => ElementKind::Grouping,
    }
}

impl BaseMapBuilder {
    fn process_element(&mut self, element: &Element<'_>) {
        match element {
            Element::Node(node) => self.record_point(
                node.id(),
                Coord {
                    x: node.lon(),
                    y: node.lat(),
                },
                collect_tags(node.tags()),
                node.info().version(),
            ),
            Element::DenseNode(node) => self.record_point(
                node.id(),
                Coord {
                    x: node.lon(),
                    y: node.lat(),
                },
                collect_tags(node.tags()),
                node.info().map(|info| info.version()),
            ),
            Element::Way(way) => self.record_way(
                way.id(),
                way.refs().collect(),
                collect_tags(way.tags()),
                way.info().version(),
            ),
            Element::Relation(relation) => {
                let members = relation
                    .members()
                    .map(|member| {
                        let role = member.role().unwrap_or_else(|err| {
                            warn!("relation {}: unreadable member role ({err}); using empty role", relation.id());
                            ""
                        });
                        Member::new(member_kind(&member.member_type), member.member_id, role)
                    })
                    .collect();
                self.record_relation(
                    relation.id(),
                    members,
                    collect_tags(relation.tags()),
                    relation.info().version(),
                );
            }
        }
    }

    fn record_point(&mut self, id: ElementId, location: Coord<f64>, tags: Tags, version: Option<i32>) {
        self.points
            .push(Point::new(id, location, tags).with_version(version_or_default(version)));
    }

    fn record_way(&mut self, id: ElementId, nodes: Vec<ElementId>, tags: Tags, version: Option<i32>) {
        match LinearFeature::new(id, nodes, tags) {
            Ok(way) => self.linears.push(way.with_version(version_or_default(version))),
            Err(err) => {
                debug!("way {id} skipped: {err}");
                self.degenerate_ways += 1;
                self.highest_degenerate = self.highest_degenerate.max(Some(id));
            }
        }
    }

    fn record_relation(&mut self, id: ElementId, members: Vec<Member>, tags: Tags, version: Option<i32>) {
        self.relations
            .push(GroupingObject::new(id, members, tags, version_or_default(version)));
    }

    fn combine(mut self, other: Self) -> Self {
        self.points.extend(other.points);
        self.linears.extend(other.linears);
        self.relations.extend(other.relations);
        self.degenerate_ways += other.degenerate_ways;
        self.highest_degenerate = self.highest_degenerate.max(other.highest_degenerate);
        self
    }

    fn build(self) -> PbfBaseMap {
        let mut referenced_by: HashMap<ElementRef, Vec<ElementId>> = HashMap::new();
        let mut relations = BTreeMap::new();
        for relation in self.relations {
            relations.insert(relation.id, relation);
        }
        for relation in relations.values() {
            for member in &relation.members {
                let owners = referenced_by.entry(member.element()).or_default();
                if owners.last() != Some(&relation.id) {
                    owners.push(relation.id);
                }
            }
        }
        let points: HashMap<ElementId, Point> = self.points.into_iter().map(|p| (p.id, p)).collect();
        let linears: HashMap<ElementId, LinearFeature> = self.linears.into_iter().map(|l| (l.id, l)).collect();
        // Skipped ways still own their identifiers.
        let highest_way = linears.keys().max().copied().max(self.highest_degenerate);
        if self.degenerate_ways > 0 {
            warn!("{} way(s) with fewer than two points were skipped", self.degenerate_ways);
        }
        PbfBaseMap {
            summary: BaseMapSummary {
                points: points.len(),
                linears: linears.len(),
                relations: relations.len(),
                degenerate_ways: self.degenerate_ways,
            },
            points,
            linears,
            relations,
            referenced_by,
            highest_way,
        }
    }
}
