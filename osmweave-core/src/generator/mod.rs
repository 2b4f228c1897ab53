//! The change generator: turns one source layer into a change set.
//!
//! A run reads the layer, resolves identifiers for every vertex, detects
//! crossings, splits features, records each resulting element as created,
//! modified, deleted, or untouched, and finally re-points grouping objects at
//! the replacement features. Any fatal error aborts the run before a change
//! set is handed back.

mod classify;
mod deletions;
mod intake;

use std::collections::BTreeMap;

use geo::Coord;
use log::{debug, info, warn};

use self::classify::Run;
use self::intake::{Intake, Origin, WorkLine};
use crate::changeset::{Action, ChangeSet};
use crate::config::GeneratorConfig;
use crate::crs::Crs;
use crate::error::ChangeError;
use crate::export::ExportedElements;
use crate::geometry::{Polyline, SplitPoint, bounds_of};
use crate::ids::{IdAllocator, IdentifierMode};
use crate::intersect::{IntersectionDetector, IntersectionSet};
use crate::model::{ElementId, ElementKind, Member};
use crate::relations::RelationUpdater;
use crate::source::{BaseMap, FeatureSource};
use crate::spatial::{SpatialIndex, expand};

/// Counters describing one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GenerationStats {
    /// Records read from the layer.
    pub features: usize,
    /// Crossings found before de-duplication.
    pub crossings: usize,
    /// Split points kept after de-duplication, summed over features.
    pub split_points: usize,
    /// Points allocated at intersections.
    pub created_points: usize,
    /// Features cut into more than one child.
    pub split_features: usize,
    /// Grouping objects rewritten.
    pub relations_modified: usize,
}

/// Result of a successful generation run.
#[derive(Debug, Clone)]
pub struct ChangeOutcome {
    /// Elements to create, modify, and delete.
    pub changes: ChangeSet,
    /// Elements produced for each record of the layer, for the next
    /// deletion pass.
    pub exported: ExportedElements,
    /// Run counters.
    pub stats: GenerationStats,
}

/// Generates change sets for source layers against a base map.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use osmweave_core::{
///     Action, ChangeGenerator, EmptyBaseMap, GeneratorConfig, SourceGeometry, SourceRecord,
///     SourceVertex, test_support::MemorySource,
/// };
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let line = |a: (f64, f64), b: (f64, f64)| {
///     SourceRecord::new(SourceGeometry::Line(vec![
///         SourceVertex::new(Coord { x: a.0, y: a.1 }),
///         SourceVertex::new(Coord { x: b.0, y: b.1 }),
///     ]))
/// };
/// let source = MemorySource::default().with_layer(
///     "trails",
///     4326,
///     [line((0.0, 0.0), (2.0, 2.0)), line((0.0, 2.0), (2.0, 0.0))],
/// );
/// let config = GeneratorConfig {
///     self_intersections: true,
///     ..GeneratorConfig::default()
/// };
/// let outcome = ChangeGenerator::new(source, EmptyBaseMap)
///     .with_config(config)
///     .generate_changes("trails")?;
/// assert_eq!(outcome.stats.crossings, 1);
/// // Four endpoints and the shared crossing point, then four lines.
/// assert_eq!(outcome.changes.count(Action::Create), 9);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ChangeGenerator<S, B> {
    source: S,
    base: B,
    config: GeneratorConfig,
}

impl<S: FeatureSource, B: BaseMap> ChangeGenerator<S, B> {
    /// Create a generator with the default configuration.
    pub fn new(source: S, base: B) -> Self {
        Self {
            source,
            base,
            config: GeneratorConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Feature source the generator reads from.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Base map the generator compares against.
    #[must_use]
    pub const fn base(&self) -> &B {
        &self.base
    }

    /// Build the change set for `layer`.
    ///
    /// # Errors
    /// Returns [`ChangeError::InvalidConfig`] for an invalid configuration,
    /// [`ChangeError::UnsupportedCrs`] and [`ChangeError::CrsMismatch`] for
    /// unusable layers, [`ChangeError::MalformedGeometry`] for degenerate
    /// features, [`ChangeError::IdentifierConflict`] for reused identifiers,
    /// [`ChangeError::IdentifierCollision`] when collisions are forbidden and
    /// the offset overlaps the base map, and surfaces collaborator failures
    /// as [`ChangeError::Source`].
    pub fn generate_changes(&self, layer: &str) -> Result<ChangeOutcome, ChangeError> {
        self.config.validate()?;
        self.check_offset(layer)?;
        let (crs, epsg) = self.layer_crs(layer)?;
        let mut ids = IdAllocator::new(
            self.config.synthetic_floor,
            self.config.id_offset,
            self.config.identifier_mode,
        );

        let records = self.source.features(layer)?;
        let mut stats = GenerationStats {
            features: records.len(),
            ..GenerationStats::default()
        };
        let mut intake = Intake::new(&self.base, &self.config, layer);
        for (position, record) in records.into_iter().enumerate() {
            intake.primary(&mut ids, position, record)?;
        }
        for other in &self.config.other_layers {
            self.take_other_layer(layer, (crs, epsg), other, &mut intake, &mut ids)?;
        }
        let Intake {
            lines,
            points,
            groups,
            new_points,
            ..
        } = intake;

        let ordered = self.detect(layer, &lines, &mut stats);
        let mut run = Run {
            layer,
            crs,
            config: &self.config,
            ids,
            changes: ChangeSet::default(),
            replacements: Vec::new(),
            joins: Vec::new(),
            exported: ExportedElements::default(),
            stats,
        };
        run.create_vertices(&new_points)?;
        let outcomes = run.split_lines(&lines, &ordered)?;
        let mut final_ids = Vec::with_capacity(lines.len());
        for (line, outcome) in lines.iter().zip(&outcomes) {
            final_ids.push(run.classify_line(line, outcome)?);
        }
        for point in &points {
            run.classify_point(point)?;
        }
        for group in &groups {
            run.classify_group(group, &lines, &final_ids)?;
        }

        run.stats.relations_modified = self.update_relations(&mut run)?;
        info!(
            "layer {layer}: {} create, {} modify, {} delete; {} feature(s) split, {} relation(s) updated",
            run.changes.count(Action::Create),
            run.changes.count(Action::Modify),
            run.changes.count(Action::Delete),
            run.stats.split_features,
            run.stats.relations_modified
        );
        Ok(ChangeOutcome {
            changes: run.changes,
            exported: run.exported,
            stats: run.stats,
        })
    }

    /// Refuse, or warn about, confirmed identifiers the base map already
    /// uses for any element kind.
    fn check_offset(&self, layer: &str) -> Result<(), ChangeError> {
        if self.config.identifier_mode != IdentifierMode::Confirmed {
            return Ok(());
        }
        let offset = self.config.id_offset;
        for kind in ElementKind::ALL {
            let Some(max) = self.base.max_id(kind)? else {
                continue;
            };
            if offset > max {
                continue;
            }
            if self.config.forbid_id_collisions {
                return Err(ChangeError::IdentifierCollision { offset, kind, max });
            }
            warn!("layer {layer}: identifier offset {offset} may collide with existing {kind} identifiers (highest is {max})");
        }
        Ok(())
    }

    fn layer_crs(&self, layer: &str) -> Result<(Crs, u32), ChangeError> {
        let info = self.source.layer_info(layer)?;
        let crs = Crs::from_epsg(info.epsg).ok_or_else(|| ChangeError::UnsupportedCrs {
            layer: layer.to_owned(),
            epsg: info.epsg,
        })?;
        if crs != Crs::Wgs84 {
            debug!("layer {layer}: converting EPSG:{} coordinates to WGS84 on output", info.epsg);
        }
        Ok((crs, info.epsg))
    }

    fn take_other_layer(
        &self,
        layer: &str,
        (crs, epsg): (Crs, u32),
        other: &str,
        intake: &mut Intake<'_, B>,
        ids: &mut IdAllocator,
    ) -> Result<(), ChangeError> {
        let (other_crs, other_epsg) = self.layer_crs(other)?;
        if other_crs != crs {
            return Err(ChangeError::CrsMismatch {
                layer: layer.to_owned(),
                layer_epsg: epsg,
                other: other.to_owned(),
                other_epsg,
            });
        }
        let coords: Vec<Coord<f64>> = intake
            .lines
            .iter()
            .filter(|line| line.origin != Origin::Other)
            .flat_map(|line| line.polyline.coords.iter().copied())
            .collect();
        if coords.is_empty() {
            debug!("layer {layer}: no lines to compare against {other}");
            return Ok(());
        }
        let query = expand(&bounds_of(&coords), self.config.distance_buffer);
        let records = self.source.features_intersecting(other, &query)?;
        debug!("layer {other}: {} candidate feature(s) near {layer}", records.len());
        for record in records {
            intake.other(ids, record)?;
        }
        Ok(())
    }

    fn detect(
        &self,
        layer: &str,
        lines: &[WorkLine],
        stats: &mut GenerationStats,
    ) -> BTreeMap<ElementId, Vec<SplitPoint>> {
        let (primary, others): (Vec<&WorkLine>, Vec<&WorkLine>) =
            lines.iter().partition(|line| line.origin != Origin::Other);
        let primary: Vec<Polyline> = primary.into_iter().map(|l| l.polyline.clone()).collect();
        let others: Vec<Polyline> = others.into_iter().map(|l| l.polyline.clone()).collect();
        let index = SpatialIndex::build(primary.iter().map(|l| (l.id, l.bounds())));
        let detector = IntersectionDetector::new(self.config.coincidence_tolerance);

        let mut found = IntersectionSet::default();
        if self.config.self_intersections {
            found.extend(detector.self_intersections(&primary, &index));
        }
        if !others.is_empty() {
            let other_index = SpatialIndex::build(others.iter().map(|l| (l.id, l.bounds())));
            found.extend(detector.cross_intersections(
                &primary,
                &others,
                &other_index,
                self.config.distance_buffer,
            ));
        }
        let ordered = found.ordered(self.config.coincidence_tolerance);
        stats.crossings = found.len();
        stats.split_points = ordered.values().map(Vec::len).sum();
        info!(
            "layer {layer}: {} intersection(s) found, {} split point(s) after de-duplication",
            stats.crossings, stats.split_points
        );
        ordered
    }

    /// Re-point grouping objects at replacement features and apply
    /// membership requests, returning the number of objects rewritten.
    fn update_relations(&self, run: &mut Run<'_>) -> Result<usize, ChangeError> {
        let mut updater = RelationUpdater::new(&self.base);
        let affected = updater.get_modified_relations(&run.changes)?;
        debug!("{} relation(s) reference modified or deleted elements", affected.len());
        for (old, new_ids) in &run.replacements {
            updater.modify_relations_with_object(*old, new_ids, &mut run.changes)?;
        }
        for (relation, element) in &run.joins {
            let member = Member::new(element.kind, element.id, "");
            updater.add_member(*relation, member, None, &mut run.changes)?;
        }
        Ok(updater.modified().count())
    }
}
