//! Topology reconciliation and change generation for map imports.
//!
//! Responsibilities:
//! - Model points, linear features, and grouping objects as typed records.
//! - Detect crossings between imported features and against another layer.
//! - Split features at crossings and at a point-count limit.
//! - Classify the results into create, modify, and delete buckets and keep
//!   grouping objects pointing at the right members.
//!
//! Boundaries:
//! - Reading layers and published data happens behind [`FeatureSource`] and
//!   [`BaseMap`]; concrete adapters live in `osmweave-data`.
//! - Serialising change sets and export manifests is left to the caller.
//!
//! Invariants:
//! - Identifiers come from one [`IdAllocator`] per run and are never reused.
//! - An element appears in at most one bucket of a [`ChangeSet`].
//! - No global mutable state.

#![forbid(unsafe_code)]

mod changeset;
mod config;
mod crs;
mod error;
mod export;
mod generator;
mod geometry;
mod ids;
mod intersect;
mod junction;
mod model;
mod relations;
mod source;
pub mod spatial;
mod split;
pub mod test_support;

pub use changeset::{Action, ChangeSet, OrderedChanges};
pub use config::{DEFAULT_COINCIDENCE_TOLERANCE, DEFAULT_MAX_POINTS, GeneratorConfig};
pub use crs::Crs;
pub use error::ChangeError;
pub use export::{ExportedElements, ParseSourceKeyError, SourceKey};
pub use generator::{ChangeGenerator, ChangeOutcome, GenerationStats};
pub use geometry::{LinePosition, Polyline, SplitPoint};
pub use ids::{IdAllocator, IdentifierMode};
pub use intersect::{Crossing, IntersectionDetector, IntersectionSet};
pub use junction::{Junction, JunctionRegistry};
pub use model::{
    Element, ElementId, ElementKind, ElementRef, GroupingObject, LinearFeature, LinearFeatureError, Member,
    ParseElementKindError, Point, Tags,
};
pub use relations::{RelationEdit, RelationUpdater};
pub use source::{
    BaseMap, EmptyBaseMap, FeatureSource, LayerInfo, SourceError, SourceGeometry, SourceRecord, SourceVertex,
};
pub use spatial::SpatialIndex;
pub use split::{FeatureSplitter, SplitOutcome};
