//! Facade crate for the osmweave change generator.
//!
//! This crate re-exports the core reconciliation types and, behind the
//! `data` feature, the SQLite source, PBF base map, and osmChange writer.

#![forbid(unsafe_code)]

pub use osmweave_core::{
    Action, BaseMap, ChangeError, ChangeGenerator, ChangeOutcome, ChangeSet, Element, ElementId, ElementKind,
    ElementRef, EmptyBaseMap, ExportedElements, FeatureSource, GenerationStats, GeneratorConfig, GroupingObject,
    IdentifierMode, LayerInfo, LinearFeature, Member, OrderedChanges, Point, SourceError, SourceGeometry, SourceKey,
    SourceRecord, SourceVertex, Tags,
};

#[cfg(feature = "data")]
pub use osmweave_data::{
    Compression, ExportManifest, PbfBaseMap, SqliteFeatureSource, persist_layer, render_changes, write_change_file,
};
