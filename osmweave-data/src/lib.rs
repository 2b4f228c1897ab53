//! Concrete collaborators for the osmweave change generator.
//!
//! Responsibilities:
//! - Read source layers from SQLite ([`SqliteFeatureSource`]).
//! - Load published elements from an OSM PBF extract ([`PbfBaseMap`]).
//! - Serialise change sets as osmChange XML, optionally gzip-compressed.
//! - Persist the export manifest consumed by the deletion pass.
//!
//! Boundaries:
//! - Do not encode reconciliation rules (those live in `osmweave-core`).
//! - All file creation goes through `osmweave-fs`.
//!
//! Invariants:
//! - Output is deterministic for a given change set.
//! - No global mutable state.

mod manifest;
mod pbf;
pub mod sqlite;
mod writer;

pub use manifest::{ExportManifest, ManifestError};
pub use pbf::{BaseMapError, BaseMapSummary, PbfBaseMap};
pub use sqlite::{PersistLayerError, SqliteFeatureSource, SqliteSourceError, persist_layer};
pub use writer::{
    Compression, GENERATOR, OSMCHANGE_VERSION, OsmChangeWriter, WriteChangeError, render_changes, write_change_file,
};
