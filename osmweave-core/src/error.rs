//! Errors raised while generating a change set.

use thiserror::Error;

use crate::model::{ElementId, ElementKind, ElementRef};
use crate::changeset::Action;
use crate::source::SourceError;

/// Fatal errors that abort a change-generation run.
///
/// No partial change set is returned alongside any of these.
#[derive(Debug, Error)]
pub enum ChangeError {
    /// A feature has a degenerate point sequence.
    #[error("feature {feature} in layer {layer} has {points} distinct point(s); at least 2 are required")]
    MalformedGeometry {
        /// Layer the feature came from.
        layer: String,
        /// Source identifier, or the record position when it has none.
        feature: String,
        /// Number of distinct points after collapsing repeats.
        points: usize,
    },
    /// An identifier was claimed by two different elements.
    #[error("identifier {id} is already used by a {existing}; cannot record it as a {requested}")]
    IdentifierConflict {
        /// Conflicting identifier.
        id: ElementId,
        /// Kind that claimed the identifier first.
        existing: ElementKind,
        /// Kind that attempted to reuse it.
        requested: ElementKind,
    },
    /// Confirmed identifiers would start inside the range the base map uses.
    #[error("identifier offset {offset} collides with existing {kind} identifiers (highest is {max})")]
    IdentifierCollision {
        /// Configured offset.
        offset: ElementId,
        /// Kind whose identifiers overlap.
        kind: ElementKind,
        /// Highest identifier of that kind in the base map.
        max: ElementId,
    },
    /// An element would appear in two incompatible change buckets.
    #[error("{element} is already recorded as {existing}; cannot also {requested} it")]
    ActionConflict {
        /// Element in question.
        element: ElementRef,
        /// Bucket already holding the element.
        existing: Action,
        /// Bucket requested.
        requested: Action,
    },
    /// The feature source or base map failed.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// A layer uses a coordinate reference system that is not supported.
    #[error("layer {layer} uses unsupported EPSG:{epsg}")]
    UnsupportedCrs {
        /// Layer name.
        layer: String,
        /// Reported EPSG code.
        epsg: u32,
    },
    /// Two layers compared for intersections use different systems.
    #[error("layer {layer} (EPSG:{layer_epsg}) and layer {other} (EPSG:{other_epsg}) use different coordinate systems")]
    CrsMismatch {
        /// Primary layer.
        layer: String,
        /// Its EPSG code.
        layer_epsg: u32,
        /// Other layer.
        other: String,
        /// Its EPSG code.
        other_epsg: u32,
    },
    /// The generator configuration is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },
}
