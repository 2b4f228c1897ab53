//! Collaborator interfaces: the source feature database and the base map.
//!
//! The generator reads new geometry through [`FeatureSource`] and looks up
//! already-published elements through [`BaseMap`]. Both are synchronous; a
//! run calls them sequentially and surfaces their failures unchanged.
//!
//! # Examples
//!
//! ```rust
//! use geo::{Coord, Rect};
//! use osmweave_core::{
//!     FeatureSource, LayerInfo, SourceError, SourceGeometry, SourceRecord, SourceVertex, Tags,
//! };
//!
//! struct OneTrail;
//!
//! impl FeatureSource for OneTrail {
//!     fn layer_info(&self, layer: &str) -> Result<LayerInfo, SourceError> {
//!         Ok(LayerInfo::new(layer, 4326))
//!     }
//!
//!     fn features(&self, _layer: &str) -> Result<Vec<SourceRecord>, SourceError> {
//!         Ok(vec![SourceRecord::new(SourceGeometry::Line(vec![
//!             SourceVertex::new(Coord { x: 0.0, y: 0.0 }),
//!             SourceVertex::new(Coord { x: 1.0, y: 1.0 }),
//!         ]))])
//!     }
//!
//!     fn features_intersecting(
//!         &self,
//!         layer: &str,
//!         _bounds: &Rect<f64>,
//!     ) -> Result<Vec<SourceRecord>, SourceError> {
//!         self.features(layer)
//!     }
//! }
//!
//! let source = OneTrail;
//! assert_eq!(source.features("trails").unwrap().len(), 1);
//! assert_eq!(source.layer_info("trails").unwrap().epsg, 4326);
//! ```

use std::error::Error as StdError;

use geo::{Coord, Rect};
use thiserror::Error;

use crate::model::{ElementId, ElementKind, ElementRef, GroupingObject, LinearFeature, Point, Tags};

/// Failure reported by a collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The named layer does not exist.
    #[error("layer {layer} not found")]
    MissingLayer {
        /// Requested layer name.
        layer: String,
    },
    /// The backing store failed (unavailable, bad query, corrupt row).
    #[error("{context}: {source}")]
    Backend {
        /// What was being attempted.
        context: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl SourceError {
    /// Wrap a backend failure with context.
    pub fn backend(context: impl Into<String>, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// Layer metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    /// Layer name.
    pub name: String,
    /// EPSG code of the layer's native coordinates.
    pub epsg: u32,
    /// Attribute field names.
    pub fields: Vec<String>,
}

impl LayerInfo {
    /// Metadata with no declared fields.
    #[must_use]
    pub fn new(name: impl Into<String>, epsg: u32) -> Self {
        Self {
            name: name.into(),
            epsg,
            fields: Vec::new(),
        }
    }
}

/// One vertex of a source line, in native coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceVertex {
    /// Base-map point identifier, when the vertex is already published.
    pub id: Option<ElementId>,
    /// Native coordinates.
    pub location: Coord<f64>,
}

impl SourceVertex {
    /// A vertex with no identifier.
    #[must_use]
    pub const fn new(location: Coord<f64>) -> Self {
        Self { id: None, location }
    }

    /// A vertex bound to an existing point.
    #[must_use]
    pub const fn existing(id: ElementId, location: Coord<f64>) -> Self {
        Self {
            id: Some(id),
            location,
        }
    }
}

/// Geometry of a source record.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceGeometry {
    /// A single location.
    Point(Coord<f64>),
    /// An open or closed line.
    Line(Vec<SourceVertex>),
    /// An exterior ring followed by zero or more interior rings.
    Polygon(Vec<Vec<SourceVertex>>),
}

/// A record read from a source layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Element identifier when the record mirrors a published element.
    pub id: Option<ElementId>,
    /// Version reported by the source for published elements.
    pub version: Option<u32>,
    /// Attribute values as tags.
    pub tags: Tags,
    /// Record geometry in native coordinates.
    pub geometry: SourceGeometry,
}

impl SourceRecord {
    /// An untagged record with no identifier.
    #[must_use]
    pub fn new(geometry: SourceGeometry) -> Self {
        Self {
            id: None,
            version: None,
            tags: Tags::new(),
            geometry,
        }
    }

    /// Set the identifier.
    #[must_use]
    pub fn with_id(mut self, id: ElementId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the source version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Reader over the spatial database holding source layers.
pub trait FeatureSource {
    /// Metadata for `layer`.
    ///
    /// # Errors
    /// Returns [`SourceError::MissingLayer`] for unknown layers.
    fn layer_info(&self, layer: &str) -> Result<LayerInfo, SourceError>;

    /// Every record in `layer`, in a stable order.
    ///
    /// # Errors
    /// Surfaces backend failures.
    fn features(&self, layer: &str) -> Result<Vec<SourceRecord>, SourceError>;

    /// Records in `layer` whose bounds overlap `bounds` (native coordinates).
    ///
    /// # Errors
    /// Surfaces backend failures.
    fn features_intersecting(&self, layer: &str, bounds: &Rect<f64>) -> Result<Vec<SourceRecord>, SourceError>;
}

impl<T: FeatureSource + ?Sized> FeatureSource for &T {
    fn layer_info(&self, layer: &str) -> Result<LayerInfo, SourceError> {
        (**self).layer_info(layer)
    }

    fn features(&self, layer: &str) -> Result<Vec<SourceRecord>, SourceError> {
        (**self).features(layer)
    }

    fn features_intersecting(&self, layer: &str, bounds: &Rect<f64>) -> Result<Vec<SourceRecord>, SourceError> {
        (**self).features_intersecting(layer, bounds)
    }
}

/// Read access to the already-published map.
pub trait BaseMap {
    /// Published point `id`.
    ///
    /// # Errors
    /// Surfaces backend failures.
    fn point(&self, id: ElementId) -> Result<Option<Point>, SourceError>;

    /// Published linear feature `id`.
    ///
    /// # Errors
    /// Surfaces backend failures.
    fn linear(&self, id: ElementId) -> Result<Option<LinearFeature>, SourceError>;

    /// Published grouping object `id`.
    ///
    /// # Errors
    /// Surfaces backend failures.
    fn relation(&self, id: ElementId) -> Result<Option<GroupingObject>, SourceError>;

    /// Grouping objects with a member referencing `element`.
    ///
    /// # Errors
    /// Surfaces backend failures.
    fn relations_referencing(&self, element: ElementRef) -> Result<Vec<GroupingObject>, SourceError>;

    /// Highest published identifier of `kind`, or `None` when the map holds
    /// no element of that kind.
    ///
    /// # Errors
    /// Surfaces backend failures.
    fn max_id(&self, kind: ElementKind) -> Result<Option<ElementId>, SourceError>;
}

/// A base map with no published elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyBaseMap;

impl BaseMap for EmptyBaseMap {
    fn point(&self, _id: ElementId) -> Result<Option<Point>, SourceError> {
        Ok(None)
    }

    fn linear(&self, _id: ElementId) -> Result<Option<LinearFeature>, SourceError> {
        Ok(None)
    }

    fn relation(&self, _id: ElementId) -> Result<Option<GroupingObject>, SourceError> {
        Ok(None)
    }

    fn relations_referencing(&self, _element: ElementRef) -> Result<Vec<GroupingObject>, SourceError> {
        Ok(Vec::new())
    }

    fn max_id(&self, _kind: ElementKind) -> Result<Option<ElementId>, SourceError> {
        Ok(None)
    }
}

impl<T: BaseMap + ?Sized> BaseMap for &T {
    fn point(&self, id: ElementId) -> Result<Option<Point>, SourceError> {
        (**self).point(id)
    }

    fn linear(&self, id: ElementId) -> Result<Option<LinearFeature>, SourceError> {
        (**self).linear(id)
    }

    fn relation(&self, id: ElementId) -> Result<Option<GroupingObject>, SourceError> {
        (**self).relation(id)
    }

    fn relations_referencing(&self, element: ElementRef) -> Result<Vec<GroupingObject>, SourceError> {
        (**self).relations_referencing(element)
    }

    fn max_id(&self, kind: ElementKind) -> Result<Option<ElementId>, SourceError> {
        (**self).max_id(kind)
    }
}
