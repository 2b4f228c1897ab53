//! OSM-like element model shared by every stage of the change pipeline.
//!
//! Coordinates are WGS84 with `x = longitude` and `y = latitude` once they
//! leave the generator. Identifiers follow OSM conventions: positive values
//! name persisted elements and negative values name provisional ones.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use geo::Coord;
use thiserror::Error;

/// Signed element identifier.
pub type ElementId = i64;

/// Free-form key/value attributes.
///
/// A `BTreeMap` keeps serialised output stable across runs.
pub type Tags = BTreeMap<String, String>;

/// The three element kinds of the data model.
///
/// Ordering follows the dependency order used when emitting creations:
/// points before linear features before grouping objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementKind {
    /// A single location (OSM node).
    #[cfg_attr(feature = "serde", serde(rename = "node"))]
    Point,
    /// An ordered sequence of point references (OSM way).
    #[cfg_attr(feature = "serde", serde(rename = "way"))]
    Linear,
    /// An ordered list of typed, role-labelled members (OSM relation).
    #[cfg_attr(feature = "serde", serde(rename = "relation"))]
    Grouping,
}

impl ElementKind {
    /// All kinds in creation order.
    pub const ALL: [Self; 3] = [Self::Point, Self::Linear, Self::Grouping];

    /// The OSM element name for this kind.
    ///
    /// # Examples
    /// ```
    /// use osmweave_core::ElementKind;
    ///
    /// assert_eq!(ElementKind::Linear.as_str(), "way");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "node",
            Self::Linear => "way",
            Self::Grouping => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown element kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown element kind: {0}")]
pub struct ParseElementKindError(pub String);

impl FromStr for ElementKind {
    type Err = ParseElementKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" | "point" => Ok(Self::Point),
            "way" | "linear" => Ok(Self::Linear),
            "relation" | "grouping" => Ok(Self::Grouping),
            other => Err(ParseElementKindError(other.to_owned())),
        }
    }
}

/// A typed reference to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementRef {
    /// Element kind.
    pub kind: ElementKind,
    /// Element identifier.
    pub id: ElementId,
}

impl ElementRef {
    /// Reference a point.
    #[must_use]
    pub const fn point(id: ElementId) -> Self {
        Self {
            kind: ElementKind::Point,
            id,
        }
    }

    /// Reference a linear feature.
    #[must_use]
    pub const fn linear(id: ElementId) -> Self {
        Self {
            kind: ElementKind::Linear,
            id,
        }
    }

    /// Reference a grouping object.
    #[must_use]
    pub const fn grouping(id: ElementId) -> Self {
        Self {
            kind: ElementKind::Grouping,
            id,
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// A single location with attributes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    /// Point identifier; negative while provisional.
    pub id: ElementId,
    /// WGS84 location once emitted, native coordinates before.
    pub location: Coord<f64>,
    /// Point attributes.
    pub tags: Tags,
    /// Version the element carries in the change file.
    pub version: u32,
}

impl Point {
    /// Construct a point with version 1.
    ///
    /// # Examples
    /// ```
    /// use geo::Coord;
    /// use osmweave_core::{Point, Tags};
    ///
    /// let point = Point::new(-1, Coord { x: 1.0, y: 1.0 }, Tags::new());
    /// assert_eq!(point.version, 1);
    /// ```
    #[must_use]
    pub fn new(id: ElementId, location: Coord<f64>, tags: Tags) -> Self {
        Self {
            id,
            location,
            tags,
            version: 1,
        }
    }

    /// Replace the version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// Errors returned by [`LinearFeature::new`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinearFeatureError {
    /// Fewer than two point references were supplied.
    #[error("linear feature {id} has {count} point references; at least 2 are required")]
    TooFewPoints {
        /// Offending feature.
        id: ElementId,
        /// Number of references supplied.
        count: usize,
    },
    /// The same point appears twice in a row.
    #[error("linear feature {id} repeats point {point} at position {position}")]
    ConsecutiveDuplicate {
        /// Offending feature.
        id: ElementId,
        /// Repeated point identifier.
        point: ElementId,
        /// Index of the second occurrence.
        position: usize,
    },
}

/// An ordered sequence of point references with attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearFeature {
    /// Feature identifier; negative while provisional.
    pub id: ElementId,
    /// Point identifiers in travel order.
    pub nodes: Vec<ElementId>,
    /// Feature attributes.
    pub tags: Tags,
    /// Version the element carries in the change file.
    pub version: u32,
}

impl LinearFeature {
    /// Validate and construct a linear feature with version 1.
    ///
    /// # Errors
    /// Returns [`LinearFeatureError`] when fewer than two references are
    /// supplied or a reference repeats consecutively.
    ///
    /// # Examples
    /// ```
    /// use osmweave_core::{LinearFeature, Tags};
    ///
    /// assert!(LinearFeature::new(1, vec![1, 2], Tags::new()).is_ok());
    /// assert!(LinearFeature::new(1, vec![1], Tags::new()).is_err());
    /// ```
    pub fn new(id: ElementId, nodes: Vec<ElementId>, tags: Tags) -> Result<Self, LinearFeatureError> {
        if nodes.len() < 2 {
            return Err(LinearFeatureError::TooFewPoints {
                id,
                count: nodes.len(),
            });
        }
        let repeat = nodes.windows(2).enumerate().find_map(|(k, pair)| match pair {
            [a, b] if a == b => Some((k + 1, *b)),
            _ => None,
        });
        if let Some((position, point)) = repeat {
            return Err(LinearFeatureError::ConsecutiveDuplicate { id, point, position });
        }
        Ok(Self {
            id,
            nodes,
            tags,
            version: 1,
        })
    }

    /// Replace the version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// A member entry of a grouping object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Member {
    /// Identifier of the referenced element.
    pub id: ElementId,
    /// Kind of the referenced element.
    pub kind: ElementKind,
    /// Role label; may be empty.
    pub role: String,
}

impl Member {
    /// Construct a member entry.
    #[must_use]
    pub fn new(kind: ElementKind, id: ElementId, role: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            role: role.into(),
        }
    }

    /// The typed reference this member points at.
    #[must_use]
    pub const fn element(&self) -> ElementRef {
        ElementRef {
            kind: self.kind,
            id: self.id,
        }
    }
}

/// An ordered list of members with attributes (OSM relation).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupingObject {
    /// Grouping object identifier.
    pub id: ElementId,
    /// Members in their published order.
    pub members: Vec<Member>,
    /// Grouping object attributes.
    pub tags: Tags,
    /// Version the element carries in the change file.
    pub version: u32,
}

impl GroupingObject {
    /// Construct a grouping object with the given version.
    #[must_use]
    pub fn new(id: ElementId, members: Vec<Member>, tags: Tags, version: u32) -> Self {
        Self {
            id,
            members,
            tags,
            version,
        }
    }

    /// Whether any member references `element`.
    #[must_use]
    pub fn references(&self, element: ElementRef) -> bool {
        self.members.iter().any(|m| m.element() == element)
    }
}

/// Any element recorded in a change set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "lowercase"))]
pub enum Element {
    /// A point.
    Point(Point),
    /// A linear feature.
    Linear(LinearFeature),
    /// A grouping object.
    Grouping(GroupingObject),
}

impl Element {
    /// Kind of the wrapped element.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::Point(_) => ElementKind::Point,
            Self::Linear(_) => ElementKind::Linear,
            Self::Grouping(_) => ElementKind::Grouping,
        }
    }

    /// Identifier of the wrapped element.
    #[must_use]
    pub const fn id(&self) -> ElementId {
        match self {
            Self::Point(p) => p.id,
            Self::Linear(l) => l.id,
            Self::Grouping(g) => g.id,
        }
    }

    /// Version of the wrapped element.
    #[must_use]
    pub const fn version(&self) -> u32 {
        match self {
            Self::Point(p) => p.version,
            Self::Linear(l) => l.version,
            Self::Grouping(g) => g.version,
        }
    }

    /// Typed reference to the wrapped element.
    #[must_use]
    pub const fn element_ref(&self) -> ElementRef {
        ElementRef {
            kind: self.kind(),
            id: self.id(),
        }
    }

    /// Tags of the wrapped element.
    #[must_use]
    pub const fn tags(&self) -> &Tags {
        match self {
            Self::Point(p) => &p.tags,
            Self::Linear(l) => &l.tags,
            Self::Grouping(g) => &g.tags,
        }
    }
}

impl From<Point> for Element {
    fn from(value: Point) -> Self {
        Self::Point(value)
    }
}

impl From<LinearFeature> for Element {
    fn from(value: LinearFeature) -> Self {
        Self::Linear(value)
    }
}

impl From<GroupingObject> for Element {
    fn from(value: GroupingObject) -> Self {
        Self::Grouping(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("node", ElementKind::Point)]
    #[case("way", ElementKind::Linear)]
    #[case("relation", ElementKind::Grouping)]
    fn kind_round_trips_through_name(#[case] name: &str, #[case] kind: ElementKind) {
        assert_eq!(name.parse::<ElementKind>().unwrap(), kind);
        assert_eq!(kind.as_str(), name);
    }

    #[rstest]
    fn unknown_kind_is_rejected() {
        assert!("area".parse::<ElementKind>().is_err());
    }

    #[rstest]
    #[case(vec![], 0)]
    #[case(vec![7], 1)]
    fn linear_requires_two_points(#[case] nodes: Vec<ElementId>, #[case] count: usize) {
        let err = LinearFeature::new(3, nodes, Tags::new()).unwrap_err();
        assert_eq!(err, LinearFeatureError::TooFewPoints { id: 3, count });
    }

    #[rstest]
    fn linear_rejects_consecutive_duplicates() {
        let err = LinearFeature::new(3, vec![1, 2, 2, 4], Tags::new()).unwrap_err();
        assert_eq!(
            err,
            LinearFeatureError::ConsecutiveDuplicate {
                id: 3,
                point: 2,
                position: 2,
            }
        );
    }

    #[rstest]
    fn closed_ring_is_accepted() {
        assert!(LinearFeature::new(3, vec![1, 2, 3, 1], Tags::new()).is_ok());
    }

    #[rstest]
    fn element_exposes_reference() {
        let element = Element::from(Point::new(-4, Coord { x: 0.0, y: 0.0 }, Tags::new()));
        assert_eq!(element.element_ref(), ElementRef::point(-4));
        assert_eq!(element.version(), 1);
    }

    #[rstest]
    fn kinds_order_points_first() {
        let mut kinds = vec![ElementKind::Grouping, ElementKind::Point, ElementKind::Linear];
        kinds.sort();
        assert_eq!(kinds, ElementKind::ALL.to_vec());
    }
}
