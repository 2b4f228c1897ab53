//! Stable identities of source records and the elements exported for them.
//!
//! A deletion pass needs to know which elements a previous run produced for
//! each record still present in the source. Records that mirror a published
//! element are keyed by that element; imported records carry no identifier
//! and are keyed by a fingerprint of their geometry and tags, which stays
//! the same across runs as long as the record is unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::model::{ElementKind, ElementRef};
use crate::source::{SourceGeometry, SourceRecord, SourceVertex};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Identity of a source record across runs.
///
/// Displayed and serialised as `<kind>/<id>` (`way/12`) or
/// `content/<16 hex digits>`.
///
/// # Examples
/// ```
/// use osmweave_core::{ElementRef, SourceKey};
///
/// let key: SourceKey = "way/12".parse().unwrap();
/// assert_eq!(key, SourceKey::Element(ElementRef::linear(12)));
/// assert_eq!(key.to_string(), "way/12");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(into = "String", try_from = "String")
)]
pub enum SourceKey {
    /// The record mirrors this published element.
    Element(ElementRef),
    /// Fingerprint of an unidentified record's geometry and tags.
    Content(u64),
}

impl SourceKey {
    /// Key of `record`.
    ///
    /// Identified records map to a point for point geometry and to a linear
    /// feature otherwise. Unidentified records are fingerprinted; two
    /// records with identical geometry and tags share a key.
    #[must_use]
    pub fn of(record: &SourceRecord) -> Self {
        match record.id {
            Some(id) => {
                let kind = match record.geometry {
                    SourceGeometry::Point(_) => ElementKind::Point,
                    SourceGeometry::Line(_) | SourceGeometry::Polygon(_) => ElementKind::Linear,
                };
                Self::Element(ElementRef { kind, id })
            }
            None => Self::Content(fingerprint(record)),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(element) => write!(f, "{}/{}", element.kind, element.id),
            Self::Content(hash) => write!(f, "content/{hash:016x}"),
        }
    }
}

/// Error returned when parsing a malformed [`SourceKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed source key: {0}")]
pub struct ParseSourceKeyError(pub String);

impl FromStr for SourceKey {
    type Err = ParseSourceKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseSourceKeyError(s.to_owned());
        let (prefix, value) = s.split_once('/').ok_or_else(malformed)?;
        if prefix == "content" {
            return u64::from_str_radix(value, 16)
                .map(Self::Content)
                .map_err(|_| malformed());
        }
        let kind: ElementKind = prefix.parse().map_err(|_| malformed())?;
        let id = value.parse().map_err(|_| malformed())?;
        Ok(Self::Element(ElementRef { kind, id }))
    }
}

impl From<SourceKey> for String {
    fn from(key: SourceKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for SourceKey {
    type Error = ParseSourceKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// FNV-1a over a fixed little-endian encoding of the record, so the value
/// does not depend on the platform or the toolchain.
fn fingerprint(record: &SourceRecord) -> u64 {
    let mut hasher = Fnv(FNV_OFFSET);
    match &record.geometry {
        SourceGeometry::Point(location) => {
            hasher.write(&[0]);
            hasher.write(&location.x.to_bits().to_le_bytes());
            hasher.write(&location.y.to_bits().to_le_bytes());
        }
        SourceGeometry::Line(vertices) => {
            hasher.write(&[1]);
            hasher.vertices(vertices);
        }
        SourceGeometry::Polygon(rings) => {
            hasher.write(&[2]);
            hasher.length(rings.len());
            for ring in rings {
                hasher.vertices(ring);
            }
        }
    }
    hasher.length(record.tags.len());
    for (key, value) in &record.tags {
        hasher.text(key);
        hasher.text(value);
    }
    hasher.0
}

struct Fnv(u64);

impl Fnv {
    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn length(&mut self, len: usize) {
        self.write(&u64::try_from(len).unwrap_or(u64::MAX).to_le_bytes());
    }

    fn text(&mut self, text: &str) {
        self.length(text.len());
        self.write(text.as_bytes());
    }

    fn vertices(&mut self, vertices: &[SourceVertex]) {
        self.length(vertices.len());
        for vertex in vertices {
            match vertex.id {
                Some(id) => {
                    self.write(&[1]);
                    self.write(&id.to_le_bytes());
                }
                None => self.write(&[0]),
            }
            self.write(&vertex.location.x.to_bits().to_le_bytes());
            self.write(&vertex.location.y.to_bits().to_le_bytes());
        }
    }
}

/// Elements exported for each source record of a layer.
///
/// # Examples
/// ```
/// use std::collections::BTreeSet;
///
/// use osmweave_core::{ElementRef, ExportedElements, SourceKey};
///
/// let kept = SourceKey::Element(ElementRef::linear(1));
/// let dropped = SourceKey::Content(7);
/// let mut exported = ExportedElements::default();
/// exported.record(kept, ElementRef::linear(-1));
/// exported.record(kept, ElementRef::linear(-2));
/// exported.record(dropped, ElementRef::linear(-3));
///
/// let current = BTreeSet::from([kept]);
/// assert_eq!(exported.dropped(&current), BTreeSet::from([ElementRef::linear(-3)]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct ExportedElements {
    by_key: BTreeMap<SourceKey, Vec<ElementRef>>,
}

impl ExportedElements {
    /// Note that `element` was produced for the record keyed `key`.
    ///
    /// Elements keep their first-recorded order; repeats are ignored.
    pub fn record(&mut self, key: SourceKey, element: ElementRef) {
        let elements = self.by_key.entry(key).or_default();
        if !elements.contains(&element) {
            elements.push(element);
        }
    }

    /// Elements produced for `key`.
    #[must_use]
    pub fn get(&self, key: &SourceKey) -> Option<&[ElementRef]> {
        self.by_key.get(key).map(Vec::as_slice)
    }

    /// Keys with at least one exported element.
    pub fn keys(&self) -> impl Iterator<Item = &SourceKey> {
        self.by_key.keys()
    }

    /// Keys paired with their elements, ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&SourceKey, &[ElementRef])> {
        self.by_key.iter().map(|(key, elements)| (key, elements.as_slice()))
    }

    /// Every exported element.
    #[must_use]
    pub fn elements(&self) -> BTreeSet<ElementRef> {
        self.by_key.values().flatten().copied().collect()
    }

    /// Elements exported for keys still present in `current`.
    #[must_use]
    pub fn retained(&self, current: &BTreeSet<SourceKey>) -> BTreeSet<ElementRef> {
        self.by_key
            .iter()
            .filter(|(key, _)| current.contains(key))
            .flat_map(|(_, elements)| elements.iter().copied())
            .collect()
    }

    /// Elements exported only for keys missing from `current`.
    #[must_use]
    pub fn dropped(&self, current: &BTreeSet<SourceKey>) -> BTreeSet<ElementRef> {
        let retained = self.retained(current);
        self.by_key
            .iter()
            .filter(|(key, _)| !current.contains(key))
            .flat_map(|(_, elements)| elements.iter().copied())
            .filter(|element| !retained.contains(element))
            .collect()
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether nothing was exported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl FromIterator<(SourceKey, ElementRef)> for ExportedElements {
    fn from_iter<I: IntoIterator<Item = (SourceKey, ElementRef)>>(iter: I) -> Self {
        let mut exported = Self::default();
        for (key, element) in iter {
            exported.record(key, element);
        }
        exported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;
    use rstest::rstest;

    fn trail(x: f64) -> SourceRecord {
        SourceRecord::new(SourceGeometry::Line(vec![
            SourceVertex::new(Coord { x, y: 0.0 }),
            SourceVertex::new(Coord { x: x + 1.0, y: 0.0 }),
        ]))
    }

    #[rstest]
    fn identified_records_are_keyed_by_element() {
        let point = SourceRecord::new(SourceGeometry::Point(Coord { x: 1.0, y: 1.0 })).with_id(6);
        let polygon = SourceRecord::new(SourceGeometry::Polygon(vec![Vec::new(), Vec::new()])).with_id(8);
        assert_eq!(SourceKey::of(&point), SourceKey::Element(ElementRef::point(6)));
        assert_eq!(SourceKey::of(&polygon), SourceKey::Element(ElementRef::linear(8)));
        assert_eq!(SourceKey::of(&trail(0.0).with_id(4)), SourceKey::Element(ElementRef::linear(4)));
    }

    #[rstest]
    fn unchanged_records_keep_their_fingerprint() {
        let first = SourceKey::of(&trail(0.0).with_tag("name", "Ridge"));
        let again = SourceKey::of(&trail(0.0).with_tag("name", "Ridge"));
        assert_eq!(first, again);
        assert!(matches!(first, SourceKey::Content(_)));
    }

    #[rstest]
    #[case::moved(trail(0.5).with_tag("name", "Ridge"))]
    #[case::retagged(trail(0.0).with_tag("name", "Valley"))]
    #[case::untagged(trail(0.0))]
    #[case::bound_vertex(SourceRecord::new(SourceGeometry::Line(vec![
        SourceVertex::existing(3, Coord { x: 0.0, y: 0.0 }),
        SourceVertex::new(Coord { x: 1.0, y: 0.0 }),
    ])).with_tag("name", "Ridge"))]
    fn edited_records_change_their_fingerprint(#[case] edited: SourceRecord) {
        let original = SourceKey::of(&trail(0.0).with_tag("name", "Ridge"));
        assert_ne!(SourceKey::of(&edited), original);
    }

    #[rstest]
    #[case("way/12", SourceKey::Element(ElementRef::linear(12)))]
    #[case("node/-3", SourceKey::Element(ElementRef::point(-3)))]
    #[case("relation/9", SourceKey::Element(ElementRef::grouping(9)))]
    #[case("content/00000000000000ff", SourceKey::Content(255))]
    fn keys_parse_their_display_form(#[case] text: &str, #[case] key: SourceKey) {
        assert_eq!(text.parse::<SourceKey>(), Ok(key));
        assert_eq!(key.to_string(), text);
    }

    #[rstest]
    #[case("way")]
    #[case("street/1")]
    #[case("way/x")]
    #[case("content/zz")]
    fn malformed_keys_are_rejected(#[case] text: &str) {
        assert_eq!(text.parse::<SourceKey>(), Err(ParseSourceKeyError(text.to_owned())));
    }

    #[rstest]
    fn dropped_elements_exclude_those_still_exported() {
        let kept = SourceKey::Element(ElementRef::linear(1));
        let gone = SourceKey::Content(1);
        let exported: ExportedElements = [
            (kept, ElementRef::linear(10)),
            (gone, ElementRef::linear(11)),
            (gone, ElementRef::point(12)),
            (gone, ElementRef::linear(10)),
        ]
        .into_iter()
        .collect();
        let current = BTreeSet::from([kept, SourceKey::Content(2)]);
        assert_eq!(exported.retained(&current), BTreeSet::from([ElementRef::linear(10)]));
        assert_eq!(
            exported.dropped(&current),
            BTreeSet::from([ElementRef::point(12), ElementRef::linear(11)])
        );
        assert_eq!(exported.len(), 2);
        assert_eq!(exported.get(&gone).map(<[ElementRef]>::len), Some(3));
    }
}
