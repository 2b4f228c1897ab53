//! osmChange 0.6 serialisation.
//!
//! Blocks are written in `create`, `modify`, `delete` order and empty blocks
//! are omitted. Coordinates carry seven decimal places.

use std::io::{self, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::write::GzEncoder;
use log::info;
use osmweave_core::{Action, Element, OrderedChanges, Tags};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use thiserror::Error;

/// osmChange format version.
pub const OSMCHANGE_VERSION: &str = "0.6";

/// Value of the `generator` attribute on the root element.
pub const GENERATOR: &str = concat!("osmweave ", env!("CARGO_PKG_VERSION"));

/// Errors raised while writing a change file.
#[derive(Debug, Error)]
pub enum WriteChangeError {
    /// The output file could not be created.
    #[error("failed to create change file {path:?}")]
    Create {
        /// Output path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Emitting XML failed.
    #[error("failed to write osmChange XML")]
    Xml {
        /// Source error returned by `quick-xml`.
        #[source]
        source: quick_xml::Error,
    },
    /// Rendered output was not valid UTF-8.
    #[error("rendered osmChange is not valid UTF-8")]
    Encoding {
        /// Conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
    /// Flushing or finishing the output stream failed.
    #[error("failed to finish change file {path:?}")]
    Finish {
        /// Output path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl From<quick_xml::Error> for WriteChangeError {
    fn from(source: quick_xml::Error) -> Self {
        Self::Xml { source }
    }
}

/// Output compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    /// Plain XML.
    #[default]
    None,
    /// Gzip-compressed XML.
    Gzip,
}

impl Compression {
    /// File name suffix for this compression.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::None => "osc",
            Self::Gzip => "osc.gz",
        }
    }
}

/// Streams an osmChange document to a writer.
///
/// # Examples
/// ```
/// use osmweave_core::{ChangeSet, LinearFeature, Tags};
/// use osmweave_data::OsmChangeWriter;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut changes = ChangeSet::default();
/// changes.create(LinearFeature::new(-1, vec![-2, -3], Tags::new())?)?;
/// let bytes = OsmChangeWriter::new(Vec::new()).write(&changes.into_ordered())?;
/// let xml = String::from_utf8(bytes)?;
/// assert!(xml.contains(r#"<way id="-1" version="1">"#));
/// assert!(!xml.contains("<delete>"));
/// # Ok(())
/// # }
/// ```
pub struct OsmChangeWriter<W: Write> {
    writer: Writer<W>,
}

impl<W: Write> OsmChangeWriter<W> {
    /// Wrap `inner`; output is indented by two spaces.
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::new_with_indent(inner, b' ', 2),
        }
    }

    /// Write the whole document and hand back the inner writer.
    ///
    /// # Errors
    /// Returns [`WriteChangeError::Xml`] when the writer fails.
    pub fn write(mut self, changes: &OrderedChanges) -> Result<W, WriteChangeError> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut root = BytesStart::new("osmChange");
        root.push_attribute(("version", OSMCHANGE_VERSION));
        root.push_attribute(("generator", GENERATOR));
        self.writer.write_event(Event::Start(root))?;
        for (action, elements) in [
            (Action::Create, &changes.create),
            (Action::Modify, &changes.modify),
            (Action::Delete, &changes.delete),
        ] {
            self.write_block(action, elements)?;
        }
        self.writer.write_event(Event::End(BytesEnd::new("osmChange")))?;
        Ok(self.writer.into_inner())
    }

    fn write_block(&mut self, action: Action, elements: &[Element]) -> Result<(), WriteChangeError> {
        if elements.is_empty() {
            return Ok(());
        }
        self.writer
            .write_event(Event::Start(BytesStart::new(action.as_str())))?;
        for element in elements {
            self.write_element(element)?;
        }
        self.writer.write_event(Event::End(BytesEnd::new(action.as_str())))?;
        Ok(())
    }

    fn write_element(&mut self, element: &Element) -> Result<(), WriteChangeError> {
        let name = element.kind().as_str();
        let mut start = BytesStart::new(name);
        start.push_attribute(("id", element.id().to_string().as_str()));
        start.push_attribute(("version", element.version().to_string().as_str()));

        match element {
            Element::Point(point) => {
                start.push_attribute(("lat", format!("{:.7}", point.location.y).as_str()));
                start.push_attribute(("lon", format!("{:.7}", point.location.x).as_str()));
                if point.tags.is_empty() {
                    self.writer.write_event(Event::Empty(start))?;
                    return Ok(());
                }
                self.writer.write_event(Event::Start(start))?;
            }
            Element::Linear(line) => {
                self.writer.write_event(Event::Start(start))?;
                for node in &line.nodes {
                    let mut nd = BytesStart::new("nd");
                    nd.push_attribute(("ref", node.to_string().as_str()));
                    self.writer.write_event(Event::Empty(nd))?;
                }
            }
            Element::Grouping(relation) => {
                self.writer.write_event(Event::Start(start))?;
                for member in &relation.members {
                    let mut entry = BytesStart::new("member");
                    entry.push_attribute(("type", member.kind.as_str()));
                    entry.push_attribute(("ref", member.id.to_string().as_str()));
                    entry.push_attribute(("role", member.role.as_str()));
                    self.writer.write_event(Event::Empty(entry))?;
                }
            }
        }
        self.write_tags(element.tags())?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn write_tags(&mut self, tags: &Tags) -> Result<(), WriteChangeError> {
        for (key, value) in tags {
            let mut tag = BytesStart::new("tag");
            tag.push_attribute(("k", key.as_str()));
            tag.push_attribute(("v", value.as_str()));
            self.writer.write_event(Event::Empty(tag))?;
        }
        Ok(())
    }
}

/// Render `changes` as an osmChange string.
///
/// # Errors
/// Returns a [`WriteChangeError`] when serialisation fails.
pub fn render_changes(changes: &OrderedChanges) -> Result<String, WriteChangeError> {
    let bytes = OsmChangeWriter::new(Vec::new()).write(changes)?;
    String::from_utf8(bytes).map_err(|source| WriteChangeError::Encoding { source })
}

/// Write `changes` to `path`, creating parent directories as needed.
///
/// # Errors
/// Returns a [`WriteChangeError`] when the file cannot be created or
/// written.
pub fn write_change_file(
    path: &Utf8Path,
    changes: &OrderedChanges,
    compression: Compression,
) -> Result<(), WriteChangeError> {
    let file = osmweave_fs::create_file(path).map_err(|source| WriteChangeError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let finish_error = |source| WriteChangeError::Finish {
        path: path.to_path_buf(),
        source,
    };
    let buffered = BufWriter::new(file);
    match compression {
        Compression::None => {
            let mut buffered = OsmChangeWriter::new(buffered).write(changes)?;
            buffered.flush().map_err(finish_error)?;
        }
        Compression::Gzip => {
            let encoder = GzEncoder::new(buffered, flate2::Compression::default());
            let encoder = OsmChangeWriter::new(encoder).write(changes)?;
            encoder.finish().and_then(|mut inner| inner.flush()).map_err(finish_error)?;
        }
    }
    info!(
        "wrote {path}: {} create, {} modify, {} delete",
        changes.create.len(),
        changes.modify.len(),
        changes.delete.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use geo::Coord;
    use osmweave_core::{ChangeSet, ElementKind, GroupingObject, LinearFeature, Member, Point};
    use rstest::{fixture, rstest};
    use std::io::Read;
    use tempfile::TempDir;

    #[fixture]
    fn changes() -> OrderedChanges {
        let mut changes = ChangeSet::default();
        changes
            .create(Point::new(-1, Coord { x: 13.123_456_789, y: 52.5 }, Tags::new()))
            .unwrap();
        changes
            .create(
                LinearFeature::new(-2, vec![7, -1], Tags::from([("name".into(), "Fish & Chips \"Lane\"".into())]))
                    .unwrap(),
            )
            .unwrap();
        changes
            .modify(GroupingObject::new(
                5,
                vec![Member::new(ElementKind::Linear, -2, "outer")],
                Tags::from([("type".into(), "multipolygon".into())]),
                4,
            ))
            .unwrap();
        changes.into_ordered()
    }

    #[rstest]
    fn elements_are_written_in_osmchange_shape(changes: OrderedChanges) {
        let xml = render_changes(&changes).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"<osmChange version="0.6" generator="osmweave "#));
        assert!(xml.contains(r#"<node id="-1" version="1" lat="52.5000000" lon="13.1234568"/>"#));
        assert!(xml.contains(r#"<nd ref="7"/>"#));
        assert!(xml.contains(r#"<member type="way" ref="-2" role="outer"/>"#));
        assert!(xml.contains(r#"<tag k="type" v="multipolygon"/>"#));
        assert!(xml.contains("Fish &amp; Chips &quot;Lane&quot;"));
        assert!(!xml.contains("<delete>"), "empty blocks are omitted");
        let create = xml.find("<create>").unwrap();
        let modify = xml.find("<modify>").unwrap();
        assert!(create < modify);
    }

    #[rstest]
    fn tagged_points_get_child_tags() {
        let mut changes = ChangeSet::default();
        changes
            .delete(Point::new(3, Coord { x: 1.0, y: 2.0 }, Tags::from([("amenity".into(), "bench".into())])).with_version(6))
            .unwrap();
        let xml = render_changes(&changes.into_ordered()).unwrap();
        assert!(xml.contains(r#"<node id="3" version="6" lat="2.0000000" lon="1.0000000">"#));
        assert!(xml.contains(r#"<tag k="amenity" v="bench"/>"#));
        assert!(xml.contains("</node>"));
        assert!(xml.contains("<delete>"));
    }

    #[rstest]
    fn empty_changes_produce_an_empty_root() {
        let xml = render_changes(&OrderedChanges::default()).unwrap();
        assert!(xml.contains("<osmChange"));
        assert!(xml.trim_end().ends_with("</osmChange>"));
        assert!(!xml.contains("<create>"));
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    fn files_round_trip_through_disk(changes: OrderedChanges, #[case] compression: Compression) {
        let dir = TempDir::new().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join(format!("out/trails.{}", compression.extension())))
            .expect("utf-8 path");
        write_change_file(&path, &changes, compression).expect("write change file");

        let mut raw = Vec::new();
        std::fs::File::open(path.as_std_path())
            .and_then(|mut f| f.read_to_end(&mut raw))
            .expect("read change file");
        let xml = match compression {
            Compression::None => String::from_utf8(raw).expect("utf-8 output"),
            Compression::Gzip => {
                let mut text = String::new();
                GzDecoder::new(raw.as_slice())
                    .read_to_string(&mut text)
                    .expect("gunzip output");
                text
            }
        };
        assert_eq!(xml, render_changes(&changes).unwrap());
    }
}
