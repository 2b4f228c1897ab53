//! Behavioural tests for generating change files from a SQLite database.

use camino::Utf8PathBuf;
use flate2::read::GzDecoder;
use geo::Coord;
use osmweave_core::{
    ChangeError, ChangeGenerator, EmptyBaseMap, GeneratorConfig, LayerInfo, SourceError, SourceGeometry, SourceRecord,
    SourceVertex,
};
use osmweave_data::{Compression, SqliteFeatureSource, persist_layer, write_change_file};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::{cell::RefCell, fs, io::Read, path::PathBuf};
use tempfile::TempDir;

type Written = RefCell<Option<Result<String, ChangeError>>>;

struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    fn database(&self) -> Utf8PathBuf {
        self.root.join("import.db")
    }
}

#[fixture]
fn workspace() -> RefCell<Option<Workspace>> {
    RefCell::new(None)
}

#[fixture]
fn written() -> Written {
    RefCell::new(None)
}

fn imported_trail(from: (f64, f64), to: (f64, f64)) -> SourceRecord {
    SourceRecord::new(SourceGeometry::Line(vec![
        SourceVertex::new(Coord { x: from.0, y: from.1 }),
        SourceVertex::new(Coord { x: to.0, y: to.1 }),
    ]))
    .with_tag("highway", "path")
}

fn write_layer(workspace: &RefCell<Option<Workspace>>, written: &Written, layer: &str, compression: Compression) {
    let guard = workspace.borrow();
    let workspace = guard.as_ref().expect("database prepared");
    let source = SqliteFeatureSource::open(&workspace.database()).expect("open database");
    let config = GeneratorConfig {
        self_intersections: true,
        ..GeneratorConfig::default()
    };
    let outcome = ChangeGenerator::new(&source, EmptyBaseMap)
        .with_config(config)
        .generate_changes(layer);
    let result = outcome.map(|outcome| {
        let path = workspace.root.join(format!("out/{layer}.{}", compression.extension()));
        write_change_file(&path, &outcome.changes.into_ordered(), compression).expect("write change file");
        let raw = fs::read(path.as_std_path()).expect("read change file");
        match compression {
            Compression::None => String::from_utf8(raw).expect("utf-8 change file"),
            Compression::Gzip => {
                let mut xml = String::new();
                GzDecoder::new(raw.as_slice())
                    .read_to_string(&mut xml)
                    .expect("gunzip change file");
                xml
            }
        }
    });
    *written.borrow_mut() = Some(result);
}

fn expect_xml(written: &Written) -> String {
    written
        .borrow()
        .as_ref()
        .expect("change file was attempted")
        .as_ref()
        .expect("change generation succeeded")
        .clone()
}

#[given("a database with two imported trails crossing at 1,1")]
fn crossing_database(#[from(workspace)] workspace: &RefCell<Option<Workspace>>) {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    let prepared = Workspace { _dir: dir, root };
    persist_layer(
        &prepared.database(),
        &LayerInfo::new("trails", 4326),
        &[
            imported_trail((0.0, 0.0), (2.0, 2.0)),
            imported_trail((0.0, 2.0), (2.0, 0.0)),
        ],
    )
    .expect("persist trails");
    *workspace.borrow_mut() = Some(prepared);
}

#[when("the trails layer is written to an uncompressed change file")]
fn write_plain(#[from(workspace)] workspace: &RefCell<Option<Workspace>>, #[from(written)] written: &Written) {
    write_layer(workspace, written, "trails", Compression::None);
}

#[when("the trails layer is written to a gzip change file")]
fn write_gzip(#[from(workspace)] workspace: &RefCell<Option<Workspace>>, #[from(written)] written: &Written) {
    write_layer(workspace, written, "trails", Compression::Gzip);
}

#[when("the rivers layer is written to an uncompressed change file")]
fn write_missing(#[from(workspace)] workspace: &RefCell<Option<Workspace>>, #[from(written)] written: &Written) {
    write_layer(workspace, written, "rivers", Compression::None);
}

#[then("the change file creates 5 nodes and 4 ways")]
fn creates_nodes_and_ways(#[from(written)] written: &Written) {
    let xml = expect_xml(written);
    assert_eq!(xml.matches("<node ").count(), 5, "unexpected nodes in {xml}");
    assert_eq!(xml.matches("<way ").count(), 4, "unexpected ways in {xml}");
    assert_eq!(xml.matches(r#"<tag k="highway" v="path"/>"#).count(), 4);
}

#[then("the change file has no modify or delete blocks")]
fn only_creates(#[from(written)] written: &Written) {
    let xml = expect_xml(written);
    assert!(xml.contains("<create>"));
    assert!(!xml.contains("<modify>"));
    assert!(!xml.contains("<delete>"));
}

#[then("a missing layer error names rivers")]
fn missing_layer(#[from(written)] written: &Written) {
    let guard = written.borrow();
    match guard.as_ref().expect("change file was attempted") {
        Err(ChangeError::Source(SourceError::MissingLayer { layer })) => assert_eq!(layer, "rivers"),
        other => panic!("expected a missing layer error, got {other:?}"),
    }
}

#[test]
fn scenario_indices_follow_feature_order() {
    let feature = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/features/change_files.feature");
    let contents = fs::read_to_string(&feature).unwrap_or_else(|err| {
        panic!("failed to read feature file {feature:?}: {err}");
    });
    let titles: Vec<&str> = contents
        .lines()
        .filter_map(|line| line.trim().strip_prefix("Scenario: "))
        .collect();
    assert_eq!(
        titles,
        [
            "writing a plain change file for crossing trails",
            "writing a compressed change file",
            "requesting a layer the database lacks",
        ]
    );
}

#[scenario(path = "tests/features/change_files.feature", index = 0)]
fn writing_plain_change_files(workspace: RefCell<Option<Workspace>>, written: Written) {
    let _ = (workspace, written);
}

#[scenario(path = "tests/features/change_files.feature", index = 1)]
fn writing_compressed_change_files(workspace: RefCell<Option<Workspace>>, written: Written) {
    let _ = (workspace, written);
}

#[scenario(path = "tests/features/change_files.feature", index = 2)]
fn reporting_missing_layers(workspace: RefCell<Option<Workspace>>, written: Written) {
    let _ = (workspace, written);
}
