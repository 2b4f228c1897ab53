//! Test helpers for preparing source databases and output directories.

use camino::{Utf8Path, Utf8PathBuf};
use geo::Coord;
use osmweave_core::{LayerInfo, SourceGeometry, SourceRecord, SourceVertex};
use osmweave_data::persist_layer;
use tempfile::TempDir;

pub(super) struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub(super) fn database(&self) -> Utf8PathBuf {
        self.root.join("import.db")
    }

    pub(super) fn output_dir(&self) -> Utf8PathBuf {
        self.root.join("out")
    }

    pub(super) fn persist(&self, layer: &str, records: &[SourceRecord]) {
        persist_layer(&self.database(), &LayerInfo::new(layer, 4326), records).expect("persist layer");
    }
}

pub(super) fn imported_trail(from: (f64, f64), to: (f64, f64)) -> SourceRecord {
    SourceRecord::new(SourceGeometry::Line(vec![
        SourceVertex::new(Coord { x: from.0, y: from.1 }),
        SourceVertex::new(Coord { x: to.0, y: to.1 }),
    ]))
    .with_tag("highway", "path")
}

pub(super) fn read(path: &Utf8Path) -> String {
    std::fs::read_to_string(path.as_std_path()).unwrap_or_else(|err| panic!("read {path}: {err}"))
}
