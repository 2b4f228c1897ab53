//! SQLite-backed feature layers.
//!
//! A database holds any number of layers. Each feature row stores its tags
//! and geometry as JSON next to a bounding box that envelope queries use:
//!
//! ```sql
//! CREATE TABLE layers (name TEXT PRIMARY KEY, epsg INTEGER NOT NULL, fields TEXT NOT NULL);
//! CREATE TABLE features (
//!     layer TEXT NOT NULL REFERENCES layers(name) ON DELETE CASCADE,
//!     seq INTEGER NOT NULL,
//!     element_id INTEGER,
//!     version INTEGER,
//!     tags TEXT NOT NULL,
//!     geometry TEXT NOT NULL,
//!     min_x REAL, min_y REAL, max_x REAL, max_y REAL,
//!     PRIMARY KEY (layer, seq)
//! );
//! ```
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use geo::{Coord, Rect};
use log::debug;
use osmweave_core::{
    ElementId, FeatureSource, LayerInfo, SourceError, SourceGeometry, SourceRecord, SourceVertex, Tags,
};
use rusqlite::{Connection, Error as SqliteError, OpenFlags, OptionalExtension, Row, Transaction, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS layers (
        name TEXT PRIMARY KEY,
        epsg INTEGER NOT NULL,
        fields TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS features (
        layer TEXT NOT NULL REFERENCES layers(name) ON DELETE CASCADE,
        seq INTEGER NOT NULL,
        element_id INTEGER,
        version INTEGER,
        tags TEXT NOT NULL,
        geometry TEXT NOT NULL,
        min_x REAL,
        min_y REAL,
        max_x REAL,
        max_y REAL,
        PRIMARY KEY (layer, seq)
    );
    CREATE INDEX IF NOT EXISTS features_bounds ON features (layer, min_x, max_x, min_y, max_y);
";

const FEATURE_COLUMNS: &str = "seq, element_id, version, tags, geometry";

/// Errors raised while reading layers from SQLite.
#[derive(Debug, Error)]
pub enum SqliteSourceError {
    /// Opening the database failed.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A query against a layer failed.
    #[error("failed to query layer {layer}")]
    Query {
        /// Layer being read.
        layer: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A stored JSON column could not be decoded.
    #[error("feature {seq} in layer {layer} holds malformed {column}")]
    Decode {
        /// Layer being read.
        layer: String,
        /// Row sequence number.
        seq: i64,
        /// Column that failed to decode.
        column: &'static str,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// A stored integer does not fit the target type.
    #[error("feature {seq} in layer {layer} has out-of-range {column}")]
    OutOfRange {
        /// Layer being read.
        layer: String,
        /// Row sequence number.
        seq: i64,
        /// Offending column.
        column: &'static str,
    },
}

impl From<SqliteSourceError> for SourceError {
    fn from(err: SqliteSourceError) -> Self {
        SourceError::backend("reading SQLite feature layer", err)
    }
}

/// Errors raised when writing a layer to SQLite.
#[derive(Debug, Error)]
pub enum PersistLayerError {
    /// Failed to create the parent directory for the database.
    #[error("failed to create parent directory for {path:?}")]
    CreateDirectory {
        /// Database path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening the database failed.
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Enabling foreign keys failed.
    #[error("failed to enable SQLite foreign keys")]
    ForeignKeys {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Beginning the transaction failed.
    #[error("failed to begin layer persistence transaction")]
    BeginTransaction {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Creating the schema failed.
    #[error("failed to create layer tables")]
    CreateSchema {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Replacing the layer row failed.
    #[error("failed to register layer {layer}")]
    RegisterLayer {
        /// Layer name.
        layer: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Serialising a record's tags or geometry failed.
    #[error("failed to serialise feature {seq} of layer {layer}")]
    Serialize {
        /// Layer name.
        layer: String,
        /// Position of the record in the layer.
        seq: usize,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// Preparing the insert statement failed.
    #[error("failed to prepare feature insert statement")]
    PrepareInsert {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Writing a feature row failed.
    #[error("failed to persist feature {seq} of layer {layer}")]
    PersistRow {
        /// Layer name.
        layer: String,
        /// Position of the record in the layer.
        seq: usize,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Committing the transaction failed.
    #[error("failed to commit layer persistence transaction")]
    Commit {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredVertex {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<ElementId>,
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StoredGeometry {
    Point { x: f64, y: f64 },
    Line { vertices: Vec<StoredVertex> },
    Polygon { rings: Vec<Vec<StoredVertex>> },
}

impl From<&SourceVertex> for StoredVertex {
    fn from(vertex: &SourceVertex) -> Self {
        Self {
            id: vertex.id,
            x: vertex.location.x,
            y: vertex.location.y,
        }
    }
}

impl From<StoredVertex> for SourceVertex {
    fn from(vertex: StoredVertex) -> Self {
        Self {
            id: vertex.id,
            location: Coord {
                x: vertex.x,
                y: vertex.y,
            },
        }
    }
}

impl From<&SourceGeometry> for StoredGeometry {
    fn from(geometry: &SourceGeometry) -> Self {
        match geometry {
            SourceGeometry::Point(c) => Self::Point { x: c.x, y: c.y },
            SourceGeometry::Line(vertices) => Self::Line {
                vertices: vertices.iter().map(StoredVertex::from).collect(),
            },
            SourceGeometry::Polygon(rings) => Self::Polygon {
                rings: rings
                    .iter()
                    .map(|ring| ring.iter().map(StoredVertex::from).collect())
                    .collect(),
            },
        }
    }
}

impl From<StoredGeometry> for SourceGeometry {
    fn from(geometry: StoredGeometry) -> Self {
        match geometry {
            StoredGeometry::Point { x, y } => Self::Point(Coord { x, y }),
            StoredGeometry::Line { vertices } => Self::Line(vertices.into_iter().map(SourceVertex::from).collect()),
            StoredGeometry::Polygon { rings } => Self::Polygon(
                rings
                    .into_iter()
                    .map(|ring| ring.into_iter().map(SourceVertex::from).collect())
                    .collect(),
            ),
        }
    }
}

/// Bounding box of every coordinate in `geometry`, if it has any.
fn geometry_bounds(geometry: &SourceGeometry) -> Option<Rect<f64>> {
    let coords: Vec<Coord<f64>> = match geometry {
        SourceGeometry::Point(c) => vec![*c],
        SourceGeometry::Line(vertices) => vertices.iter().map(|v| v.location).collect(),
        SourceGeometry::Polygon(rings) => rings.iter().flatten().map(|v| v.location).collect(),
    };
    let (first, rest) = coords.split_first()?;
    let (min, max) = rest.iter().fold((*first, *first), |(min, max), c| {
        (
            Coord {
                x: min.x.min(c.x),
                y: min.y.min(c.y),
            },
            Coord {
                x: max.x.max(c.x),
                y: max.y.max(c.y),
            },
        )
    });
    Some(Rect::new(min, max))
}

/// Feature layers stored in a SQLite database.
///
/// # Examples
/// ```no_run
/// use camino::Utf8Path;
/// use osmweave_core::FeatureSource;
/// use osmweave_data::SqliteFeatureSource;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = SqliteFeatureSource::open(Utf8Path::new("import.db"))?;
/// let info = source.layer_info("trails")?;
/// println!("trails use EPSG:{}", info.epsg);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteFeatureSource {
    connection: Connection,
}

impl SqliteFeatureSource {
    /// Open an existing database read-only.
    ///
    /// # Errors
    /// Returns [`SqliteSourceError::Open`] when the file cannot be opened.
    pub fn open(path: &Utf8Path) -> Result<Self, SqliteSourceError> {
        let connection = Connection::open_with_flags(
            path.as_std_path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| SqliteSourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("opened feature database {path}");
        Ok(Self { connection })
    }

    /// Wrap an already-open connection.
    #[must_use]
    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    /// Names of every stored layer, sorted.
    ///
    /// # Errors
    /// Surfaces query failures.
    pub fn layer_names(&self) -> Result<Vec<String>, SqliteSourceError> {
        let query_error = |source| SqliteSourceError::Query {
            layer: "*".to_owned(),
            source,
        };
        let mut statement = self
            .connection
            .prepare("SELECT name FROM layers ORDER BY name")
            .map_err(query_error)?;
        let names = statement
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(query_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        Ok(names)
    }

    fn query_layer<P: rusqlite::Params>(
        &self,
        layer: &str,
        sql: &str,
        params: P,
    ) -> Result<Vec<SourceRecord>, SqliteSourceError> {
        let query_error = |source| SqliteSourceError::Query {
            layer: layer.to_owned(),
            source,
        };
        let mut statement = self.connection.prepare(sql).map_err(query_error)?;
        let rows = statement
            .query_map(params, RawFeature::from_row)
            .map_err(query_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error)?;
        rows.into_iter().map(|raw| raw.decode(layer)).collect()
    }

    fn ensure_layer(&self, layer: &str) -> Result<LayerInfo, SourceError> {
        let row = self
            .connection
            .query_row(
                "SELECT epsg, fields FROM layers WHERE name = ?1",
                [layer],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(|source| SqliteSourceError::Query {
                layer: layer.to_owned(),
                source,
            })?;
        let Some((epsg, fields)) = row else {
            return Err(SourceError::MissingLayer {
                layer: layer.to_owned(),
            });
        };
        let fields = serde_json::from_str(&fields).map_err(|source| SqliteSourceError::Decode {
            layer: layer.to_owned(),
            seq: -1,
            column: "fields",
            source,
        })?;
        Ok(LayerInfo {
            name: layer.to_owned(),
            epsg,
            fields,
        })
    }
}

/// A feature row before its JSON columns are decoded.
struct RawFeature {
    seq: i64,
    id: Option<i64>,
    version: Option<i64>,
    tags: String,
    geometry: String,
}

impl RawFeature {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            version: row.get(2)?,
            tags: row.get(3)?,
            geometry: row.get(4)?,
        })
    }

    fn decode(self, layer: &str) -> Result<SourceRecord, SqliteSourceError> {
        let decode_error = |column, source| SqliteSourceError::Decode {
            layer: layer.to_owned(),
            seq: self.seq,
            column,
            source,
        };
        let tags: Tags = serde_json::from_str(&self.tags).map_err(|source| decode_error("tags", source))?;
        let geometry: StoredGeometry =
            serde_json::from_str(&self.geometry).map_err(|source| decode_error("geometry", source))?;
        let version = self
            .version
            .map(u32::try_from)
            .transpose()
            .map_err(|_| SqliteSourceError::OutOfRange {
                layer: layer.to_owned(),
                seq: self.seq,
                column: "version",
            })?;
        Ok(SourceRecord {
            id: self.id,
            version,
            tags,
            geometry: geometry.into(),
        })
    }
}

impl FeatureSource for SqliteFeatureSource {
    fn layer_info(&self, layer: &str) -> Result<LayerInfo, SourceError> {
        self.ensure_layer(layer)
    }

    fn features(&self, layer: &str) -> Result<Vec<SourceRecord>, SourceError> {
        self.ensure_layer(layer)?;
        let sql = format!("SELECT {FEATURE_COLUMNS} FROM features WHERE layer = ?1 ORDER BY seq");
        let records = self.query_layer(layer, &sql, [layer])?;
        debug!("read {} feature(s) from layer {layer}", records.len());
        Ok(records)
    }

    fn features_intersecting(&self, layer: &str, bounds: &Rect<f64>) -> Result<Vec<SourceRecord>, SourceError> {
        self.ensure_layer(layer)?;
        let sql = format!(
            "SELECT {FEATURE_COLUMNS} FROM features
             WHERE layer = ?1 AND max_x >= ?2 AND min_x <= ?3 AND max_y >= ?4 AND min_y <= ?5
             ORDER BY seq"
        );
        let (min, max) = (bounds.min(), bounds.max());
        let records = self.query_layer(layer, &sql, params![layer, min.x, max.x, min.y, max.y])?;
        debug!(
            "{} feature(s) of layer {layer} overlap ({}, {})-({}, {})",
            records.len(),
            min.x,
            min.y,
            max.x,
            max.y
        );
        Ok(records)
    }
}

/// Write `records` as layer `info.name`, replacing any previous contents of
/// that layer.
///
/// Parent directories are created automatically and the schema is
/// initialised if missing. Other layers in the database are left alone.
///
/// # Errors
/// Returns a [`PersistLayerError`] describing the step that failed; nothing
/// is committed in that case.
pub fn persist_layer(path: &Utf8Path, info: &LayerInfo, records: &[SourceRecord]) -> Result<(), PersistLayerError> {
    osmweave_fs::ensure_parent_dir(path).map_err(|source| PersistLayerError::CreateDirectory {
        path: path.to_path_buf(),
        source,
    })?;
    let mut connection = Connection::open(path.as_std_path()).map_err(|source| PersistLayerError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    connection
        .pragma_update(None, "foreign_keys", true)
        .map_err(|source| PersistLayerError::ForeignKeys { source })?;

    let transaction = connection
        .transaction()
        .map_err(|source| PersistLayerError::BeginTransaction { source })?;
    transaction
        .execute_batch(SCHEMA)
        .map_err(|source| PersistLayerError::CreateSchema { source })?;
    register_layer(&transaction, info)?;
    persist_rows(&transaction, &info.name, records)?;
    transaction
        .commit()
        .map_err(|source| PersistLayerError::Commit { source })?;
    debug!("persisted {} feature(s) to layer {} in {path}", records.len(), info.name);
    Ok(())
}

fn register_layer(transaction: &Transaction<'_>, info: &LayerInfo) -> Result<(), PersistLayerError> {
    let register_error = |source| PersistLayerError::RegisterLayer {
        layer: info.name.clone(),
        source,
    };
    let fields = serde_json::to_string(&info.fields).map_err(|source| PersistLayerError::Serialize {
        layer: info.name.clone(),
        seq: 0,
        source,
    })?;
    transaction
        .execute("DELETE FROM features WHERE layer = ?1", [&info.name])
        .map_err(register_error)?;
    transaction
        .execute(
            "INSERT INTO layers (name, epsg, fields) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET epsg = excluded.epsg, fields = excluded.fields",
            params![info.name, info.epsg, fields],
        )
        .map(|_| ())
        .map_err(register_error)
}

fn persist_rows(transaction: &Transaction<'_>, layer: &str, records: &[SourceRecord]) -> Result<(), PersistLayerError> {
    if records.is_empty() {
        return Ok(());
    }
    let mut statement = transaction
        .prepare(
            "INSERT INTO features
                (layer, seq, element_id, version, tags, geometry, min_x, min_y, max_x, max_y)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .map_err(|source| PersistLayerError::PrepareInsert { source })?;

    for (seq, record) in records.iter().enumerate() {
        let serialize_error = |source| PersistLayerError::Serialize {
            layer: layer.to_owned(),
            seq,
            source,
        };
        let tags = serde_json::to_string(&record.tags).map_err(serialize_error)?;
        let geometry = serde_json::to_string(&StoredGeometry::from(&record.geometry)).map_err(serialize_error)?;
        let bounds = geometry_bounds(&record.geometry);
        let (min, max) = (bounds.map(|b| b.min()), bounds.map(|b| b.max()));
        statement
            .execute(params![
                layer,
                seq,
                record.id,
                record.version,
                tags,
                geometry,
                min.map(|c| c.x),
                min.map(|c| c.y),
                max.map(|c| c.x),
                max.map(|c| c.y),
            ])
            .map_err(|source| PersistLayerError::PersistRow {
                layer: layer.to_owned(),
                seq,
                source,
            })?;
    }
    Ok(())
}
