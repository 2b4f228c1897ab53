//! Record of the elements a run exported, consumed by the next deletion pass.

use std::io::{self, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use osmweave_core::ExportedElements;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading or writing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read or written.
    #[error("failed to access manifest {path:?}")]
    Io {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The manifest is not valid JSON of the expected shape.
    #[error("manifest {path:?} is malformed")]
    Format {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Source error produced by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
}

/// Elements exported from one source layer, keyed by the source record
/// that produced them.
///
/// Serialised as `{"layer": "trails", "elements": {"way/7": [...]}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Source layer name.
    pub layer: String,
    /// Exported elements per source record.
    pub elements: ExportedElements,
}

impl ExportManifest {
    /// Build a manifest for `layer`.
    ///
    /// # Examples
    /// ```
    /// use osmweave_core::{ElementRef, ExportedElements, SourceKey};
    /// use osmweave_data::ExportManifest;
    ///
    /// let key = SourceKey::Element(ElementRef::linear(9));
    /// let exported: ExportedElements = [(key, ElementRef::linear(-1))].into_iter().collect();
    /// let manifest = ExportManifest::new("trails", exported);
    /// assert_eq!(manifest.elements.get(&key), Some(&[ElementRef::linear(-1)][..]));
    /// ```
    pub fn new(layer: impl Into<String>, elements: ExportedElements) -> Self {
        Self {
            layer: layer.into(),
            elements,
        }
    }

    /// Read a manifest from `path`.
    ///
    /// # Errors
    /// Returns [`ManifestError::Io`] when the file cannot be read and
    /// [`ManifestError::Format`] when it does not parse.
    pub fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        let text = osmweave_fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ManifestError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the manifest to `path` as pretty-printed JSON, creating parent
    /// directories as needed.
    ///
    /// # Errors
    /// Returns [`ManifestError::Io`] when the file cannot be written.
    pub fn save(&self, path: &Utf8Path) -> Result<(), ManifestError> {
        let io_error = |source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = osmweave_fs::create_file(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| ManifestError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        writer.write_all(b"\n").map_err(io_error)?;
        writer.flush().map_err(io_error)
    }
}
