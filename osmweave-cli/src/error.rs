//! Error types emitted by the osmweave CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use osmweave_core::ChangeError;
use osmweave_data::{BaseMapError, ManifestError, SqliteSourceError, WriteChangeError};
use thiserror::Error;

/// Errors emitted by the osmweave CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// An option value could not be interpreted.
    #[error("invalid --{field} value {value:?}: {reason}")]
    InvalidArgument {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    /// An option was given without the option it depends on.
    #[error("--{option} requires --{requires}")]
    RequiresOption {
        option: &'static str,
        requires: &'static str,
    },
    /// The merged options describe an invalid generator configuration.
    #[error(transparent)]
    InvalidConfig(ChangeError),
    /// A referenced input path does not exist on disk.
    #[error("{field} path {path:?} does not exist")]
    MissingSourceFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path exists but is not a file.
    #[error("{field} path {path:?} exists but is not a file")]
    SourcePathNotFile {
        field: &'static str,
        path: Utf8PathBuf,
    },
    /// A referenced input path could not be inspected due to an IO error.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectSourcePath {
        field: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The output directory exists but is not a directory.
    #[error("output directory {path:?} is not a directory")]
    OutputDirectoryNotDirectory { path: Utf8PathBuf },
    /// Opening the source database failed.
    #[error("failed to open source database: {0}")]
    OpenDatabase(#[from] SqliteSourceError),
    /// Loading the base map extract failed.
    #[error("failed to load base map: {0}")]
    LoadBaseMap(#[from] BaseMapError),
    /// The change generator rejected a layer.
    #[error("failed to generate changes for layer {layer}: {source}")]
    Generate {
        layer: String,
        #[source]
        source: ChangeError,
    },
    /// Writing a change file failed.
    #[error("failed to write change file {path:?}: {source}")]
    WriteChanges {
        path: Utf8PathBuf,
        #[source]
        source: WriteChangeError,
    },
    /// Reading or writing an export manifest failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}
