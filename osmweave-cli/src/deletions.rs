//! Deletions command implementation for the osmweave CLI.

use camino::Utf8PathBuf;
use clap::Parser;
use log::{info, warn};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmweave_core::{Action, BaseMap, ChangeGenerator, EmptyBaseMap, GeneratorConfig};
use osmweave_data::{Compression, ExportManifest, PbfBaseMap, SqliteFeatureSource, write_change_file};
use serde::{Deserialize, Serialize};

use crate::paths::{require_existing, require_output_dir};
use crate::{
    ARG_BASE_MAP, ARG_DATABASE, ARG_LAYER, ARG_MANIFEST, ARG_OUTPUT_DIR, CliError, ENV_DELETIONS_DATABASE,
    ENV_DELETIONS_LAYER, ENV_DELETIONS_MANIFEST,
};

/// CLI arguments for the `deletions` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Compare the manifest written by an earlier `generate \
                 --manifest` run with the layer's current contents and \
                 write an osmChange file deleting every element the layer \
                 no longer holds.",
    about = "Generate deletions for features dropped from a layer"
)]
#[ortho_config(prefix = "OSMWEAVE")]
pub(crate) struct DeletionsArgs {
    /// Path to the SQLite database holding the source layer.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Layer to compare against the manifest.
    #[arg(long = ARG_LAYER, value_name = "name")]
    #[serde(default)]
    pub(crate) layer: Option<String>,
    /// Manifest written by the previous export.
    #[arg(long = ARG_MANIFEST, value_name = "path")]
    #[serde(default)]
    pub(crate) manifest: Option<Utf8PathBuf>,
    /// OSM PBF extract of the published map, for versions and relations.
    #[arg(long = ARG_BASE_MAP, value_name = "path")]
    #[serde(default)]
    pub(crate) base_map: Option<Utf8PathBuf>,
    /// Also delete points left unused by deleted ways.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) delete_points: bool,
    /// Directory receiving the change file (default: current directory).
    #[arg(long = ARG_OUTPUT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) output_dir: Option<Utf8PathBuf>,
    /// Gzip the change file.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) compress: bool,
}

impl DeletionsArgs {
    pub(crate) fn into_config(self) -> Result<DeletionsConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        DeletionsConfig::try_from(merged)
    }
}

/// Resolved `deletions` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeletionsConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) layer: String,
    pub(crate) manifest: Utf8PathBuf,
    pub(crate) base_map: Option<Utf8PathBuf>,
    pub(crate) delete_points: bool,
    pub(crate) output_dir: Utf8PathBuf,
    pub(crate) compression: Compression,
}

impl DeletionsConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.database, ARG_DATABASE)?;
        require_existing(&self.manifest, ARG_MANIFEST)?;
        if let Some(base_map) = &self.base_map {
            require_existing(base_map, ARG_BASE_MAP)?;
        }
        require_output_dir(&self.output_dir)
    }

    pub(crate) fn change_file(&self) -> Utf8PathBuf {
        self.output_dir
            .join(format!("{}-deletions.{}", self.layer, self.compression.extension()))
    }
}

impl TryFrom<DeletionsArgs> for DeletionsConfig {
    type Error = CliError;

    fn try_from(args: DeletionsArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_DELETIONS_DATABASE,
        })?;
        let layer = args.layer.ok_or(CliError::MissingArgument {
            field: ARG_LAYER,
            env: ENV_DELETIONS_LAYER,
        })?;
        let manifest = args.manifest.ok_or(CliError::MissingArgument {
            field: ARG_MANIFEST,
            env: ENV_DELETIONS_MANIFEST,
        })?;
        Ok(Self {
            database,
            layer,
            manifest,
            base_map: args.base_map,
            delete_points: args.delete_points,
            output_dir: args.output_dir.unwrap_or_else(|| Utf8PathBuf::from(".")),
            compression: if args.compress {
                Compression::Gzip
            } else {
                Compression::None
            },
        })
    }
}

/// Returns the path of the written change file.
pub(crate) fn run_deletions(args: DeletionsArgs) -> Result<Utf8PathBuf, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    execute_deletions(&config)
}

pub(crate) fn execute_deletions(config: &DeletionsConfig) -> Result<Utf8PathBuf, CliError> {
    let manifest = ExportManifest::load(&config.manifest)?;
    if manifest.layer != config.layer {
        warn!(
            "manifest {} was written for layer {}, comparing it with layer {}",
            config.manifest, manifest.layer, config.layer
        );
    }
    let source = SqliteFeatureSource::open(&config.database)?;
    match &config.base_map {
        Some(path) => {
            let base = PbfBaseMap::load(path)?;
            delete_dropped(config, &manifest, &source, &base)
        }
        None => delete_dropped(config, &manifest, &source, EmptyBaseMap),
    }
}

fn delete_dropped<B: BaseMap>(
    config: &DeletionsConfig,
    manifest: &ExportManifest,
    source: &SqliteFeatureSource,
    base: B,
) -> Result<Utf8PathBuf, CliError> {
    let settings = GeneratorConfig {
        delete_points: config.delete_points,
        ..GeneratorConfig::default()
    };
    let generator = ChangeGenerator::new(source, base).with_config(settings);
    let generate_error = |source| CliError::Generate {
        layer: config.layer.clone(),
        source,
    };
    let current = generator.current_keys(&config.layer).map_err(generate_error)?;
    let changes = generator
        .generate_deletions(&manifest.elements, &current)
        .map_err(generate_error)?;
    info!(
        "layer {}: {} of {} exported elements deleted",
        config.layer,
        changes.count(Action::Delete),
        manifest.elements.elements().len()
    );

    let path = config.change_file();
    write_change_file(&path, &changes.into_ordered(), config.compression).map_err(|source| {
        CliError::WriteChanges {
            path: path.clone(),
            source,
        }
    })?;
    Ok(path)
}
