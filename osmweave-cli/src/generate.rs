//! Generate command implementation for the osmweave CLI.

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use osmweave_core::{
    Action, BaseMap, ChangeGenerator, ChangeOutcome, ChangeSet, DEFAULT_MAX_POINTS, EmptyBaseMap, GenerationStats,
    GeneratorConfig, IdentifierMode,
};
use osmweave_data::{Compression, ExportManifest, PbfBaseMap, SqliteFeatureSource, write_change_file};
use serde::{Deserialize, Serialize};

use crate::paths::{require_existing, require_output_dir};
use crate::{
    ARG_BASE_MAP, ARG_CONFIRMED_IDS, ARG_DATABASE, ARG_DISTANCE_BUFFER, ARG_ID_OFFSET, ARG_LAYER, ARG_MAX_POINTS,
    ARG_MEMBERSHIP_TAG, ARG_NO_COLLISIONS, ARG_OTHER_LAYER, ARG_OUTPUT_DIR, CliError, ENV_GENERATE_DATABASE, ENV_GENERATE_LAYER,
};

/// CLI arguments for the `generate` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Reconcile each requested layer of a prepared SQLite \
                 database against the published map and write one \
                 osmChange file per layer. Options can come from CLI \
                 flags, configuration files, or environment variables.",
    about = "Generate osmChange files for imported layers"
)]
#[ortho_config(prefix = "OSMWEAVE")]
pub(crate) struct GenerateArgs {
    /// Path to the SQLite database holding the source layers.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Layer to process; repeat for several layers.
    #[arg(long = ARG_LAYER, value_name = "name")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) layers: Vec<String>,
    /// Layer whose features are checked for crossings with each layer;
    /// repeat for several layers.
    #[arg(long = ARG_OTHER_LAYER, value_name = "name")]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) other_layers: Vec<String>,
    /// Near-miss distance for crossings against other layers.
    #[arg(long = ARG_DISTANCE_BUFFER, value_name = "distance")]
    #[serde(default)]
    pub(crate) distance_buffer: Option<f64>,
    /// Detect crossings between features of the same layer.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) self_intersections: bool,
    /// Maximum points per emitted way, or `none` for no limit.
    #[arg(long = ARG_MAX_POINTS, value_name = "count|none")]
    #[serde(default)]
    pub(crate) max_points: Option<String>,
    /// First identifier handed to imported features.
    #[arg(long = ARG_ID_OFFSET, value_name = "id")]
    #[serde(default)]
    pub(crate) id_offset: Option<i64>,
    /// Issue confirmed, non-negative identifiers for imported features.
    #[arg(long = ARG_CONFIRMED_IDS)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) confirmed_ids: bool,
    /// Fail when confirmed identifiers could reuse ones in the base map.
    #[arg(long = ARG_NO_COLLISIONS)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) no_collisions: bool,
    /// Leave unchanged published ways in place instead of replacing them.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) modify_only: bool,
    /// Do not add points where features cross.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) skip_nodes: bool,
    /// Tag key prefix naming relations a feature should join.
    #[arg(long = ARG_MEMBERSHIP_TAG, value_name = "key")]
    #[serde(default)]
    pub(crate) membership_tag: Option<String>,
    /// OSM PBF extract of the published map.
    #[arg(long = ARG_BASE_MAP, value_name = "path")]
    #[serde(default)]
    pub(crate) base_map: Option<Utf8PathBuf>,
    /// Directory receiving the change files (default: current directory).
    #[arg(long = ARG_OUTPUT_DIR, value_name = "dir")]
    #[serde(default)]
    pub(crate) output_dir: Option<Utf8PathBuf>,
    /// Gzip the change files.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) compress: bool,
    /// Write `<layer>.manifest.json` next to each change file.
    #[arg(long)]
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub(crate) manifest: bool,
}

impl GenerateArgs {
    pub(crate) fn into_config(self) -> Result<GenerateConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        GenerateConfig::try_from(merged)
    }
}

/// Resolved `generate` command configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GenerateConfig {
    /// Path to the source database.
    pub(crate) database: Utf8PathBuf,
    /// Layers to process, in order.
    pub(crate) layers: Vec<String>,
    /// Settings for the first layer; later layers continue its identifiers.
    pub(crate) generator: GeneratorConfig,
    /// Published map extract, if any.
    pub(crate) base_map: Option<Utf8PathBuf>,
    pub(crate) output_dir: Utf8PathBuf,
    pub(crate) compression: Compression,
    pub(crate) write_manifest: bool,
}

impl GenerateConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        require_existing(&self.database, ARG_DATABASE)?;
        if let Some(base_map) = &self.base_map {
            require_existing(base_map, ARG_BASE_MAP)?;
        }
        require_output_dir(&self.output_dir)
    }
}

impl TryFrom<GenerateArgs> for GenerateConfig {
    type Error = CliError;

    fn try_from(args: GenerateArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_GENERATE_DATABASE,
        })?;
        if args.layers.is_empty() {
            return Err(CliError::MissingArgument {
                field: ARG_LAYER,
                env: ENV_GENERATE_LAYER,
            });
        }
        if args.id_offset.is_some() && !args.confirmed_ids {
            return Err(CliError::RequiresOption {
                option: ARG_ID_OFFSET,
                requires: ARG_CONFIRMED_IDS,
            });
        }

        if args.no_collisions && !args.confirmed_ids {
            return Err(CliError::RequiresOption {
                option: ARG_NO_COLLISIONS,
                requires: ARG_CONFIRMED_IDS,
            });
        }

        let defaults = GeneratorConfig::default();
        let generator = GeneratorConfig {
            self_intersections: args.self_intersections,
            other_layers: args.other_layers,
            distance_buffer: args.distance_buffer.unwrap_or(defaults.distance_buffer),
            max_points_per_feature: parse_max_points(args.max_points.as_deref())?,
            id_offset: args.id_offset.unwrap_or(defaults.id_offset),
            identifier_mode: if args.confirmed_ids {
                IdentifierMode::Confirmed
            } else {
                IdentifierMode::Provisional
            },
            modify_only: args.modify_only,
            skip_nodes: args.skip_nodes,
            forbid_id_collisions: args.no_collisions,
            membership_tag: args.membership_tag,
            ..defaults
        };
        generator.validate().map_err(CliError::InvalidConfig)?;

        Ok(Self {
            database,
            layers: args.layers,
            generator,
            base_map: args.base_map,
            output_dir: args.output_dir.unwrap_or_else(|| Utf8PathBuf::from(".")),
            compression: if args.compress {
                Compression::Gzip
            } else {
                Compression::None
            },
            write_manifest: args.manifest,
        })
    }
}

fn parse_max_points(raw: Option<&str>) -> Result<Option<usize>, CliError> {
    match raw.map(str::trim) {
        None => Ok(Some(DEFAULT_MAX_POINTS)),
        Some(value) if value.eq_ignore_ascii_case("none") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| CliError::InvalidArgument {
            field: ARG_MAX_POINTS,
            value: value.to_owned(),
            reason: "expected a point count or `none`",
        }),
    }
}

/// Files written for one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LayerReport {
    pub(crate) layer: String,
    pub(crate) change_file: Utf8PathBuf,
    pub(crate) manifest: Option<Utf8PathBuf>,
    pub(crate) stats: GenerationStats,
}

pub(crate) fn run_generate(args: GenerateArgs) -> Result<Vec<LayerReport>, CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    execute_generate(&config)
}

pub(crate) fn execute_generate(config: &GenerateConfig) -> Result<Vec<LayerReport>, CliError> {
    let source = SqliteFeatureSource::open(&config.database)?;
    match &config.base_map {
        Some(path) => {
            let base = PbfBaseMap::load(path)?;
            generate_layers(config, &source, &base)
        }
        None => generate_layers(config, &source, EmptyBaseMap),
    }
}

fn generate_layers<B: BaseMap>(
    config: &GenerateConfig,
    source: &SqliteFeatureSource,
    base: B,
) -> Result<Vec<LayerReport>, CliError> {
    let mut settings = config.generator.clone();
    let mut reports = Vec::with_capacity(config.layers.len());
    for layer in &config.layers {
        let generator = ChangeGenerator::new(source, &base).with_config(settings.clone());
        let ChangeOutcome {
            changes,
            exported,
            stats,
        } = generator
            .generate_changes(layer)
            .map_err(|source| CliError::Generate {
                layer: layer.clone(),
                source,
            })?;
        continue_identifiers(&mut settings, &changes);

        let change_file = config
            .output_dir
            .join(format!("{layer}.{}", config.compression.extension()));
        write_change_file(&change_file, &changes.into_ordered(), config.compression).map_err(|source| {
            CliError::WriteChanges {
                path: change_file.clone(),
                source,
            }
        })?;

        let manifest = if config.write_manifest {
            let path = manifest_path(&config.output_dir, layer);
            ExportManifest::new(layer.as_str(), exported).save(&path)?;
            Some(path)
        } else {
            None
        };
        info!(
            "layer {layer}: {} features, {} crossings, {} new points, {} split features",
            stats.features, stats.crossings, stats.created_points, stats.split_features
        );
        reports.push(LayerReport {
            layer: layer.clone(),
            change_file,
            manifest,
            stats,
        });
    }
    Ok(reports)
}

/// Move the identifier counters past everything `changes` created so the
/// next layer never reuses an identifier.
fn continue_identifiers(settings: &mut GeneratorConfig, changes: &ChangeSet) {
    for element in changes.refs(Action::Create) {
        if element.id < 0 {
            settings.synthetic_floor = settings.synthetic_floor.min(element.id);
        } else if settings.identifier_mode == IdentifierMode::Confirmed {
            settings.id_offset = settings.id_offset.max(element.id + 1);
        }
    }
}

pub(crate) fn manifest_path(output_dir: &Utf8Path, layer: &str) -> Utf8PathBuf {
    output_dir.join(format!("{layer}.manifest.json"))
}
