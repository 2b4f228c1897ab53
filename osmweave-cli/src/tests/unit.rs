//! Focused unit tests covering CLI parsing and configuration validation.

use super::helpers::Workspace;
use super::*;
use crate::deletions::{DeletionsArgs, DeletionsConfig};
use crate::generate::{GenerateArgs, GenerateConfig};
use camino::Utf8PathBuf;
use osmweave_core::{ChangeError, DEFAULT_MAX_POINTS, IdentifierMode};
use osmweave_data::Compression;
use rstest::{fixture, rstest};
use std::fs;

#[fixture]
fn generate_args() -> GenerateArgs {
    GenerateArgs {
        database: Some(Utf8PathBuf::from("import.db")),
        layers: vec!["trails".to_owned()],
        ..GenerateArgs::default()
    }
}

#[fixture]
fn deletions_args() -> DeletionsArgs {
    DeletionsArgs {
        database: Some(Utf8PathBuf::from("import.db")),
        layer: Some("trails".to_owned()),
        manifest: Some(Utf8PathBuf::from("trails.manifest.json")),
        ..DeletionsArgs::default()
    }
}

fn expect_missing(err: CliError, field: &'static str, env_var: &'static str) {
    match err {
        CliError::MissingArgument { field: missing, env } => {
            assert_eq!(missing, field);
            assert_eq!(env, env_var);
        }
        other => panic!("expected MissingArgument, found {other:?}"),
    }
}

#[rstest]
fn subcommands_parse_repeated_layers() {
    let cli = Cli::try_parse_from([
        "osmweave",
        "--verbose",
        "generate",
        "--database",
        "import.db",
        "--layer",
        "trails",
        "--layer",
        "roads",
        "--self-intersections",
        "--max-points",
        "none",
        "--other-layer",
        "rivers",
        "--other-layer",
        "railways",
    ])
    .expect("arguments parse");
    assert!(cli.verbose);
    match cli.command {
        Command::Generate(args) => {
            assert_eq!(args.layers, ["trails", "roads"]);
            assert_eq!(args.other_layers, ["rivers", "railways"]);
            assert!(!args.no_collisions);
            assert!(args.self_intersections);
            assert_eq!(args.max_points.as_deref(), Some("none"));
            assert!(!args.compress);
        }
        other => panic!("expected generate, found {other:?}"),
    }
}

#[rstest]
fn deletions_subcommand_parses() {
    let cli = Cli::try_parse_from([
        "osmweave",
        "deletions",
        "--database",
        "import.db",
        "--layer",
        "trails",
        "--manifest",
        "out/trails.manifest.json",
        "--delete-points",
    ])
    .expect("arguments parse");
    match cli.command {
        Command::Deletions(args) => {
            assert_eq!(args.layer.as_deref(), Some("trails"));
            assert!(args.delete_points);
        }
        other => panic!("expected deletions, found {other:?}"),
    }
}

#[rstest]
#[case(true, false, ARG_DATABASE, ENV_GENERATE_DATABASE)]
#[case(false, true, ARG_LAYER, ENV_GENERATE_LAYER)]
fn generate_without_required_fields_errors(
    generate_args: GenerateArgs,
    #[case] drop_database: bool,
    #[case] drop_layers: bool,
    #[case] field: &'static str,
    #[case] env_var: &'static str,
) {
    let mut args = generate_args;
    if drop_database {
        args.database = None;
    }
    if drop_layers {
        args.layers.clear();
    }
    let err = GenerateConfig::try_from(args).expect_err("missing field should error");
    expect_missing(err, field, env_var);
}

#[rstest]
#[case(ARG_DATABASE, ENV_DELETIONS_DATABASE)]
#[case(ARG_LAYER, ENV_DELETIONS_LAYER)]
#[case(ARG_MANIFEST, ENV_DELETIONS_MANIFEST)]
fn deletions_without_required_fields_errors(
    deletions_args: DeletionsArgs,
    #[case] field: &'static str,
    #[case] env_var: &'static str,
) {
    let mut args = deletions_args;
    match field {
        ARG_DATABASE => args.database = None,
        ARG_LAYER => args.layer = None,
        _ => args.manifest = None,
    }
    let err = DeletionsConfig::try_from(args).expect_err("missing field should error");
    expect_missing(err, field, env_var);
}

#[rstest]
#[case(None, Some(DEFAULT_MAX_POINTS))]
#[case(Some("none"), None)]
#[case(Some("None"), None)]
#[case(Some(" 50 "), Some(50))]
fn max_points_accepts_counts_and_none(
    generate_args: GenerateArgs,
    #[case] raw: Option<&str>,
    #[case] expected: Option<usize>,
) {
    let args = GenerateArgs {
        max_points: raw.map(str::to_owned),
        ..generate_args
    };
    let config = GenerateConfig::try_from(args).expect("valid configuration");
    assert_eq!(config.generator.max_points_per_feature, expected);
}

#[rstest]
fn unparseable_max_points_are_rejected(generate_args: GenerateArgs) {
    let args = GenerateArgs {
        max_points: Some("lots".to_owned()),
        ..generate_args
    };
    match GenerateConfig::try_from(args) {
        Err(CliError::InvalidArgument { field, value, .. }) => {
            assert_eq!(field, ARG_MAX_POINTS);
            assert_eq!(value, "lots");
        }
        other => panic!("expected InvalidArgument, found {other:?}"),
    }
}

#[rstest]
fn out_of_range_values_fail_generator_validation(generate_args: GenerateArgs) {
    let args = GenerateArgs {
        max_points: Some("1".to_owned()),
        ..generate_args
    };
    match GenerateConfig::try_from(args) {
        Err(CliError::InvalidConfig(ChangeError::InvalidConfig { .. })) => {}
        other => panic!("expected InvalidConfig, found {other:?}"),
    }
}

#[rstest]
fn id_offset_requires_confirmed_ids(generate_args: GenerateArgs) {
    let args = GenerateArgs {
        id_offset: Some(5000),
        ..generate_args
    };
    match GenerateConfig::try_from(args) {
        Err(CliError::RequiresOption { option, requires }) => {
            assert_eq!(option, ARG_ID_OFFSET);
            assert_eq!(requires, ARG_CONFIRMED_IDS);
        }
        other => panic!("expected RequiresOption, found {other:?}"),
    }
}

#[rstest]
fn no_collisions_requires_confirmed_ids(generate_args: GenerateArgs) {
    let args = GenerateArgs {
        no_collisions: true,
        ..generate_args
    };
    match GenerateConfig::try_from(args) {
        Err(CliError::RequiresOption { option, requires }) => {
            assert_eq!(option, ARG_NO_COLLISIONS);
            assert_eq!(requires, ARG_CONFIRMED_IDS);
        }
        other => panic!("expected RequiresOption, found {other:?}"),
    }
}

#[rstest]
fn flags_map_onto_generator_settings(generate_args: GenerateArgs) {
    let args = GenerateArgs {
        id_offset: Some(5000),
        confirmed_ids: true,
        modify_only: true,
        skip_nodes: true,
        no_collisions: true,
        other_layers: vec!["roads".to_owned(), "rivers".to_owned()],
        distance_buffer: Some(0.5),
        membership_tag: Some("route_".to_owned()),
        compress: true,
        manifest: true,
        ..generate_args
    };
    let config = GenerateConfig::try_from(args).expect("valid configuration");
    assert_eq!(config.generator.identifier_mode, IdentifierMode::Confirmed);
    assert_eq!(config.generator.id_offset, 5000);
    assert!(config.generator.modify_only);
    assert!(config.generator.skip_nodes);
    assert!(!config.generator.self_intersections);
    assert!(config.generator.forbid_id_collisions);
    assert_eq!(config.generator.other_layers, ["roads", "rivers"]);
    assert!((config.generator.distance_buffer - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.generator.membership_tag.as_deref(), Some("route_"));
    assert_eq!(config.compression, Compression::Gzip);
    assert!(config.write_manifest);
    assert_eq!(config.output_dir, Utf8PathBuf::from("."));
}

#[rstest]
fn deletion_files_are_named_after_the_layer(deletions_args: DeletionsArgs) {
    let args = DeletionsArgs {
        output_dir: Some(Utf8PathBuf::from("out")),
        compress: true,
        ..deletions_args
    };
    let config = DeletionsConfig::try_from(args).expect("valid configuration");
    assert_eq!(config.change_file(), Utf8PathBuf::from("out/trails-deletions.osc.gz"));
}

#[rstest]
fn validate_sources_reports_missing_files(generate_args: GenerateArgs) {
    let workspace = Workspace::new();
    let mut config = GenerateConfig::try_from(generate_args).expect("valid configuration");
    config.database = workspace.database();
    config.output_dir = workspace.output_dir();
    match config.validate_sources().expect_err("database is missing") {
        CliError::MissingSourceFile { field, path } => {
            assert_eq!(field, ARG_DATABASE);
            assert_eq!(path, workspace.database());
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn validate_sources_rejects_directories(generate_args: GenerateArgs) {
    let workspace = Workspace::new();
    let mut config = GenerateConfig::try_from(generate_args).expect("valid configuration");
    config.database = workspace.root().to_path_buf();
    match config.validate_sources().expect_err("database is a directory") {
        CliError::SourcePathNotFile { field, .. } => assert_eq!(field, ARG_DATABASE),
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn validate_sources_reports_missing_base_maps(generate_args: GenerateArgs) {
    let workspace = Workspace::new();
    workspace.persist("trails", &[]);
    let mut config = GenerateConfig::try_from(generate_args).expect("valid configuration");
    config.database = workspace.database();
    config.base_map = Some(workspace.root().join("planet.osm.pbf"));
    match config.validate_sources().expect_err("base map is missing") {
        CliError::MissingSourceFile { field, .. } => assert_eq!(field, ARG_BASE_MAP),
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn validate_sources_rejects_output_file(deletions_args: DeletionsArgs) {
    let workspace = Workspace::new();
    workspace.persist("trails", &[]);
    let manifest = workspace.root().join("trails.manifest.json");
    let output_file = workspace.root().join("changes.osc");
    fs::write(manifest.as_std_path(), b"{}").expect("write manifest placeholder");
    fs::write(output_file.as_std_path(), b"existing output").expect("write output file");

    let mut config = DeletionsConfig::try_from(deletions_args).expect("valid configuration");
    config.database = workspace.database();
    config.manifest = manifest;
    config.output_dir = output_file;
    match config.validate_sources().expect_err("output is a file") {
        CliError::OutputDirectoryNotDirectory { .. } => {}
        other => panic!("unexpected error {other:?}"),
    }
}

#[rstest]
fn missing_output_directories_are_accepted(generate_args: GenerateArgs) {
    let workspace = Workspace::new();
    workspace.persist("trails", &[]);
    let mut config = GenerateConfig::try_from(generate_args).expect("valid configuration");
    config.database = workspace.database();
    config.output_dir = workspace.output_dir();
    config.validate_sources().expect("output directory is created on write");
}
