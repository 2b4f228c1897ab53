//! Command-line interface for generating osmChange files from prepared
//! SQLite layers.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::debug;

mod deletions;
mod error;
mod generate;
mod paths;

pub use error::CliError;

use deletions::DeletionsArgs;
use generate::GenerateArgs;

pub(crate) const ARG_DATABASE: &str = "database";
pub(crate) const ARG_LAYER: &str = "layer";
pub(crate) const ARG_OTHER_LAYER: &str = "other-layer";
pub(crate) const ARG_DISTANCE_BUFFER: &str = "distance-buffer";
pub(crate) const ARG_MAX_POINTS: &str = "max-points";
pub(crate) const ARG_ID_OFFSET: &str = "id-offset";
pub(crate) const ARG_CONFIRMED_IDS: &str = "confirmed-ids";
pub(crate) const ARG_NO_COLLISIONS: &str = "no-collisions";
pub(crate) const ARG_MEMBERSHIP_TAG: &str = "membership-tag";
pub(crate) const ARG_BASE_MAP: &str = "base-map";
pub(crate) const ARG_OUTPUT_DIR: &str = "output-dir";
pub(crate) const ARG_MANIFEST: &str = "manifest";

pub(crate) const ENV_GENERATE_DATABASE: &str = "OSMWEAVE_CMDS_GENERATE_DATABASE";
pub(crate) const ENV_GENERATE_LAYER: &str = "OSMWEAVE_CMDS_GENERATE_LAYERS";
pub(crate) const ENV_DELETIONS_DATABASE: &str = "OSMWEAVE_CMDS_DELETIONS_DATABASE";
pub(crate) const ENV_DELETIONS_LAYER: &str = "OSMWEAVE_CMDS_DELETIONS_LAYER";
pub(crate) const ENV_DELETIONS_MANIFEST: &str = "OSMWEAVE_CMDS_DELETIONS_MANIFEST";

/// Run the osmweave CLI with the current process arguments and environment.
///
/// # Errors
/// Returns a [`CliError`] describing the first failure; argument errors
/// include `--help` and `--version` requests, which the caller should let
/// clap print.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging(cli.verbose);
    match cli.command {
        Command::Generate(args) => {
            for report in generate::run_generate(args)? {
                debug!(
                    "layer {} written to {} (manifest: {:?}, stats: {})",
                    report.layer,
                    report.change_file,
                    report.manifest,
                    serde_json::to_string(&report.stats).unwrap_or_default()
                );
            }
        }
        Command::Deletions(args) => {
            let path = deletions::run_deletions(args)?;
            debug!("deletions written to {path}");
        }
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    // A logger installed by an embedding process takes precedence.
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init()
        .ok();
}

#[derive(Debug, Parser)]
#[command(
    name = "osmweave",
    about = "Reconcile imported line layers with a published map and emit osmChange files",
    version
)]
struct Cli {
    /// Log progress at debug level.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate create/modify/delete changes for one or more layers.
    Generate(GenerateArgs),
    /// Delete elements a previous export produced that the layer has dropped.
    Deletions(DeletionsArgs),
}

#[cfg(test)]
mod tests;
