//! Input and output path checks shared by the subcommands.

use camino::Utf8Path;

use crate::CliError;

pub(crate) fn require_existing(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
    let inspect = |source| CliError::InspectSourcePath {
        field,
        path: path.to_path_buf(),
        source,
    };
    if osmweave_fs::is_file(path).map_err(inspect)? {
        return Ok(());
    }
    if osmweave_fs::is_dir(path).map_err(inspect)? {
        Err(CliError::SourcePathNotFile {
            field,
            path: path.to_path_buf(),
        })
    } else {
        Err(CliError::MissingSourceFile {
            field,
            path: path.to_path_buf(),
        })
    }
}

/// The output directory may be missing; it is created on first write.
pub(crate) fn require_output_dir(path: &Utf8Path) -> Result<(), CliError> {
    match osmweave_fs::is_file(path) {
        Ok(false) => Ok(()),
        Ok(true) => Err(CliError::OutputDirectoryNotDirectory {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(CliError::InspectSourcePath {
            field: crate::ARG_OUTPUT_DIR,
            path: path.to_path_buf(),
            source,
        }),
    }
}
