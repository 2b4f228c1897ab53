//! Capability-based file helpers shared by the osmweave crates.
//!
//! Every path the tools read or write goes through this crate so that file
//! access is expressed with `cap-std` directory handles and UTF-8 `camino`
//! paths.
#![forbid(unsafe_code)]

use std::io::{self, Read};
use std::path::Component;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};

/// Open an existing file for reading.
pub fn open_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Read a whole file into a string.
pub fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let mut contents = String::new();
    open_file(path)?.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Create or truncate `path` for writing, creating missing parent
/// directories first.
pub fn create_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    ensure_parent_dir(path)?;
    let (dir, name) = parent_dir_and_name(path)?;
    dir.create(name)
}

/// Whether `path` names an existing regular file.
///
/// Missing files and missing parent directories report `false`.
pub fn is_file(path: &Utf8Path) -> io::Result<bool> {
    Ok(metadata_of(path)?.is_some_and(|meta| meta.is_file()))
}

/// Whether `path` names an existing directory.
///
/// Missing entries and missing parent directories report `false`.
pub fn is_dir(path: &Utf8Path) -> io::Result<bool> {
    Ok(metadata_of(path)?.is_some_and(|meta| meta.is_dir()))
}

fn metadata_of(path: &Utf8Path) -> io::Result<Option<fs_utf8::Metadata>> {
    let found = if path.file_name().is_none() {
        fs_utf8::Dir::open_ambient_dir(path, ambient_authority()).and_then(|dir| dir.dir_metadata())
    } else {
        parent_dir_and_name(path).and_then(|(dir, name)| dir.metadata(&name))
    };
    match found {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Create every missing directory above `path`.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() {
        return Ok(());
    }
    let (root, relative) = split_root(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    root.create_dir_all(&relative)
}

/// Open the directory holding `path` and return it with the file name.
fn parent_dir_and_name(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{path} does not name a file")))?
        .to_owned();
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, name))
}

/// Split `dir` into an ambient root handle and the path below it.
///
/// Absolute paths are rooted at the filesystem root (or the drive prefix on
/// Windows); relative paths at the working directory.
fn split_root(dir: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let mut components = dir.as_std_path().components();
    let root = match components.next() {
        Some(Component::Prefix(prefix)) => {
            let prefix = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            if components.clone().next() == Some(Component::RootDir) {
                components.next();
            }
            Utf8PathBuf::from(prefix).join(std::path::MAIN_SEPARATOR_STR)
        }
        Some(Component::RootDir) => Utf8PathBuf::from(std::path::MAIN_SEPARATOR_STR),
        _ => {
            components = dir.as_std_path().components();
            Utf8PathBuf::from(".")
        }
    };
    let relative = Utf8PathBuf::from_path_buf(components.as_path().to_path_buf())
        .map_err(|_| io::Error::other("non-UTF-8 directory path"))?;
    let handle = fs_utf8::Dir::open_ambient_dir(&root, ambient_authority())?;
    Ok((handle, relative))
}
