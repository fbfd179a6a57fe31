//! Extraction of downloaded package archives.
//!
//! Only entries below the archive's `<name>.<version>/` directory are
//! unpacked; anything else in the tarball is ignored. Entry paths and link
//! targets are validated, and entries are unpacked with
//! [`tar::Entry::unpack_in`], so nothing escapes the build directory even
//! through a symlink created by an earlier entry.

use crate::identity::PackageIdentity;
use bzip2::read::MultiBzDecoder;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::ffi::OsStr;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::EntryType;

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// A symlink or hard link points outside the package directory.
    #[error("link {path} points outside the package: {target}")]
    LinkEscape {
        /// The link entry's path.
        path: String,
        /// The link target recorded in the archive.
        target: String,
    },

    /// The archive has no entries under the expected directory.
    #[error("archive has no top-level {expected}/ directory")]
    MissingTopLevel {
        /// The expected `<name>.<version>` directory.
        expected: String,
    },
}

/// Unpack the `<name>.<version>/` tree of `archive` into `build_dir`.
///
/// Any previous `build_dir/<name>.<version>` is removed first. Returns the
/// path of the extracted package directory.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] for unsafe entry paths,
/// [`ExtractionError::LinkEscape`] for links leaving the package tree,
/// [`ExtractionError::MissingTopLevel`] when the archive lacks the
/// versioned directory, and [`ExtractionError::Io`] on I/O failures.
pub fn extract_package(
    archive: &Utf8Path,
    identity: &PackageIdentity,
    build_dir: &Utf8Path,
) -> Result<Utf8PathBuf, ExtractionError> {
    let top_level = identity.dir_name();
    let target = build_dir.join(&top_level);
    if target.exists() {
        debug!("removing previous extraction at {target}");
        fs::remove_dir_all(&target)?;
    }

    let file = fs::File::open(archive)?;
    let mut tarball = tar::Archive::new(MultiBzDecoder::new(file));
    let mut unpacked = 0usize;

    for entry_result in tarball.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();
        validate_entry_path(&entry_path)?;

        if first_component(&entry_path).as_deref() != Some(top_level.as_str()) {
            debug!("skipping {} outside {top_level}/", entry_path.display());
            continue;
        }

        validate_link_target(&entry, &entry_path, &top_level)?;

        if !entry.unpack_in(build_dir)? {
            return Err(ExtractionError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }
        unpacked += 1;
    }

    if unpacked == 0 {
        return Err(ExtractionError::MissingTopLevel {
            expected: top_level,
        });
    }
    debug!("extracted {unpacked} entries into {target}");
    Ok(target)
}

/// First named component of `path`, ignoring leading `./`.
fn first_component(path: &Path) -> Option<String> {
    path.components().find_map(|component| match component {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    })
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Reject symlinks and hard links whose target leaves `top_level/`.
///
/// Symlink targets resolve against the link's own directory; hard-link
/// targets are archive paths.
fn validate_link_target<R: Read>(
    entry: &tar::Entry<'_, R>,
    entry_path: &Path,
    top_level: &str,
) -> Result<(), ExtractionError> {
    let base = match entry.header().entry_type() {
        EntryType::Symlink => entry_path.parent().unwrap_or_else(|| Path::new("")),
        EntryType::Link => Path::new(""),
        _ => return Ok(()),
    };
    let Some(target) = entry.link_name()? else {
        return Ok(());
    };

    let inside = resolve_lexically(base, &target)
        .is_some_and(|resolved| first_component(&resolved).as_deref() == Some(top_level));
    if inside {
        return Ok(());
    }
    Err(ExtractionError::LinkEscape {
        path: entry_path.display().to_string(),
        target: target.display().to_string(),
    })
}

/// Join `target` onto `base` without touching the filesystem.
///
/// Returns `None` for absolute targets or when `..` climbs above the
/// archive root.
fn resolve_lexically(base: &Path, target: &Path) -> Option<PathBuf> {
    let mut resolved: Vec<&OsStr> = Vec::new();
    for component in base.components().chain(target.components()) {
        match component {
            Component::Normal(name) => resolved.push(name),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved.into_iter().collect())
}
