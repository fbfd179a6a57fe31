//! Package directory discovery and validation.
//!
//! A package directory is named `<name>.<version>` and must contain exactly
//! one staged script variant plus at least one provenance marker file. This
//! module inspects candidate directories and collects the valid ones into
//! name-keyed maps.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;

use crate::error::{MaiarError, Result};
use crate::identity::{PackageIdentity, PackageName};
use crate::stage::script_candidates;

/// Filename prefixes that mark a package's provenance.
pub const PROVENANCE_PREFIXES: [&str; 2] = ["DOWNLOADED_FROM", "SOURCE_REPO"];

/// A validated package directory on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDirectory {
    /// Absolute path to the directory.
    pub path: Utf8PathBuf,
    /// Identity parsed from the directory name.
    pub identity: PackageIdentity,
}

impl PackageDirectory {
    /// Path of the archive the packager writes next to this directory.
    #[must_use]
    pub fn archive_path(&self) -> Utf8PathBuf {
        let parent = self.path.parent().unwrap_or(&self.path);
        parent.join(self.identity.archive_name())
    }
}

/// The outcome of inspecting one candidate path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// The path is not a directory, or is hidden.
    NotPackage,
    /// The directory name does not match `<name>.<version>`.
    Skipped {
        /// Why the name did not match.
        reason: String,
    },
    /// A valid package directory.
    Package(PackageDirectory),
}

/// Packages found by a scan, keyed by package name.
pub type PackageMap = BTreeMap<PackageName, PackageDirectory>;

/// Inspect a single candidate path.
///
/// # Errors
///
/// Returns [`MaiarError::InvalidPackage`] when the name matches but the
/// directory has zero or several staged scripts or no provenance marker.
/// This aborts the surrounding scan.
pub fn parse_candidate(path: &Utf8Path) -> Result<Candidate> {
    if !path.is_dir() {
        return Ok(Candidate::NotPackage);
    }
    let Some(dir_name) = path.file_name() else {
        return Ok(Candidate::NotPackage);
    };
    if dir_name.starts_with('.') {
        return Ok(Candidate::NotPackage);
    }

    let identity = match dir_name.parse::<PackageIdentity>() {
        Ok(identity) => identity,
        Err(err) => {
            debug!("skipping {path}: {err}");
            return Ok(Candidate::Skipped {
                reason: err.to_string(),
            });
        }
    };

    validate_package_dir(path)?;

    Ok(Candidate::Package(PackageDirectory {
        path: path.to_owned(),
        identity,
    }))
}

/// Collect the package directories under `root`.
///
/// If `root` is itself a package directory, the result holds only that
/// package. Otherwise the immediate children of `root` are inspected in
/// name order.
///
/// # Errors
///
/// Returns [`MaiarError::DuplicatePackage`] if two children share a name,
/// [`MaiarError::InvalidPackage`] if any candidate fails validation, and
/// [`MaiarError::Io`] if the directory cannot be read.
pub fn scan_root(root: &Utf8Path) -> Result<PackageMap> {
    let mut packages = PackageMap::new();

    if let Candidate::Package(package) = parse_candidate(root)? {
        packages.insert(package.identity.name().clone(), package);
        return Ok(packages);
    }

    let mut children = Vec::new();
    for entry in root.read_dir_utf8()? {
        children.push(entry?.path().to_owned());
    }
    children.sort();

    for child in children {
        if let Candidate::Package(package) = parse_candidate(&child)? {
            insert_unique(&mut packages, package)?;
        }
    }

    Ok(packages)
}

/// Merge the scans of several roots.
///
/// # Errors
///
/// Returns [`MaiarError::DuplicatePackage`] when a name is found under more
/// than one root, plus any error from [`scan_root`].
pub fn scan_roots<P: AsRef<Utf8Path>>(roots: &[P]) -> Result<PackageMap> {
    let mut merged = PackageMap::new();
    for root in roots {
        for package in scan_root(root.as_ref())?.into_values() {
            insert_unique(&mut merged, package)?;
        }
    }
    Ok(merged)
}

fn insert_unique(packages: &mut PackageMap, package: PackageDirectory) -> Result<()> {
    if let Some(existing) = packages.get(package.identity.name()) {
        return Err(MaiarError::DuplicatePackage {
            name: package.identity.name().clone(),
            first: existing.path.to_string(),
            second: package.path.to_string(),
        });
    }
    packages.insert(package.identity.name().clone(), package);
    Ok(())
}

fn validate_package_dir(path: &Utf8Path) -> Result<()> {
    let scripts: Vec<String> = script_candidates()
        .iter()
        .filter(|candidate| path.join(candidate).is_file())
        .map(|candidate| (*candidate).to_owned())
        .collect();

    match scripts.len() {
        1 => {}
        0 => {
            return Err(MaiarError::InvalidPackage {
                path: path.to_owned(),
                reason: "no maiar script found".to_owned(),
            });
        }
        _ => {
            return Err(MaiarError::InvalidPackage {
                path: path.to_owned(),
                reason: format!("multiple maiar scripts found: {}", scripts.join(", ")),
            });
        }
    }

    if !has_provenance_marker(path)? {
        return Err(MaiarError::InvalidPackage {
            path: path.to_owned(),
            reason: format!(
                "no provenance marker (a file starting with {})",
                PROVENANCE_PREFIXES.join(" or ")
            ),
        });
    }

    Ok(())
}

fn has_provenance_marker(path: &Utf8Path) -> Result<bool> {
    for entry in path.read_dir_utf8()? {
        let entry = entry?;
        let file_name = entry.file_name();
        if PROVENANCE_PREFIXES
            .iter()
            .any(|prefix| file_name.starts_with(prefix))
        {
            return Ok(true);
        }
    }
    Ok(false)
}
