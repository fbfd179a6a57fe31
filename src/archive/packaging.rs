//! Archive creation for package directories.
//!
//! The archive is written to a temporary file beside its final location
//! and renamed into place, so readers never see a half-written archive and
//! an existing archive is replaced in one step.

use crate::identity::PackageIdentity;
use crate::scanner::PackageDirectory;
use bzip2::Compression;
use bzip2::write::BzEncoder;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use tempfile::NamedTempFile;

/// Permissions given to a finished archive on Unix.
#[cfg(unix)]
const ARCHIVE_MODE: u32 = 0o644;

/// Packaging failed for one package.
#[derive(Debug, thiserror::Error)]
#[error("failed to archive {identity}: {reason}")]
pub struct ArchiveError {
    /// The package being archived.
    pub identity: PackageIdentity,
    /// The captured diagnostic.
    pub reason: String,
}

/// What [`PackageArchiver::build`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Dry-run mode; nothing was written.
    DryRun {
        /// Where the archive would have been written.
        archive_path: Utf8PathBuf,
    },
    /// The archive was written.
    Created {
        /// The written archive.
        archive_path: Utf8PathBuf,
    },
}

impl ArchiveOutcome {
    /// The archive path, planned or written.
    #[must_use]
    pub fn archive_path(&self) -> &Utf8Path {
        match self {
            Self::DryRun { archive_path } | Self::Created { archive_path } => archive_path,
        }
    }
}

/// Builds `.tar.bz2` archives from validated package directories.
///
/// # Examples
///
/// ```no_run
/// use maiar::archive::packaging::PackageArchiver;
/// use maiar::scanner::scan_root;
/// use camino::Utf8Path;
///
/// for package in scan_root(Utf8Path::new("/srv/packages"))?.values() {
///     PackageArchiver.build(package, false)?;
/// }
/// # Ok::<(), maiar::error::MaiarError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageArchiver;

impl PackageArchiver {
    /// Write `<name>.<version>.tar.bz2` into the parent of `package`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] if the package tree cannot be read or the
    /// archive cannot be written.
    pub fn build(
        self,
        package: &PackageDirectory,
        dry_run: bool,
    ) -> Result<ArchiveOutcome, ArchiveError> {
        let archive_path = package.archive_path();
        if dry_run {
            info!("[dry-run] would archive {} to {archive_path}", package.path);
            return Ok(ArchiveOutcome::DryRun { archive_path });
        }

        info!("archiving {} to {archive_path}", package.path);
        write_archive(package, &archive_path).map_err(|err| ArchiveError {
            identity: package.identity.clone(),
            reason: err.to_string(),
        })?;
        Ok(ArchiveOutcome::Created { archive_path })
    }
}

fn write_archive(package: &PackageDirectory, archive_path: &Utf8Path) -> std::io::Result<()> {
    let parent = archive_path.parent().unwrap_or(Utf8Path::new("."));
    let temp = NamedTempFile::new_in(parent)?;
    debug!("staging archive in {}", temp.path().display());

    let encoder = BzEncoder::new(temp.as_file(), Compression::best());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(package.identity.dir_name(), &package.path)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(ARCHIVE_MODE))?;
    }
    temp.persist(archive_path).map_err(|err| err.error)?;
    Ok(())
}
