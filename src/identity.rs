//! Package identity newtypes.
//!
//! A package is identified by a name matching `[A-Za-z0-9_-]+` and a version
//! made of two to four dot-separated numeric components. Both halves are
//! validated on construction so the rest of the crate can pass them around
//! without re-checking.

use crate::error::{MaiarError, Result};
use std::fmt;
use std::str::FromStr;

/// Suffix of every package archive.
pub const ARCHIVE_SUFFIX: &str = ".tar.bz2";

/// Minimum number of numeric version components.
const MIN_VERSION_COMPONENTS: usize = 2;

/// Maximum number of numeric version components.
const MAX_VERSION_COMPONENTS: usize = 4;

/// A validated package name.
///
/// # Examples
///
/// ```
/// use maiar::identity::PackageName;
///
/// let name = PackageName::try_from("zlib-ng").expect("valid name");
/// assert_eq!(name.as_str(), "zlib-ng");
/// assert!(PackageName::try_from("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageName(String);

impl PackageName {
    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for PackageName {
    type Error = MaiarError;

    fn try_from(value: &str) -> Result<Self> {
        validate_name(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated package version such as `1.2` or `1.0.0.1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageVersion(String);

impl PackageVersion {
    /// Return the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for PackageVersion {
    type Error = MaiarError;

    fn try_from(value: &str) -> Result<Self> {
        validate_version(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `(name, version)` pair naming one package build.
///
/// The textual form is `<name>.<version>`, which is also the name of the
/// package directory and of the archive's single top-level entry.
///
/// # Examples
///
/// ```
/// use maiar::identity::PackageIdentity;
///
/// let identity: PackageIdentity = "foo.1.0.0.1".parse().expect("valid identity");
/// assert_eq!(identity.name().as_str(), "foo");
/// assert_eq!(identity.version().as_str(), "1.0.0.1");
/// assert_eq!(identity.archive_name(), "foo.1.0.0.1.tar.bz2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageIdentity {
    name: PackageName,
    version: PackageVersion,
}

impl PackageIdentity {
    /// Create an identity from validated parts.
    #[must_use]
    pub const fn new(name: PackageName, version: PackageVersion) -> Self {
        Self { name, version }
    }

    /// Create an identity from raw strings, validating both.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::Parse`] if either part is malformed.
    pub fn from_parts(name: &str, version: &str) -> Result<Self> {
        Ok(Self::new(
            PackageName::try_from(name)?,
            PackageVersion::try_from(version)?,
        ))
    }

    /// The package name.
    #[must_use]
    pub const fn name(&self) -> &PackageName {
        &self.name
    }

    /// The package version.
    #[must_use]
    pub const fn version(&self) -> &PackageVersion {
        &self.version
    }

    /// Directory name `<name>.<version>`.
    #[must_use]
    pub fn dir_name(&self) -> String {
        format!("{}.{}", self.name, self.version)
    }

    /// Archive filename `<name>.<version>.tar.bz2`.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{}{ARCHIVE_SUFFIX}", self.dir_name())
    }
}

impl FromStr for PackageIdentity {
    type Err = MaiarError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, version) = s
            .split_once('.')
            .ok_or_else(|| MaiarError::parse(s, "expected <name>.<version>"))?;
        Self::from_parts(name, version)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.version)
    }
}

fn validate_name(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(MaiarError::parse(value, "package name must not be empty"));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(MaiarError::parse(
            value,
            format!("package name contains invalid character '{bad}'"),
        ));
    }
    Ok(())
}

fn validate_version(value: &str) -> Result<()> {
    let components: Vec<&str> = value.split('.').collect();
    if !(MIN_VERSION_COMPONENTS..=MAX_VERSION_COMPONENTS).contains(&components.len()) {
        return Err(MaiarError::parse(
            value,
            format!(
                "version must have {MIN_VERSION_COMPONENTS} to {MAX_VERSION_COMPONENTS} components, got {}",
                components.len()
            ),
        ));
    }
    if components
        .iter()
        .any(|c| c.is_empty() || !c.chars().all(|ch| ch.is_ascii_digit()))
    {
        return Err(MaiarError::parse(
            value,
            "version components must be numeric",
        ));
    }
    Ok(())
}
