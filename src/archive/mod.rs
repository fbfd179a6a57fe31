//! Package archive creation and extraction.
//!
//! Archives are bzip2-compressed tarballs named `<name>.<version>.tar.bz2`
//! holding a single top-level `<name>.<version>/` directory.
//!
//! # Sub-modules
//!
//! - [`packaging`] - builds an archive next to a package directory.
//! - [`extraction`] - unpacks the versioned entry of a downloaded archive.

pub mod extraction;
pub mod packaging;
