//! A minimal package manager for versioned software bundles.
//!
//! Packages are directories named `<name>.<version>` carrying a single
//! staged `maiar` script. They are archived as `<name>.<version>.tar.bz2`,
//! published to a blob-store bucket under a channel prefix, and on the
//! consuming side resolved from requirement lists, downloaded, extracted
//! and driven through their `build` and `install` stages.
//!
//! # Modules
//!
//! - [`identity`] - validated package names, versions and identities.
//! - [`requirements`] - requirement parsing and recursive resolution.
//! - [`scanner`] - package directory discovery and validation.
//! - [`archive`] - archive creation and extraction.
//! - [`store`] - the blob store trait with HTTP and local backends.
//! - [`retry`] - bounded exponential backoff for transfers.
//! - [`repository`] - channel-namespaced archive upload and download.
//! - [`exec`] - subprocess execution behind a trait.
//! - [`stage`] - staged script lookup and invocation.
//! - [`pipeline`] - the download, build and install state machine.
//! - [`config`] - layered settings.
//! - [`cli`] - command-line definitions.
//! - [`output`] - user-facing summaries.
//! - [`error`] - the crate error type.

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod identity;
pub mod output;
pub mod pipeline;
pub mod repository;
pub mod requirements;
pub mod retry;
pub mod scanner;
pub mod stage;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use error::{MaiarError, Result};
pub use identity::PackageIdentity;
