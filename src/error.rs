//! Error types for maiar.
//!
//! This module defines the semantic error variants surfaced by requirement
//! resolution, package scanning, archiving, repository transfers and the
//! build/install pipeline. Variants carry enough context (package identity,
//! paths, captured output) for the CLI to report them once and exit.

use crate::archive::extraction::ExtractionError;
use crate::archive::packaging::ArchiveError;
use crate::identity::{PackageIdentity, PackageName};
use crate::pipeline::PackageState;
use crate::stage::Stage;
use crate::store::StoreError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving, packaging, transferring or
/// installing packages.
#[derive(Debug, Error)]
pub enum MaiarError {
    /// A requirement entry or package identity could not be parsed.
    #[error("invalid requirement \"{input}\": {reason}")]
    Parse {
        /// The offending input text.
        input: String,
        /// Description of the violated rule.
        reason: String,
    },

    /// The same package name was produced twice in one resolution or scan.
    #[error("package {name} is listed more than once ({first} and {second})")]
    DuplicatePackage {
        /// The repeated package name.
        name: PackageName,
        /// Where the name was first seen.
        first: String,
        /// Where the name was seen again.
        second: String,
    },

    /// A nested requirements file does not exist.
    #[error("requirements file {path} does not exist")]
    MissingFile {
        /// Path of the missing file.
        path: Utf8PathBuf,
    },

    /// A requirements file includes itself, directly or transitively.
    #[error("requirements file {path} includes itself")]
    IncludeCycle {
        /// The file that closed the cycle.
        path: Utf8PathBuf,
    },

    /// A `name.version` directory failed package validation.
    #[error("invalid package directory {path}: {reason}")]
    InvalidPackage {
        /// Path of the rejected directory.
        path: Utf8PathBuf,
        /// Description of the failed check.
        reason: String,
    },

    /// A remote object or bucket does not exist.
    #[error("{what} not found in repository")]
    NotFound {
        /// Description of the missing resource (bucket or object key).
        what: String,
    },

    /// A transfer was attempted without a configured repository bucket.
    #[error("no repository configured; pass --bucket or set MAIAR_BUCKET")]
    RepositoryUnset,

    /// The local archive to push does not exist yet.
    #[error("archive {path} does not exist; run `maiar pack` first")]
    ArchiveMissing {
        /// Expected archive path.
        path: Utf8PathBuf,
    },

    /// Creating a package archive failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Extracting a downloaded archive failed.
    #[error("failed to extract {identity}: {source}")]
    Extraction {
        /// Package whose archive was being extracted.
        identity: PackageIdentity,
        /// The underlying extraction error.
        #[source]
        source: ExtractionError,
    },

    /// A transfer kept failing until the retry budget was exhausted.
    #[error("{operation} failed after {attempts} attempt(s): {reason}")]
    TransferFailed {
        /// The transfer that failed (upload or download plus key).
        operation: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last failure reported by the store.
        reason: String,
    },

    /// The blob store rejected a request in a way that is not retried.
    #[error("repository error: {0}")]
    Store(#[from] StoreError),

    /// No staged script exists in an extracted package directory.
    #[error("no maiar script found in {path}")]
    MissingScript {
        /// The package directory that was searched.
        path: Utf8PathBuf,
    },

    /// A staged script exited with a nonzero status.
    #[error("{stage} stage failed for {identity}:\n{output}")]
    StageFailure {
        /// The package whose script failed.
        identity: PackageIdentity,
        /// The stage that was running.
        stage: Stage,
        /// Combined stdout and stderr of the script.
        output: String,
    },

    /// A stage name outside the supported set was requested.
    #[error("unknown stage \"{name}\"; expected one of: {expected}")]
    UnknownStage {
        /// The rejected stage name.
        name: String,
        /// Comma-separated list of accepted names.
        expected: String,
    },

    /// The pipeline was asked to skip a state.
    #[error("{identity} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The package being advanced.
        identity: PackageIdentity,
        /// The state recorded for the package.
        from: PackageState,
        /// The state that was requested.
        to: PackageState,
    },

    /// A package already failed earlier in this run.
    #[error("{identity} already failed during {stage} in this run")]
    PackageFailed {
        /// The failed package.
        identity: PackageIdentity,
        /// Name of the step that failed.
        stage: String,
    },

    /// Configuration could not be loaded.
    #[error("configuration error in {path}: {reason}")]
    Config {
        /// The configuration file.
        path: Utf8PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {path}")]
    NonUtf8Path {
        /// Lossy rendering of the path.
        path: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl MaiarError {
    /// Build a [`MaiarError::Parse`] for `input`.
    pub(crate) fn parse(input: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using [`MaiarError`].
pub type Result<T> = std::result::Result<T, MaiarError>;
