//! Blob storage backends.
//!
//! The [`BlobStore`] trait is the seam between the repository client and
//! the remote object store. Two implementations exist:
//!
//! - [`http`] - objects addressed as `{endpoint}/{bucket}/{key}` over HTTP.
//! - [`fs`] - a local directory standing in for the remote store.
//!
//! [`open_store`] picks one from the configured endpoint.

pub mod fs;
pub mod http;

use camino::{Utf8Path, Utf8PathBuf};

/// Endpoint scheme selecting the local-directory store.
pub const FILE_SCHEME: &str = "file://";

/// Trait for the object store holding package archives.
///
/// Abstractions allow tests to replace network access with in-memory or
/// mocked behaviour.
#[cfg_attr(test, mockall::automock)]
pub trait BlobStore {
    /// Report whether `bucket` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError>;

    /// Report whether `key` exists in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError>;

    /// Upload the file at `source` to `key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the upload fails.
    fn upload(&self, bucket: &str, key: &str, source: &Utf8Path) -> Result<(), StoreError>;

    /// Download `key` into the file at `dest`, replacing its contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing or the transfer fails.
    fn download(&self, bucket: &str, key: &str, dest: &Utf8Path) -> Result<(), StoreError>;
}

/// Errors arising from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// A failure worth retrying: connection errors, timeouts, 5xx, 429.
    #[error("transient failure: {reason}")]
    Transient {
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The store refused the request.
    #[error("request for {url} rejected with status {status}")]
    Rejected {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The request could not be made at all.
    #[error("request for {url} failed: {reason}")]
    Request {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// A bucket or key would resolve outside the store.
    #[error("invalid object path {path}: must be relative without `..`")]
    InvalidKey {
        /// The rejected bucket or key.
        path: String,
    },

    /// Local I/O failed while reading or writing a transfer file.
    #[error("I/O error during transfer: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether the retry policy should try this operation again.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Build the store selected by `endpoint`.
///
/// Endpoints starting with [`FILE_SCHEME`] open a [`fs::FsBlobStore`]
/// rooted at the remaining path; anything else is treated as an HTTP base
/// URL. `token` is sent as a bearer credential by the HTTP store.
#[must_use]
pub fn open_store(endpoint: &str, token: Option<String>) -> Box<dyn BlobStore> {
    match endpoint.strip_prefix(FILE_SCHEME) {
        Some(path) => Box::new(fs::FsBlobStore::new(Utf8PathBuf::from(path))),
        None => Box::new(http::HttpBlobStore::new(endpoint, token)),
    }
}
