//! Remote package repository client.
//!
//! Archives live in a single bucket under `<channel>/<name>.<version>.tar.bz2`.
//! Transfers go through the configured [`RetryPolicy`]; existence checks
//! and bucket lookups do not retry.

use crate::error::{MaiarError, Result};
use crate::identity::PackageIdentity;
use crate::retry::RetryPolicy;
use crate::store::BlobStore;
use camino::Utf8Path;
use log::{debug, info};

/// Channel used when none is configured.
pub const DEFAULT_CHANNEL: &str = "linux";

/// Result of a repository transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Dry-run mode; the transfer was only reported.
    DryRun {
        /// Object key that would have been transferred.
        key: String,
    },
    /// The transfer completed.
    Transferred {
        /// Object key that was transferred.
        key: String,
    },
}

/// Uploads and downloads package archives.
pub struct RepositoryClient<'a> {
    store: &'a dyn BlobStore,
    bucket: String,
    channel: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for RepositoryClient<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryClient")
            .field("bucket", &self.bucket)
            .field("channel", &self.channel)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<'a> RepositoryClient<'a> {
    /// Open the repository held in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::RepositoryUnset`] when `bucket` is `None` or
    /// empty, [`MaiarError::NotFound`] when the store reports the bucket
    /// absent, and [`MaiarError::Store`] when the lookup fails.
    pub fn open(
        store: &'a dyn BlobStore,
        bucket: Option<&str>,
        channel: &str,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let bucket = bucket
            .filter(|name| !name.trim().is_empty())
            .ok_or(MaiarError::RepositoryUnset)?;
        if !store.bucket_exists(bucket)? {
            return Err(MaiarError::NotFound {
                what: format!("bucket {bucket}"),
            });
        }
        debug!("opened repository bucket {bucket} on channel {channel}");
        Ok(Self {
            store,
            bucket: bucket.to_owned(),
            channel: channel.to_owned(),
            retry,
        })
    }

    /// The bucket this client talks to.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The channel prefixing every key.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Remote key for `identity`.
    ///
    /// # Examples
    ///
    /// ```
    /// use maiar::identity::PackageIdentity;
    /// use maiar::repository::{RepositoryClient, DEFAULT_CHANNEL};
    /// use maiar::retry::RetryPolicy;
    /// use maiar::store::fs::FsBlobStore;
    ///
    /// let temp = tempfile::tempdir()?;
    /// std::fs::create_dir(temp.path().join("pkgs"))?;
    /// let root = camino::Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8");
    /// let store = FsBlobStore::new(root);
    /// let client = RepositoryClient::open(&store, Some("pkgs"), DEFAULT_CHANNEL, RetryPolicy::default())?;
    /// let identity: PackageIdentity = "foo.1.0.0.1".parse()?;
    /// assert_eq!(client.object_key(&identity), "linux/foo.1.0.0.1.tar.bz2");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    #[must_use]
    pub fn object_key(&self, identity: &PackageIdentity) -> String {
        format!("{}/{}", self.channel, identity.archive_name())
    }

    /// Upload the archive for `identity` from `archive_path`.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::ArchiveMissing`] if the archive does not exist
    /// locally, and [`MaiarError::TransferFailed`] or [`MaiarError::Store`]
    /// if the upload fails.
    pub fn push(
        &self,
        identity: &PackageIdentity,
        archive_path: &Utf8Path,
        dry_run: bool,
    ) -> Result<TransferOutcome> {
        if !archive_path.is_file() {
            return Err(MaiarError::ArchiveMissing {
                path: archive_path.to_owned(),
            });
        }
        let key = self.object_key(identity);
        if dry_run {
            info!("[dry-run] would upload {archive_path} to {}/{key}", self.bucket);
            return Ok(TransferOutcome::DryRun { key });
        }

        info!("uploading {archive_path} to {}/{key}", self.bucket);
        self.retry.run(&format!("upload {key}"), || {
            self.store.upload(&self.bucket, &key, archive_path)
        })?;
        Ok(TransferOutcome::Transferred { key })
    }

    /// Download object `key` into `local_path`.
    ///
    /// The remote object is checked before transferring, so a missing
    /// package is reported as [`MaiarError::NotFound`] rather than a
    /// failed transfer.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::NotFound`] for a missing object, and
    /// [`MaiarError::TransferFailed`] or [`MaiarError::Store`] if the
    /// download fails.
    pub fn download(&self, key: &str, local_path: &Utf8Path, dry_run: bool) -> Result<TransferOutcome> {
        if !self.store.blob_exists(&self.bucket, key)? {
            return Err(MaiarError::NotFound {
                what: format!("{}/{key}", self.bucket),
            });
        }
        if dry_run {
            info!("[dry-run] would download {}/{key} to {local_path}", self.bucket);
            return Ok(TransferOutcome::DryRun { key: key.to_owned() });
        }

        info!("downloading {}/{key} to {local_path}", self.bucket);
        self.retry.run(&format!("download {key}"), || {
            self.store.download(&self.bucket, key, local_path)
        })?;
        Ok(TransferOutcome::Transferred { key: key.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MockBlobStore, StoreError};
    use crate::test_utils::RecordingStore;
    use camino::Utf8PathBuf;
    use mockall::predicate::eq;
    use tempfile::TempDir;

    fn identity() -> PackageIdentity {
        "foo.1.0".parse().expect("valid identity")
    }

    fn workdir() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("temp dir");
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("non-UTF8 path");
        (temp, dir)
    }

    #[test]
    fn open_without_bucket_is_unset() {
        let store = MockBlobStore::new();
        let result = RepositoryClient::open(&store, None, DEFAULT_CHANNEL, RetryPolicy::default());
        assert!(matches!(result, Err(MaiarError::RepositoryUnset)));
    }

    #[test]
    fn open_reports_missing_bucket() {
        let mut store = MockBlobStore::new();
        store
            .expect_bucket_exists()
            .with(eq("pkgs"))
            .times(1)
            .returning(|_| Ok(false));
        let result = RepositoryClient::open(&store, Some("pkgs"), DEFAULT_CHANNEL, RetryPolicy::default());
        assert!(matches!(result, Err(MaiarError::NotFound { .. })));
    }

    #[test]
    fn key_is_prefixed_by_channel() {
        let store = RecordingStore::with_bucket("pkgs");
        let client = RepositoryClient::open(&store, Some("pkgs"), "darwin", RetryPolicy::immediate(1))
            .expect("open");
        assert_eq!(client.object_key(&identity()), "darwin/foo.1.0.tar.bz2");
    }

    #[test]
    fn push_requires_local_archive_before_touching_store() {
        let (_temp, dir) = workdir();
        let store = RecordingStore::with_bucket("pkgs");
        let client = RepositoryClient::open(&store, Some("pkgs"), DEFAULT_CHANNEL, RetryPolicy::immediate(1))
            .expect("open");

        let err = client
            .push(&identity(), &dir.join("foo.1.0.tar.bz2"), false)
            .expect_err("archive missing");
        assert!(matches!(err, MaiarError::ArchiveMissing { .. }));
        assert_eq!(store.uploads(), 0);
    }

    #[test]
    fn push_is_idempotent_overwrite() {
        let (_temp, dir) = workdir();
        let archive = dir.join("foo.1.0.tar.bz2");
        std::fs::write(&archive, b"bytes").expect("write archive");
        let store = RecordingStore::with_bucket("pkgs");
        let client = RepositoryClient::open(&store, Some("pkgs"), DEFAULT_CHANNEL, RetryPolicy::immediate(1))
            .expect("open");

        client.push(&identity(), &archive, false).expect("first push");
        client.push(&identity(), &archive, false).expect("second push");
        assert_eq!(store.uploads(), 2);
        assert_eq!(
            store.object("pkgs", "linux/foo.1.0.tar.bz2").as_deref(),
            Some(&b"bytes"[..])
        );
    }

    #[test]
    fn push_retries_transient_failures() {
        let (_temp, dir) = workdir();
        let archive = dir.join("foo.1.0.tar.bz2");
        std::fs::write(&archive, b"bytes").expect("write archive");
        let store = RecordingStore::with_bucket("pkgs");
        store.fail_next(2);
        let client = RepositoryClient::open(&store, Some("pkgs"), DEFAULT_CHANNEL, RetryPolicy::immediate(3))
            .expect("open");

        let outcome = client.push(&identity(), &archive, false).expect("third attempt lands");
        assert_eq!(
            outcome,
            TransferOutcome::Transferred {
                key: "linux/foo.1.0.tar.bz2".to_owned()
            }
        );
        assert_eq!(store.uploads(), 3);
    }

    #[test]
    fn push_dry_run_uploads_nothing() {
        let (_temp, dir) = workdir();
        let archive = dir.join("foo.1.0.tar.bz2");
        std::fs::write(&archive, b"bytes").expect("write archive");
        let store = RecordingStore::with_bucket("pkgs");
        let client = RepositoryClient::open(&store, Some("pkgs"), DEFAULT_CHANNEL, RetryPolicy::immediate(1))
            .expect("open");

        let outcome = client.push(&identity(), &archive, true).expect("dry run");
        assert!(matches!(outcome, TransferOutcome::DryRun { .. }));
        assert_eq!(store.uploads(), 0);
    }

    #[test]
    fn download_of_absent_object_is_not_found_without_transfer() {
        let (_temp, dir) = workdir();
        let store = RecordingStore::with_bucket("pkgs");
        let client = RepositoryClient::open(&store, Some("pkgs"), DEFAULT_CHANNEL, RetryPolicy::immediate(3))
            .expect("open");

        let err = client
            .download("linux/foo.1.0.tar.bz2", &dir.join("foo.1.0.tar.bz2"), false)
            .expect_err("missing object");
        assert!(matches!(err, MaiarError::NotFound { .. }));
        assert_eq!(store.downloads(), 0);
    }

    #[test]
    fn download_exhaustion_is_transfer_failure() {
        let (_temp, dir) = workdir();
        let store = RecordingStore::with_bucket("pkgs");
        store.insert("pkgs", "linux/foo.1.0.tar.bz2", b"bytes".to_vec());
        store.fail_next(5);
        let client = RepositoryClient::open(&store, Some("pkgs"), DEFAULT_CHANNEL, RetryPolicy::immediate(2))
            .expect("open");

        let err = client
            .download("linux/foo.1.0.tar.bz2", &dir.join("foo.1.0.tar.bz2"), false)
            .expect_err("retries exhausted");
        assert!(matches!(err, MaiarError::TransferFailed { attempts: 2, .. }));
    }

    #[test]
    fn rejected_upload_is_not_retried() {
        let (_temp, dir) = workdir();
        let archive = dir.join("foo.1.0.tar.bz2");
        std::fs::write(&archive, b"bytes").expect("write archive");
        let mut store = MockBlobStore::new();
        store.expect_bucket_exists().returning(|_| Ok(true));
        store.expect_upload().times(1).returning(|_, _, _| {
            Err(StoreError::Rejected {
                url: "https://example.test/pkgs/linux/foo.1.0.tar.bz2".to_owned(),
                status: 403,
            })
        });
        let client = RepositoryClient::open(&store, Some("pkgs"), DEFAULT_CHANNEL, RetryPolicy::immediate(5))
            .expect("open");

        let err = client.push(&identity(), &archive, false).expect_err("rejected");
        assert!(matches!(err, MaiarError::Store(StoreError::Rejected { status: 403, .. })));
    }
}
