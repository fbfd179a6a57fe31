//! Local-directory blob store.
//!
//! Buckets are subdirectories of the store root and keys are relative
//! paths below them, so `linux/foo.1.0.tar.bz2` in bucket `pkgs` lives at
//! `{root}/pkgs/linux/foo.1.0.tar.bz2`.

use super::{BlobStore, StoreError};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::path::Component;

/// A [`BlobStore`] backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: Utf8PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`.
    #[must_use]
    pub const fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<Utf8PathBuf, StoreError> {
        Ok(self.bucket_path(bucket)?.join(checked_relative(key)?))
    }

    fn bucket_path(&self, bucket: &str) -> Result<Utf8PathBuf, StoreError> {
        Ok(self.root.join(checked_relative(bucket)?))
    }
}

/// Accept only plain relative paths, so objects stay below the store root.
fn checked_relative(path: &str) -> Result<&Utf8Path, StoreError> {
    let candidate = Utf8Path::new(path);
    let plain = !path.is_empty()
        && candidate
            .as_std_path()
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if plain {
        Ok(candidate)
    } else {
        Err(StoreError::InvalidKey {
            path: path.to_owned(),
        })
    }
}

impl BlobStore for FsBlobStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        Ok(self.bucket_path(bucket)?.is_dir())
    }

    fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self.object_path(bucket, key)?.is_file())
    }

    fn upload(&self, bucket: &str, key: &str, source: &Utf8Path) -> Result<(), StoreError> {
        let dest = self.object_path(bucket, key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, &dest)?;
        Ok(())
    }

    fn download(&self, bucket: &str, key: &str, dest: &Utf8Path) -> Result<(), StoreError> {
        let source = self.object_path(bucket, key)?;
        if !source.is_file() {
            return Err(StoreError::NotFound {
                key: key.to_owned(),
            });
        }
        fs::copy(&source, dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn store() -> (TempDir, Utf8PathBuf, FsBlobStore) {
        let temp = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("non-UTF8 path");
        fs::create_dir(root.join("pkgs")).expect("create bucket");
        let store = FsBlobStore::new(root.clone());
        (temp, root, store)
    }

    #[test]
    fn bucket_lookup_reflects_directories() {
        let (_temp, _root, store) = store();
        assert!(store.bucket_exists("pkgs").expect("lookup"));
        assert!(!store.bucket_exists("absent").expect("lookup"));
    }

    #[test]
    fn upload_then_download_copies_bytes() {
        let (_temp, root, store) = store();
        let source = root.join("foo.1.0.tar.bz2");
        fs::write(&source, b"archive").expect("write source");

        store
            .upload("pkgs", "linux/foo.1.0.tar.bz2", &source)
            .expect("upload");
        assert!(store.blob_exists("pkgs", "linux/foo.1.0.tar.bz2").expect("exists"));

        let dest = root.join("copy.tar.bz2");
        store
            .download("pkgs", "linux/foo.1.0.tar.bz2", &dest)
            .expect("download");
        assert_eq!(fs::read(&dest).expect("read copy"), b"archive");
    }

    #[test]
    fn download_of_missing_key_is_not_found() {
        let (_temp, root, store) = store();
        let result = store.download("pkgs", "linux/none.1.0.tar.bz2", &root.join("x"));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[rstest]
    #[case::parent_in_key("pkgs", "../../outside.tar.bz2")]
    #[case::parent_in_channel("pkgs", "linux/../../escape/foo.1.0.tar.bz2")]
    #[case::absolute_key("pkgs", "/tmp/foo.1.0.tar.bz2")]
    #[case::parent_bucket("..", "linux/foo.1.0.tar.bz2")]
    #[case::empty_key("pkgs", "")]
    fn keys_escaping_the_root_are_rejected(#[case] bucket: &str, #[case] key: &str) {
        let (_temp, root, store) = store();
        let source = root.join("foo.1.0.tar.bz2");
        fs::write(&source, b"archive").expect("write source");

        let upload = store.upload(bucket, key, &source);
        assert!(
            matches!(upload, Err(StoreError::InvalidKey { .. })),
            "got {upload:?}"
        );
        assert!(matches!(
            store.blob_exists(bucket, key),
            Err(StoreError::InvalidKey { .. })
        ));
        assert!(matches!(
            store.download(bucket, key, &root.join("copy")),
            Err(StoreError::InvalidKey { .. })
        ));
        assert!(!root.parent().expect("temp parent").join("outside.tar.bz2").exists());
    }
}
