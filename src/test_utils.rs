//! Shared test utilities for the maiar crate.

use crate::error::{MaiarError, Result};
use crate::exec::{CommandExecutor, CommandSpec};
use crate::store::{BlobStore, StoreError};
use camino::Utf8Path;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The invocation the code under test should make.
    pub spec: CommandSpec,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, spec: &CommandSpec) -> Result<Output> {
        let mut expected = self.expected.borrow_mut();
        let Some(call) = expected.pop_front() else {
            return Err(MaiarError::StubMismatch {
                message: format!("unexpected command invocation: {spec:?}"),
            });
        };

        if &call.spec != spec {
            return Err(MaiarError::StubMismatch {
                message: format!("expected {:?}, got {spec:?}", call.spec),
            });
        }

        call.result
    }
}

/// An in-memory [`BlobStore`] that counts transfers.
///
/// Objects live in a map keyed by `(bucket, key)`. Buckets exist once they
/// are added with [`RecordingStore::with_bucket`].
#[derive(Debug, Default)]
pub struct RecordingStore {
    buckets: RefCell<Vec<String>>,
    objects: RefCell<BTreeMap<(String, String), Vec<u8>>>,
    uploads: Cell<usize>,
    downloads: Cell<usize>,
    transient_failures: Cell<usize>,
}

impl RecordingStore {
    /// Create an empty store containing `bucket`.
    #[must_use]
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::default();
        store.buckets.borrow_mut().push(bucket.to_owned());
        store
    }

    /// Seed an object.
    pub fn insert(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.objects
            .borrow_mut()
            .insert((bucket.to_owned(), key.to_owned()), bytes);
    }

    /// Return the stored bytes for an object.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .borrow()
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
    }

    /// Make the next `count` transfers fail with a transient error.
    pub fn fail_next(&self, count: usize) {
        self.transient_failures.set(count);
    }

    /// Number of upload attempts that reached the store.
    #[must_use]
    pub fn uploads(&self) -> usize {
        self.uploads.get()
    }

    /// Number of download attempts that reached the store.
    #[must_use]
    pub fn downloads(&self) -> usize {
        self.downloads.get()
    }

    fn take_failure(&self) -> std::result::Result<(), StoreError> {
        let remaining = self.transient_failures.get();
        if remaining == 0 {
            return Ok(());
        }
        self.transient_failures.set(remaining - 1);
        Err(StoreError::Transient {
            reason: "simulated connection reset".to_owned(),
        })
    }
}

impl BlobStore for RecordingStore {
    fn bucket_exists(&self, bucket: &str) -> std::result::Result<bool, StoreError> {
        Ok(self.buckets.borrow().iter().any(|b| b == bucket))
    }

    fn blob_exists(&self, bucket: &str, key: &str) -> std::result::Result<bool, StoreError> {
        Ok(self.object(bucket, key).is_some())
    }

    fn upload(
        &self,
        bucket: &str,
        key: &str,
        source: &Utf8Path,
    ) -> std::result::Result<(), StoreError> {
        self.uploads.set(self.uploads.get() + 1);
        self.take_failure()?;
        let bytes = std::fs::read(source)?;
        self.insert(bucket, key, bytes);
        Ok(())
    }

    fn download(
        &self,
        bucket: &str,
        key: &str,
        dest: &Utf8Path,
    ) -> std::result::Result<(), StoreError> {
        self.downloads.set(self.downloads.get() + 1);
        self.take_failure()?;
        let bytes = self.object(bucket, key).ok_or_else(|| StoreError::NotFound {
            key: key.to_owned(),
        })?;
        std::fs::write(dest, bytes)?;
        Ok(())
    }
}
