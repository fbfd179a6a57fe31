//! HTTP blob store using `ureq`.
//!
//! Buckets are addressed as `{endpoint}/{bucket}` and objects as
//! `{endpoint}/{bucket}/{key}`. Existence checks use `HEAD`, downloads
//! `GET` and uploads `PUT`.

use super::{BlobStore, StoreError};
use camino::Utf8Path;
use std::fs::File;
use std::sync::OnceLock;
use std::time::Duration;

/// Default object store endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Environment variable holding an optional bearer token.
pub const TOKEN_ENV_VAR: &str = "MAIAR_STORAGE_TOKEN";

/// Network timeout for a single request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP-based [`BlobStore`].
///
/// # Examples
///
/// ```
/// use maiar::store::http::HttpBlobStore;
///
/// let store = HttpBlobStore::new("https://objects.example.test/", None);
/// assert_eq!(
///     store.object_url("pkgs", "linux/foo.1.0.tar.bz2"),
///     "https://objects.example.test/pkgs/linux/foo.1.0.tar.bz2"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    endpoint: String,
    token: Option<String>,
}

impl HttpBlobStore {
    /// Create a store talking to `endpoint`, authenticating with `token`
    /// when one is given.
    #[must_use]
    pub fn new(endpoint: &str, token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            token,
        }
    }

    /// URL of `bucket`.
    #[must_use]
    pub fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{bucket}", self.endpoint)
    }

    /// URL of `key` within `bucket`.
    #[must_use]
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", self.endpoint)
    }

    fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|token| format!("Bearer {token}"))
    }

    fn exists(&self, url: &str) -> Result<bool, StoreError> {
        let mut request = http_agent().head(url);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }
        match request.call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::StatusCode(404)) => Ok(false),
            Err(err) => Err(map_ureq_error(url, &err)),
        }
    }
}

impl BlobStore for HttpBlobStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        self.exists(&self.bucket_url(bucket))
    }

    fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        self.exists(&self.object_url(bucket, key))
    }

    fn upload(&self, bucket: &str, key: &str, source: &Utf8Path) -> Result<(), StoreError> {
        let url = self.object_url(bucket, key);
        let bytes = std::fs::read(source)?;
        let mut request = http_agent()
            .put(&url)
            .header("Content-Type", "application/x-bzip2");
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }
        request
            .send(bytes.as_slice())
            .map_err(|e| map_ureq_error(&url, &e))?;
        Ok(())
    }

    fn download(&self, bucket: &str, key: &str, dest: &Utf8Path) -> Result<(), StoreError> {
        let url = self.object_url(bucket, key);
        let mut request = http_agent().get(&url);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }
        let response = request.call().map_err(|e| match e {
            ureq::Error::StatusCode(404) => StoreError::NotFound {
                key: key.to_owned(),
            },
            other => map_ureq_error(&url, &other),
        })?;
        let mut file = File::create(dest)?;
        std::io::copy(&mut response.into_body().as_reader(), &mut file).map_err(|e| {
            StoreError::Transient {
                reason: format!("reading {url}: {e}"),
            }
        })?;
        Ok(())
    }
}

/// Shared `ureq` agent with request timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to a [`StoreError`].
///
/// Connection-level failures and 408, 429 and 5xx responses are transient.
fn map_ureq_error(url: &str, err: &ureq::Error) -> StoreError {
    match err {
        ureq::Error::StatusCode(404) => StoreError::NotFound {
            key: url.to_owned(),
        },
        ureq::Error::StatusCode(status) if is_transient_status(*status) => {
            StoreError::Transient {
                reason: format!("{url} answered {status}"),
            }
        }
        ureq::Error::StatusCode(status) => StoreError::Rejected {
            url: url.to_owned(),
            status: *status,
        },
        ureq::Error::Io(_)
        | ureq::Error::Timeout(_)
        | ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed => StoreError::Transient {
            reason: format!("{url}: {err}"),
        },
        other => StoreError::Request {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

const fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}
