//! Layered configuration for maiar.
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional `maiar.toml`, then command-line flags (which clap fills from
//! `MAIAR_*` environment variables when the flag is absent). The file is the
//! one named by `--config`/`MAIAR_CONFIG`, otherwise `maiar.toml` in the
//! current directory when it exists.
//!
//! ```toml
//! bucket = "acme-packages"
//! channel = "linux"
//! root = "/opt/maiar"
//! endpoint = "https://storage.googleapis.com"
//!
//! [retry]
//! attempts = 5
//! backoff_ms = 500
//! max_backoff_ms = 8000
//! ```

use crate::error::{MaiarError, Result};
use crate::repository::DEFAULT_CHANNEL;
use crate::retry::RetryPolicy;
use crate::store::http::DEFAULT_ENDPOINT;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the configuration file looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "maiar.toml";

/// Directory created under the platform data directory for the default root.
pub const DATA_DIR_NAME: &str = "maiar";

/// Platform directory lookup, abstracted for tests.
pub trait BaseDirs {
    /// The per-user local data directory, if the platform defines one.
    fn data_local_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by `directories-next`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn data_local_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.data_local_dir().to_path_buf())
    }
}

/// Retry tuning as written in the configuration file.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts per transfer.
    pub attempts: u32,
    /// First backoff delay in milliseconds.
    pub backoff_ms: u64,
    /// Largest backoff delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            attempts: policy.max_attempts,
            backoff_ms: duration_millis(policy.initial_backoff),
            max_backoff_ms: duration_millis(policy.max_backoff),
        }
    }
}

impl RetrySettings {
    /// The [`RetryPolicy`] these settings describe.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.attempts,
            initial_backoff: Duration::from_millis(self.backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Resolved maiar settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Bucket holding the package repository.
    pub bucket: Option<String>,
    /// Channel prefixing every object key.
    pub channel: String,
    /// Pipeline root; defaults to the platform data directory.
    pub root: Option<Utf8PathBuf>,
    /// Blob store endpoint; `file://` selects a local directory.
    pub endpoint: String,
    /// Transfer retry tuning.
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bucket: None,
            channel: DEFAULT_CHANNEL.to_owned(),
            root: None,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            retry: RetrySettings::default(),
        }
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Overrides {
    /// Replacement bucket.
    pub bucket: Option<String>,
    /// Replacement channel.
    pub channel: Option<String>,
    /// Replacement pipeline root.
    pub root: Option<Utf8PathBuf>,
    /// Replacement endpoint.
    pub endpoint: Option<String>,
}

impl Settings {
    /// Parse settings from TOML text read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::Config`] for malformed TOML or unknown keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use maiar::config::Settings;
    ///
    /// let settings = Settings::from_toml("bucket = \"pkgs\"\n", Utf8Path::new("maiar.toml"))?;
    /// assert_eq!(settings.bucket.as_deref(), Some("pkgs"));
    /// assert_eq!(settings.channel, "linux");
    /// # Ok::<(), maiar::error::MaiarError>(())
    /// ```
    pub fn from_toml(text: &str, path: &Utf8Path) -> Result<Self> {
        toml::from_str(text).map_err(|err| MaiarError::Config {
            path: path.to_owned(),
            reason: err.message().to_owned(),
        })
    }

    /// Load settings from `explicit`, or from `cwd/maiar.toml` if present.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::Config`] if an explicitly named file does not
    /// exist or any file fails to parse, and [`MaiarError::Io`] if a file
    /// cannot be read.
    pub fn load(explicit: Option<&Utf8Path>, cwd: &Utf8Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                let path = cwd.join(path);
                if !path.is_file() {
                    return Err(MaiarError::Config {
                        path,
                        reason: "file does not exist".to_owned(),
                    });
                }
                path
            }
            None => {
                let path = cwd.join(CONFIG_FILE_NAME);
                if !path.is_file() {
                    debug!("no {CONFIG_FILE_NAME} in {cwd}; using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };
        debug!("loading configuration from {path}");
        let text = std::fs::read_to_string(&path)?;
        Self::from_toml(&text, &path)
    }

    /// Apply command-line overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(bucket) = overrides.bucket {
            self.bucket = Some(bucket);
        }
        if let Some(channel) = overrides.channel {
            self.channel = channel;
        }
        if let Some(root) = overrides.root {
            self.root = Some(root);
        }
        if let Some(endpoint) = overrides.endpoint {
            self.endpoint = endpoint;
        }
        self
    }

    /// The absolute pipeline root.
    ///
    /// Relative roots resolve against `cwd`; an unset root falls back to
    /// `<data-local-dir>/maiar`.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::Config`] if no root is set and the platform
    /// has no data directory, or [`MaiarError::NonUtf8Path`] if that
    /// directory is not valid UTF-8.
    pub fn resolved_root(&self, cwd: &Utf8Path, dirs: &dyn BaseDirs) -> Result<Utf8PathBuf> {
        if let Some(root) = &self.root {
            return Ok(cwd.join(root));
        }
        let data_dir = dirs.data_local_dir().ok_or_else(|| MaiarError::Config {
            path: Utf8PathBuf::from(CONFIG_FILE_NAME),
            reason: "root is unset and no platform data directory is available".to_owned(),
        })?;
        let data_dir = Utf8PathBuf::from_path_buf(data_dir).map_err(|path| MaiarError::NonUtf8Path {
            path: path.display().to_string(),
        })?;
        Ok(data_dir.join(DATA_DIR_NAME))
    }
}
