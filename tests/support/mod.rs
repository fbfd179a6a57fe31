//! Test support utilities for maiar behavioural tests.
//!
//! Helpers here build package directories on disk and convert temporary
//! paths to UTF-8.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

/// Create a temporary directory and return it with its UTF-8 path.
pub fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("non-UTF8 temp path");
    (temp, path)
}

/// Write a package directory `parent/dir_name` holding `script` with the
/// given contents and a `marker` file.
pub fn write_package(
    parent: &Utf8Path,
    dir_name: &str,
    script: &str,
    contents: &str,
    marker: &str,
) -> Utf8PathBuf {
    let path = parent.join(dir_name);
    fs::create_dir_all(&path).expect("create package dir");
    let script_path = path.join(script);
    fs::write(&script_path, contents).expect("write script");
    make_executable(&script_path);
    fs::write(path.join(marker), "https://example.test/source\n").expect("write marker");
    path
}

/// Shell script that appends its stage to `stages.log` and exits with
/// `build_status` on `build` and 0 otherwise.
pub fn recording_script(build_status: u8) -> String {
    format!(
        "#!/bin/sh\necho \"$1\" >> stages.log\nif [ \"$1\" = build ]; then exit {build_status}; fi\nexit 0\n"
    )
}

/// Mark `path` executable.
#[cfg(unix)]
pub fn make_executable(path: &Utf8Path) {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod script");
}

/// Mark `path` executable.
#[cfg(not(unix))]
pub fn make_executable(_path: &Utf8Path) {}
