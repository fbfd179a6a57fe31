//! Staged script lookup and invocation.
//!
//! Every package ships one `maiar` script. The runner picks the first
//! existing variant in [`script_candidates`] order and invokes it with the
//! stage name as its only argument, from inside the package directory.

use crate::error::{MaiarError, Result};
use crate::exec::{CommandExecutor, CommandSpec, combined_output};
use crate::identity::PackageIdentity;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::fmt;
use std::str::FromStr;

/// Environment variable exposing the pipeline root to scripts.
pub const ROOT_ENV_VAR: &str = "MAIAR_ROOT";

/// Return the script filenames in precedence order: `.sh`, `.bash`, `.py`,
/// then a bare `maiar`.
///
/// # Examples
///
/// ```
/// use maiar::stage::script_candidates;
///
/// assert_eq!(
///     script_candidates(),
///     ["maiar.sh", "maiar.bash", "maiar.py", "maiar"]
/// );
/// ```
#[must_use]
pub const fn script_candidates() -> [&'static str; 4] {
    ["maiar.sh", "maiar.bash", "maiar.py", "maiar"]
}

/// A stage a package script can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Compile or otherwise prepare the extracted package.
    Build,
    /// Install the built package.
    Install,
}

impl Stage {
    /// All supported stages, in pipeline order.
    pub const ALL: [Self; 2] = [Self::Build, Self::Install];

    /// The argument passed to the script.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Install => "install",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = MaiarError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| MaiarError::UnknownStage {
                name: s.to_owned(),
                expected: Self::ALL.map(Self::as_str).join(", "),
            })
    }
}

/// Runs staged scripts through a [`CommandExecutor`].
pub struct StageScriptRunner<'a> {
    executor: &'a dyn CommandExecutor,
    root: Utf8PathBuf,
}

impl<'a> StageScriptRunner<'a> {
    /// Create a runner exporting `root` as [`ROOT_ENV_VAR`].
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, root: &Utf8Path) -> Self {
        Self {
            executor,
            root: root.to_owned(),
        }
    }

    /// Return the script that would run for `package_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::MissingScript`] if no candidate exists.
    pub fn locate(package_dir: &Utf8Path) -> Result<Utf8PathBuf> {
        script_candidates()
            .into_iter()
            .map(|candidate| package_dir.join(candidate))
            .find(|path| path.is_file())
            .ok_or_else(|| MaiarError::MissingScript {
                path: package_dir.to_owned(),
            })
    }

    /// Run `stage` for the package extracted at `package_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::MissingScript`] when there is no script,
    /// [`MaiarError::StageFailure`] when it exits nonzero, and
    /// [`MaiarError::Io`] when it cannot be spawned.
    pub fn run(&self, package_dir: &Utf8Path, identity: &PackageIdentity, stage: Stage) -> Result<()> {
        let script = Self::locate(package_dir)?;
        info!("running {stage} for {identity}");
        debug!("executing {script} {stage} in {package_dir}");

        let spec = CommandSpec::new(script.as_str())
            .arg(stage.as_str())
            .current_dir(package_dir)
            .env(ROOT_ENV_VAR, self.root.as_str());
        let output = self.executor.run(&spec)?;

        if !output.status.success() {
            return Err(MaiarError::StageFailure {
                identity: identity.clone(),
                stage,
                output: combined_output(&output),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, success_output};
    use rstest::rstest;
    use tempfile::TempDir;

    fn package_dir(files: &[&str]) -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("non-UTF8 path");
        for file in files {
            std::fs::write(dir.join(file), b"").expect("failed to write file");
        }
        (temp, dir)
    }

    fn identity() -> PackageIdentity {
        "foo.1.0".parse().expect("valid identity")
    }

    #[rstest]
    #[case::build("build", Stage::Build)]
    #[case::install("install", Stage::Install)]
    fn stage_parses_known_names(#[case] name: &str, #[case] expected: Stage) {
        assert_eq!(name.parse::<Stage>().expect("known stage"), expected);
    }

    #[test]
    fn stage_rejects_unknown_names() {
        let err = "deploy".parse::<Stage>().expect_err("unknown stage");
        assert!(matches!(err, MaiarError::UnknownStage { .. }));
        assert!(err.to_string().contains("build, install"));
    }

    #[test]
    fn locate_prefers_sh_over_other_variants() {
        let (_temp, dir) = package_dir(&["maiar.py", "maiar.bash", "maiar", "maiar.sh"]);
        let script = StageScriptRunner::locate(&dir).expect("script found");
        assert_eq!(script.file_name(), Some("maiar.sh"));
    }

    #[rstest]
    #[case::bash_before_py(&["maiar.py", "maiar.bash"], "maiar.bash")]
    #[case::py_before_bare(&["maiar", "maiar.py"], "maiar.py")]
    #[case::bare_only(&["maiar"], "maiar")]
    fn locate_follows_fixed_precedence(#[case] files: &[&str], #[case] expected: &str) {
        let (_temp, dir) = package_dir(files);
        let script = StageScriptRunner::locate(&dir).expect("script found");
        assert_eq!(script.file_name(), Some(expected));
    }

    #[test]
    fn run_without_script_is_missing_script() {
        let (_temp, dir) = package_dir(&["DOWNLOADED_FROM"]);
        let executor = StubExecutor::new(Vec::new());
        let runner = StageScriptRunner::new(&executor, Utf8Path::new("/opt/maiar"));

        let result = runner.run(&dir, &identity(), Stage::Build);
        assert!(matches!(result, Err(MaiarError::MissingScript { .. })));
        executor.assert_finished();
    }

    #[test]
    fn run_passes_stage_directory_and_root() {
        let (_temp, dir) = package_dir(&["maiar.sh"]);
        let script = dir.join("maiar.sh");
        let executor = StubExecutor::new(vec![ExpectedCall {
            spec: CommandSpec::new(script.as_str())
                .arg("install")
                .current_dir(&dir)
                .env(ROOT_ENV_VAR, "/opt/maiar"),
            result: Ok(success_output()),
        }]);
        let runner = StageScriptRunner::new(&executor, Utf8Path::new("/opt/maiar"));

        runner
            .run(&dir, &identity(), Stage::Install)
            .expect("stage succeeds");
        executor.assert_finished();
    }

    #[test]
    fn nonzero_exit_is_stage_failure_with_output() {
        let (_temp, dir) = package_dir(&["maiar.sh"]);
        let script = dir.join("maiar.sh");
        let executor = StubExecutor::new(vec![ExpectedCall {
            spec: CommandSpec::new(script.as_str())
                .arg("build")
                .current_dir(&dir)
                .env(ROOT_ENV_VAR, "/opt/maiar"),
            result: Ok(failure_output("configure: error: no compiler")),
        }]);
        let runner = StageScriptRunner::new(&executor, Utf8Path::new("/opt/maiar"));

        let err = runner
            .run(&dir, &identity(), Stage::Build)
            .expect_err("stage fails");
        let MaiarError::StageFailure { stage, output, .. } = err else {
            panic!("expected StageFailure, got {err:?}");
        };
        assert_eq!(stage, Stage::Build);
        assert!(output.contains("no compiler"));
    }
}
