//! Download, build and install orchestration.
//!
//! [`BuildInstallPipeline`] drives each requested package through
//! `Unstarted → Downloaded → Built → Installed`, recording progress in a
//! [`PipelineState`] that lives for one invocation. Asking for a step a
//! package has already reached is a no-op, so a batch can mix goals
//! without repeating transfers or scripts. A package that fails is marked
//! [`PackageState::Failed`] and is not retried in the same run.

use crate::archive::extraction::extract_package;
use crate::error::{MaiarError, Result};
use crate::exec::CommandExecutor;
use crate::identity::{PackageIdentity, PackageName, PackageVersion};
use crate::repository::RepositoryClient;
use crate::stage::{Stage, StageScriptRunner};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Subdirectory of the pipeline root receiving downloaded archives.
pub const DOWNLOADS_DIR: &str = "downloads";

/// Subdirectory of the pipeline root receiving extracted packages.
pub const BUILD_DIR: &str = "build";

/// Progress of one package within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageState {
    /// Nothing has happened yet.
    Unstarted,
    /// The archive was downloaded and extracted.
    Downloaded,
    /// The build stage succeeded.
    Built,
    /// The install stage succeeded.
    Installed,
    /// A step failed; terminal for this run.
    Failed,
}

impl PackageState {
    /// The state a successful step moves `self` to, if any.
    #[must_use]
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::Unstarted => Some(Self::Downloaded),
            Self::Downloaded => Some(Self::Built),
            Self::Built => Some(Self::Installed),
            Self::Installed | Self::Failed => None,
        }
    }

    /// Whether `self` is `target` or a later successful state.
    #[must_use]
    pub const fn has_reached(self, target: Self) -> bool {
        match (self, target) {
            (Self::Failed, _) | (_, Self::Failed) => false,
            _ => self.rank() >= target.rank(),
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Unstarted | Self::Failed => 0,
            Self::Downloaded => 1,
            Self::Built => 2,
            Self::Installed => 3,
        }
    }

    /// Lowercase name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Downloaded => "downloaded",
            Self::Built => "built",
            Self::Installed => "installed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The furthest step a batch should take each package to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Goal {
    /// Download and extract only.
    Download,
    /// Download, then run the build stage.
    Build,
    /// Download, build, then run the install stage.
    Install,
}

impl Goal {
    /// All goals, in pipeline order.
    pub const ALL: [Self; 3] = [Self::Download, Self::Build, Self::Install];

    /// Lowercase name of the goal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Build => "build",
            Self::Install => "install",
        }
    }

    /// The package state this goal ends in.
    #[must_use]
    pub const fn target_state(self) -> PackageState {
        match self {
            Self::Download => PackageState::Downloaded,
            Self::Build => PackageState::Built,
            Self::Install => PackageState::Installed,
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Goal {
    type Err = MaiarError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|goal| goal.as_str() == s)
            .ok_or_else(|| MaiarError::UnknownStage {
                name: s.to_owned(),
                expected: Self::ALL.map(Self::as_str).join(", "),
            })
    }
}

#[derive(Debug, Clone)]
struct Record {
    version: PackageVersion,
    state: PackageState,
    failed_during: Option<Goal>,
}

/// Per-run record of how far each package has progressed.
///
/// Keyed by package name; a request for the same name with another
/// version starts from [`PackageState::Unstarted`] and replaces the old
/// record once it advances.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    records: HashMap<PackageName, Record>,
}

impl PipelineState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `identity`.
    #[must_use]
    pub fn state_of(&self, identity: &PackageIdentity) -> PackageState {
        self.record(identity)
            .map_or(PackageState::Unstarted, |record| record.state)
    }

    /// The step during which `identity` failed, if it did.
    #[must_use]
    pub fn failed_during(&self, identity: &PackageIdentity) -> Option<Goal> {
        self.record(identity).and_then(|record| record.failed_during)
    }

    /// Move `identity` to `to`, which must be the successor of its
    /// current state.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::InvalidTransition`] for any other move.
    pub fn advance(&mut self, identity: &PackageIdentity, to: PackageState) -> Result<()> {
        let from = self.state_of(identity);
        if from.successor() != Some(to) {
            return Err(MaiarError::InvalidTransition {
                identity: identity.clone(),
                from,
                to,
            });
        }
        self.set(identity, to, None);
        Ok(())
    }

    /// Record that `identity` failed while working towards `during`.
    pub fn mark_failed(&mut self, identity: &PackageIdentity, during: Goal) {
        self.set(identity, PackageState::Failed, Some(during));
    }

    fn record(&self, identity: &PackageIdentity) -> Option<&Record> {
        self.records
            .get(identity.name())
            .filter(|record| &record.version == identity.version())
    }

    fn set(&mut self, identity: &PackageIdentity, state: PackageState, failed_during: Option<Goal>) {
        self.records.insert(
            identity.name().clone(),
            Record {
                version: identity.version().clone(),
                state,
                failed_during,
            },
        );
    }
}

/// Directories used by a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineLayout {
    /// The pipeline root, exported to scripts.
    pub root: Utf8PathBuf,
    /// Where archives are downloaded.
    pub downloads: Utf8PathBuf,
    /// Where archives are extracted and scripts run.
    pub build: Utf8PathBuf,
}

impl PipelineLayout {
    /// Derive the layout under `root`.
    #[must_use]
    pub fn new(root: &Utf8Path) -> Self {
        Self {
            root: root.to_owned(),
            downloads: root.join(DOWNLOADS_DIR),
            build: root.join(BUILD_DIR),
        }
    }

    /// Extracted directory of `identity`.
    #[must_use]
    pub fn package_dir(&self, identity: &PackageIdentity) -> Utf8PathBuf {
        self.build.join(identity.dir_name())
    }
}

/// Packages a batch carried to its goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// The goal of the batch.
    pub goal: Goal,
    /// Packages processed, in order.
    pub completed: Vec<PackageIdentity>,
    /// Whether the batch only reported its steps.
    pub dry_run: bool,
}

/// Runs the download → build → install state machine.
pub struct BuildInstallPipeline<'a> {
    layout: PipelineLayout,
    repository: &'a RepositoryClient<'a>,
    runner: StageScriptRunner<'a>,
    state: PipelineState,
    dry_run: bool,
}

impl<'a> BuildInstallPipeline<'a> {
    /// Create a pipeline rooted at `root`.
    #[must_use]
    pub fn new(
        root: &Utf8Path,
        repository: &'a RepositoryClient<'a>,
        executor: &'a dyn CommandExecutor,
        dry_run: bool,
    ) -> Self {
        Self {
            layout: PipelineLayout::new(root),
            repository,
            runner: StageScriptRunner::new(executor, root),
            state: PipelineState::new(),
            dry_run,
        }
    }

    /// Directories used by this pipeline.
    #[must_use]
    pub const fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    /// Progress recorded so far.
    #[must_use]
    pub const fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Download and extract `identity`, unless already done this run.
    ///
    /// # Errors
    ///
    /// Returns [`MaiarError::PackageFailed`] if the package failed earlier,
    /// otherwise any repository, extraction or I/O error.
    pub fn download(&mut self, identity: &PackageIdentity) -> Result<()> {
        self.ensure_not_failed(identity)?;
        if self.state.state_of(identity).has_reached(PackageState::Downloaded) {
            debug!("{identity} already downloaded");
            return Ok(());
        }

        match self.fetch(identity) {
            Ok(()) => self.record_success(identity, PackageState::Downloaded),
            Err(err) => Err(self.record_failure(identity, Goal::Download, err)),
        }
    }

    /// Download `identity`, then run its build stage once.
    ///
    /// # Errors
    ///
    /// As [`Self::download`], plus [`MaiarError::MissingScript`] and
    /// [`MaiarError::StageFailure`] from the build stage.
    pub fn build(&mut self, identity: &PackageIdentity) -> Result<()> {
        self.download(identity)?;
        if self.state.state_of(identity).has_reached(PackageState::Built) {
            debug!("{identity} already built");
            return Ok(());
        }
        self.run_stage(identity, Stage::Build, Goal::Build, PackageState::Built)
    }

    /// Build `identity`, then run its install stage once.
    ///
    /// # Errors
    ///
    /// As [`Self::build`], plus failures of the install stage.
    pub fn install(&mut self, identity: &PackageIdentity) -> Result<()> {
        self.build(identity)?;
        if self.state.state_of(identity).has_reached(PackageState::Installed) {
            debug!("{identity} already installed");
            return Ok(());
        }
        self.run_stage(identity, Stage::Install, Goal::Install, PackageState::Installed)
    }

    /// Carry a single package to `goal`.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing step.
    pub fn run(&mut self, goal: Goal, identity: &PackageIdentity) -> Result<()> {
        match goal {
            Goal::Download => self.download(identity),
            Goal::Build => self.build(identity),
            Goal::Install => self.install(identity),
        }
    }

    /// Carry every package to `goal` in order, stopping at the first
    /// failure. Packages after the failing one are not attempted.
    ///
    /// # Errors
    ///
    /// Returns the first package error.
    pub fn run_batch(&mut self, goal: Goal, identities: &[PackageIdentity]) -> Result<BatchSummary> {
        let mut completed = Vec::with_capacity(identities.len());
        for identity in identities {
            self.run(goal, identity)?;
            completed.push(identity.clone());
        }
        Ok(BatchSummary {
            goal,
            completed,
            dry_run: self.dry_run,
        })
    }

    fn ensure_not_failed(&self, identity: &PackageIdentity) -> Result<()> {
        if self.state.state_of(identity) != PackageState::Failed {
            return Ok(());
        }
        let stage = self
            .state
            .failed_during(identity)
            .map_or_else(|| "an earlier step".to_owned(), |goal| goal.to_string());
        Err(MaiarError::PackageFailed {
            identity: identity.clone(),
            stage,
        })
    }

    fn fetch(&self, identity: &PackageIdentity) -> Result<()> {
        let key = self.repository.object_key(identity);
        let archive = self.layout.downloads.join(identity.archive_name());

        if self.dry_run {
            self.repository.download(&key, &archive, true)?;
            info!(
                "[dry-run] would extract {archive} into {}",
                self.layout.package_dir(identity)
            );
            return Ok(());
        }

        std::fs::create_dir_all(&self.layout.downloads)?;
        std::fs::create_dir_all(&self.layout.build)?;
        self.repository.download(&key, &archive, false)?;
        let extracted = extract_package(&archive, identity, &self.layout.build).map_err(|source| {
            MaiarError::Extraction {
                identity: identity.clone(),
                source,
            }
        })?;
        info!("extracted {identity} into {extracted}");

        if let Err(err) = std::fs::remove_file(&archive) {
            warn!("could not remove {archive}: {err}");
        }
        Ok(())
    }

    fn run_stage(
        &mut self,
        identity: &PackageIdentity,
        stage: Stage,
        goal: Goal,
        reached: PackageState,
    ) -> Result<()> {
        let package_dir = self.layout.package_dir(identity);
        if self.dry_run {
            info!("[dry-run] would run {stage} for {identity} in {package_dir}");
            return Ok(());
        }
        match self.runner.run(&package_dir, identity, stage) {
            Ok(()) => self.record_success(identity, reached),
            Err(err) => Err(self.record_failure(identity, goal, err)),
        }
    }

    fn record_success(&mut self, identity: &PackageIdentity, reached: PackageState) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        self.state.advance(identity, reached)
    }

    fn record_failure(&mut self, identity: &PackageIdentity, goal: Goal, err: MaiarError) -> MaiarError {
        if !self.dry_run {
            self.state.mark_failed(identity, goal);
        }
        err
    }
}
