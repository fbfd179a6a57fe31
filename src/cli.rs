//! CLI argument definitions for maiar.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::config::Overrides;
use crate::store::http::TOKEN_ENV_VAR;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Package, publish and install versioned software bundles.
#[derive(Parser, Debug)]
#[command(name = "maiar")]
#[command(version, about)]
#[command(long_about = concat!(
    "Package, publish and install versioned software bundles.\n\n",
    "A package is a directory named <name>.<version> holding one maiar script ",
    "(maiar.sh, maiar.bash, maiar.py or maiar) and a DOWNLOADED_FROM or ",
    "SOURCE_REPO provenance file. `pack` archives package directories, `push` ",
    "uploads the archives to the repository bucket, and `download`, `build` and ",
    "`install` fetch the packages named by requirement entries and run their ",
    "scripts.",
))]
#[command(after_help = concat!(
    "REQUIREMENTS:\n",
    "  name=version         Pin a package, e.g. zlib=1.3.1\n",
    "  path/to/file.txt     Read further requirements from a file\n\n",
    "EXAMPLES:\n",
    "  Archive and publish every package under ./packages:\n",
    "    $ maiar pack packages && maiar --bucket acme push packages\n\n",
    "  Install from a requirements file:\n",
    "    $ maiar --bucket acme install requirements.txt\n\n",
    "  Preview an install without touching disk:\n",
    "    $ maiar --dry-run install zlib=1.3.1",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Archive package directories into `<name>.<version>.tar.bz2`.
    Pack(PackageArgs),

    /// Upload previously packed archives to the repository.
    Push(PackageArgs),

    /// Download and extract the required packages.
    Download(RequirementArgs),

    /// Download the required packages and run their build stage.
    Build(RequirementArgs),

    /// Download, build and install the required packages.
    Install(RequirementArgs),
}

/// Arguments naming package directories.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PackageArgs {
    /// Package directories, or directories containing them.
    #[arg(value_name = "DIR", required = true)]
    pub roots: Vec<Utf8PathBuf>,
}

/// Arguments naming requirements.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RequirementArgs {
    /// `name=version` pins or requirement `.txt` files.
    #[arg(value_name = "REQUIREMENT", required = true)]
    pub requirements: Vec<String>,
}

/// Global options.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Repository bucket.
    #[arg(long, global = true, env = "MAIAR_BUCKET", value_name = "BUCKET")]
    pub bucket: Option<String>,

    /// Repository channel [default: linux].
    #[arg(long, global = true, env = "MAIAR_CHANNEL", value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// Pipeline root holding downloads/ and build/ [default: platform-specific].
    #[arg(long, global = true, env = "MAIAR_ROOT", value_name = "DIR")]
    pub root: Option<Utf8PathBuf>,

    /// Blob store endpoint; `file://DIR` uses a local directory.
    #[arg(long, global = true, env = "MAIAR_ENDPOINT", value_name = "URL")]
    pub endpoint: Option<String>,

    /// Configuration file [default: ./maiar.toml when present].
    #[arg(long, global = true, env = "MAIAR_CONFIG", value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Bearer token sent to the HTTP blob store.
    #[arg(long, global = true, env = TOKEN_ENV_VAR, hide_env_values = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Report what would be done without writing, uploading or running anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

impl GlobalArgs {
    /// Settings overrides carried by these flags.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            bucket: self.bucket.clone(),
            channel: self.channel.clone(),
            root: self.root.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    /// Log filter directive implied by `-q` and `-v`.
    ///
    /// # Examples
    ///
    /// ```
    /// use maiar::cli::GlobalArgs;
    ///
    /// assert_eq!(GlobalArgs::default().log_level(), "warn");
    /// let verbose = GlobalArgs { verbosity: 2, ..GlobalArgs::default() };
    /// assert_eq!(verbose.log_level(), "debug");
    /// ```
    #[must_use]
    pub const fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ENV_VARS: [&str; 6] = [
        "MAIAR_BUCKET",
        "MAIAR_CHANNEL",
        "MAIAR_ROOT",
        "MAIAR_ENDPOINT",
        "MAIAR_CONFIG",
        TOKEN_ENV_VAR,
    ];

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        let cleared: Vec<(&str, Option<&str>)> = ENV_VARS.iter().map(|var| (*var, None)).collect();
        temp_env::with_vars(cleared, || Cli::try_parse_from(args))
    }

    #[test]
    fn install_collects_requirements() {
        let cli = parse(&["maiar", "install", "foo=1.0", "reqs.txt"]).expect("valid args");
        assert_eq!(
            cli.command,
            Command::Install(RequirementArgs {
                requirements: vec!["foo=1.0".to_owned(), "reqs.txt".to_owned()],
            })
        );
    }

    #[rstest]
    #[case::pack("pack")]
    #[case::push("push")]
    #[case::download("download")]
    #[case::install("install")]
    fn subcommands_require_arguments(#[case] subcommand: &str) {
        assert!(parse(&["maiar", subcommand]).is_err());
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = parse(&["maiar", "push", "packages", "--bucket", "acme", "--dry-run", "-vv"])
            .expect("valid args");
        assert_eq!(cli.global.bucket.as_deref(), Some("acme"));
        assert!(cli.global.dry_run);
        assert_eq!(cli.global.verbosity, 2);
        assert!(matches!(cli.command, Command::Push(_)));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(parse(&["maiar", "-q", "-v", "pack", "."]).is_err());
    }

    #[test]
    fn environment_supplies_missing_flags() {
        let cli = temp_env::with_vars(
            [
                ("MAIAR_BUCKET", Some("env-bucket")),
                ("MAIAR_ENDPOINT", Some("file:///srv/blobs")),
                ("MAIAR_CHANNEL", None),
                ("MAIAR_ROOT", None),
                ("MAIAR_CONFIG", None),
                (TOKEN_ENV_VAR, None),
            ],
            || Cli::try_parse_from(["maiar", "download", "foo=1.0"]),
        )
        .expect("valid args");
        let overrides = cli.global.overrides();
        assert_eq!(overrides.bucket.as_deref(), Some("env-bucket"));
        assert_eq!(overrides.endpoint.as_deref(), Some("file:///srv/blobs"));
        assert!(overrides.channel.is_none());
    }

    #[test]
    fn flag_wins_over_environment() {
        let cli = temp_env::with_var("MAIAR_CHANNEL", Some("darwin"), || {
            Cli::try_parse_from(["maiar", "--channel", "linux-arm64", "build", "foo=1.0"])
        })
        .expect("valid args");
        assert_eq!(cli.global.channel.as_deref(), Some("linux-arm64"));
    }

    #[rstest]
    #[case::quiet(GlobalArgs { quiet: true, ..GlobalArgs::default() }, "error")]
    #[case::default(GlobalArgs::default(), "warn")]
    #[case::verbose(GlobalArgs { verbosity: 1, ..GlobalArgs::default() }, "info")]
    #[case::very_verbose(GlobalArgs { verbosity: 5, ..GlobalArgs::default() }, "trace")]
    fn log_level_tracks_flags(#[case] args: GlobalArgs, #[case] expected: &str) {
        assert_eq!(args.log_level(), expected);
    }
}
