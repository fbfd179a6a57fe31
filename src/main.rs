//! maiar CLI entrypoint.
//!
//! This binary archives and publishes package directories, and resolves,
//! downloads, builds and installs packages named by requirement entries.

use camino::Utf8PathBuf;
use clap::Parser;
use maiar::archive::packaging::PackageArchiver;
use maiar::cli::{Cli, Command, GlobalArgs, PackageArgs, RequirementArgs};
use maiar::config::{Settings, SystemBaseDirs};
use maiar::error::{MaiarError, Result};
use maiar::exec::SystemCommandExecutor;
use maiar::output::{batch_summary, pack_summary, push_summary, write_stderr_line};
use maiar::pipeline::{BuildInstallPipeline, Goal};
use maiar::repository::RepositoryClient;
use maiar::requirements::resolve;
use maiar::scanner::{PackageMap, scan_roots};
use maiar::store::{BlobStore, open_store};
use std::io::Write;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a log filter directive.
const LOG_ENV_VAR: &str = "MAIAR_LOG";

struct RunContext<'a> {
    global: &'a GlobalArgs,
    settings: Settings,
    cwd: Utf8PathBuf,
}

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    init_logging(&cli.global, &mut stderr);
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Installs a stderr `tracing` subscriber; `log` records are bridged into it.
fn init_logging(global: &GlobalArgs, stderr: &mut dyn Write) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(global.log_level()));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if let Err(err) = installed {
        write_stderr_line(stderr, format!("warning: logging disabled: {err}"));
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    let cwd = current_dir()?;
    let settings = Settings::load(cli.global.config.as_deref(), &cwd)?
        .with_overrides(cli.global.overrides());
    let context = RunContext {
        global: &cli.global,
        settings,
        cwd,
    };

    match &cli.command {
        Command::Pack(args) => run_pack(&context, args, stderr),
        Command::Push(args) => run_push(&context, args, stderr),
        Command::Download(args) => run_goal(&context, Goal::Download, args, stderr),
        Command::Build(args) => run_goal(&context, Goal::Build, args, stderr),
        Command::Install(args) => run_goal(&context, Goal::Install, args, stderr),
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir()?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| MaiarError::NonUtf8Path {
        path: path.display().to_string(),
    })
}

/// Scans the package roots named on the command line.
fn scan(context: &RunContext<'_>, args: &PackageArgs) -> Result<PackageMap> {
    let roots: Vec<Utf8PathBuf> = args.roots.iter().map(|root| context.cwd.join(root)).collect();
    scan_roots(&roots)
}

fn run_pack(context: &RunContext<'_>, args: &PackageArgs, stderr: &mut dyn Write) -> Result<()> {
    let packages = scan(context, args)?;
    let mut outcomes = Vec::with_capacity(packages.len());
    for package in packages.values() {
        outcomes.push(PackageArchiver.build(package, context.global.dry_run)?);
    }
    report(context, stderr, &pack_summary(&outcomes));
    Ok(())
}

fn run_push(context: &RunContext<'_>, args: &PackageArgs, stderr: &mut dyn Write) -> Result<()> {
    let packages = scan(context, args)?;
    let store = store_for(context);
    let repository = open_repository(context, store.as_ref())?;
    let mut outcomes = Vec::with_capacity(packages.len());
    for package in packages.values() {
        outcomes.push(repository.push(
            &package.identity,
            &package.archive_path(),
            context.global.dry_run,
        )?);
    }
    report(context, stderr, &push_summary(repository.bucket(), &outcomes));
    Ok(())
}

fn run_goal(
    context: &RunContext<'_>,
    goal: Goal,
    args: &RequirementArgs,
    stderr: &mut dyn Write,
) -> Result<()> {
    let identities = resolve(&args.requirements, &context.cwd)?;
    let root = context.settings.resolved_root(&context.cwd, &SystemBaseDirs)?;
    let store = store_for(context);
    let repository = open_repository(context, store.as_ref())?;
    let executor = SystemCommandExecutor;
    let mut pipeline =
        BuildInstallPipeline::new(&root, &repository, &executor, context.global.dry_run);
    let summary = pipeline.run_batch(goal, &identities)?;
    report(context, stderr, &batch_summary(&summary));
    Ok(())
}

fn store_for(context: &RunContext<'_>) -> Box<dyn BlobStore> {
    open_store(&context.settings.endpoint, context.global.token.clone())
}

fn open_repository<'a>(
    context: &RunContext<'_>,
    store: &'a dyn BlobStore,
) -> Result<RepositoryClient<'a>> {
    RepositoryClient::open(
        store,
        context.settings.bucket.as_deref(),
        &context.settings.channel,
        context.settings.retry.policy(),
    )
}

fn report(context: &RunContext<'_>, stderr: &mut dyn Write, summary: &str) {
    if !context.global.quiet {
        write_stderr_line(stderr, summary);
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;
    use maiar::stage::Stage;

    fn context<'a>(global: &'a GlobalArgs, cwd: &Utf8Path) -> RunContext<'a> {
        RunContext {
            global,
            settings: Settings::default(),
            cwd: cwd.to_owned(),
        }
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = MaiarError::RepositoryUnset;

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("no repository configured"));
    }

    #[test]
    fn stage_failure_output_reaches_stderr() {
        let err = MaiarError::StageFailure {
            identity: "foo.1.0".parse().expect("valid identity"),
            stage: Stage::Build,
            output: "make: *** [all] Error 2".to_owned(),
        };
        let mut stderr = Vec::new();
        exit_code_for_run_result(Err(err), &mut stderr);
        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("Error 2"));
    }

    #[test]
    fn quiet_suppresses_summaries() {
        let global = GlobalArgs {
            quiet: true,
            ..GlobalArgs::default()
        };
        let mut stderr = Vec::new();
        report(&context(&global, Utf8Path::new("/tmp")), &mut stderr, "Packed 1 package:");
        assert!(stderr.is_empty());
    }

    #[test]
    fn push_without_bucket_fails_before_scanning_remote() {
        let temp = tempfile::tempdir().expect("temp dir");
        let cwd = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("non-UTF8 path");
        let global = GlobalArgs::default();
        let args = PackageArgs {
            roots: vec![Utf8PathBuf::from(".")],
        };
        let mut stderr = Vec::new();
        let err = run_push(&context(&global, &cwd), &args, &mut stderr).expect_err("no bucket");
        assert!(matches!(err, MaiarError::RepositoryUnset));
    }
}
