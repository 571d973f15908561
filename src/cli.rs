use anyhow::Context;
use clap::Parser;

use crate::process::Launcher;
use crate::runner::ScriptRunner;

#[derive(Debug, Parser)]
#[command(
    name = "docker-scripts",
    version,
    about = "Build, run, start and push the Docker image of a single service",
    after_help = "Package name and version are read from npm_package_name and \
                  npm_package_version, falling back to ./package.json."
)]
pub struct Cli {
    /// One of: build, run, up, push
    mode: Option<String>,
}

/// Parses the process arguments, runs the requested mode and returns the
/// exit code for the process.
pub fn run() -> i32 {
    let cli = Cli::parse();

    let root = match std::env::current_dir().context("resolving working directory") {
        Ok(root) => root,
        Err(err) => {
            eprintln!("{err:#}");
            return 1;
        }
    };

    execute(&ScriptRunner::from_env(root), cli.mode.as_deref())
}

/// Invalid modes print usage and succeed; every other runner error is fatal.
/// The child's own exit code never leaks into ours.
pub fn execute<L: Launcher>(runner: &ScriptRunner<L>, mode: Option<&str>) -> i32 {
    let mode = mode.unwrap_or_default();
    tracing::debug!(mode, root = %runner.root().display(), "running docker script");

    match runner.run(mode) {
        Ok(dispatch) => {
            tracing::debug!(
                mode = %dispatch.mode,
                exit_code = ?dispatch.exit_code,
                generated_dockerfile = dispatch.generated_dockerfile,
                "dispatch finished"
            );
            0
        }
        Err(err) if !err.is_fatal() => {
            println!("{err}");
            0
        }
        Err(err) => {
            tracing::error!(error = %err, "docker script failed");
            println!("{err}");
            1
        }
    }
}
