use anyhow::{Context, Result};
use clap::Parser;
use vencord_installer::app::Installer;
use vencord_installer::cli::{self, Cli};
use vencord_installer::config::AppPaths;
use vencord_installer::logging;

/// Set up directories and logging, run the command, and return its exit code.
/// The log guard is dropped here so buffered lines reach the file before exit.
async fn start(args: Cli) -> Result<i32> {
    let paths = match args.config_dir.clone() {
        Some(root) => AppPaths::with_root(root),
        None => AppPaths::discover(),
    }
    .context("failed to resolve application directories")?;
    paths
        .ensure()
        .context("failed to create application directories")?;

    let _log_guard = logging::init(&paths.logs_dir(), args.verbose)?;

    let installer = Installer::open(paths).context("failed to open installer state")?;
    let code = cli::run(args.command, &installer).await;
    if let Err(e) = &code {
        tracing::error!(error = %format!("{e:#}"), "command failed");
    }
    code
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    match start(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
