use crate::app::Installer;
use crate::error::FlowError;
use crate::model::{FlowResult, StepId};
use crate::options::ThemeSource;
use crate::orchestrator::process_run_completion;
use crate::text_summary::{self, TextSummary};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

/// Print a value as pretty JSON or as text summary lines, then flush.
async fn emit<T: Serialize>(json: bool, value: &T, summary: TextSummary) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    if json {
        let out = serde_json::to_string_pretty(value)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "vencord-installer",
    version,
    about = "Install, update and repair Vencord for local Discord clients"
)]
pub struct Cli {
    /// Application directory for options, backups and logs
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Mirror debug logs to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List detected client installations
    Installs {
        #[arg(long)]
        json: bool,
    },
    /// List running client processes
    Processes {
        #[arg(long)]
        json: bool,
    },
    /// Show or change the persisted run options
    Options(OptionsArgs),
    /// Choose which installs the patch flow targets (stable, ptb, canary)
    Select {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Run the full patch flow
    Run {
        /// Print the final result as JSON instead of progress lines
        #[arg(long)]
        json: bool,

        /// Export the result (and error, if any) as JSON
        #[arg(long)]
        export_json: Option<PathBuf>,
    },
    /// Run a single step in isolation
    DevTest {
        step: StepId,

        /// Directory to snapshot instead of the configured source directory
        #[arg(long)]
        source: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
    /// Manage backups
    Backups {
        #[command(subcommand)]
        command: BackupsCommand,
    },
}

#[derive(Debug, Args, Clone)]
pub struct OptionsArgs {
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub action: Option<OptionsCommand>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum OptionsCommand {
    /// Update one or more option fields
    Set(OptionsSet),
}

#[derive(Debug, Args, Clone, Default)]
pub struct OptionsSet {
    #[arg(long)]
    pub repo_url: Option<String>,

    #[arg(long)]
    pub repo_dir: Option<PathBuf>,

    /// Use --close-before-backup true or --close-before-backup false
    #[arg(long, action = clap::ArgAction::Set)]
    pub close_before_backup: Option<bool>,

    #[arg(long, conflicts_with = "unlimited_backups")]
    pub max_backups: Option<u32>,

    #[arg(long)]
    pub unlimited_backups: bool,

    #[arg(long, conflicts_with = "unlimited_backup_size")]
    pub max_backup_size_mb: Option<u64>,

    #[arg(long)]
    pub unlimited_backup_size: bool,

    /// Extra plugin repository; repeat to set several (replaces the list)
    #[arg(long = "plugin-repo")]
    pub plugin_repos: Vec<String>,

    /// Theme as ID=URL; repeat to set several (replaces the list)
    #[arg(long = "theme", value_parser = parse_theme)]
    pub themes: Vec<ThemeSource>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum BackupsCommand {
    /// List backups, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete backups by name
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn parse_theme(raw: &str) -> Result<ThemeSource, String> {
    let (id, url) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=URL, got '{raw}'"))?;
    let (id, url) = (id.trim(), url.trim());
    if id.is_empty() || url.is_empty() {
        return Err(format!("expected ID=URL, got '{raw}'"));
    }
    Ok(ThemeSource {
        id: id.to_string(),
        name: id.to_string(),
        url: url.to_string(),
    })
}

impl OptionsSet {
    fn is_empty(&self) -> bool {
        self.repo_url.is_none()
            && self.repo_dir.is_none()
            && self.close_before_backup.is_none()
            && self.max_backups.is_none()
            && !self.unlimited_backups
            && self.max_backup_size_mb.is_none()
            && !self.unlimited_backup_size
            && self.plugin_repos.is_empty()
            && self.themes.is_empty()
    }

    fn apply(self, options: &mut crate::options::RunOptions) {
        if let Some(url) = self.repo_url {
            options.repo_url = url;
        }
        if let Some(dir) = self.repo_dir {
            options.repo_dir = dir;
        }
        if let Some(close) = self.close_before_backup {
            options.close_before_backup = close;
        }
        if self.unlimited_backups {
            options.max_backup_count = None;
        } else if let Some(n) = self.max_backups {
            options.max_backup_count = Some(n);
        }
        if self.unlimited_backup_size {
            options.max_backup_size_mb = None;
        } else if let Some(mb) = self.max_backup_size_mb {
            options.max_backup_size_mb = Some(mb);
        }
        if !self.plugin_repos.is_empty() {
            options.user_repositories = self.plugin_repos;
        }
        if !self.themes.is_empty() {
            options.themes = self.themes;
        }
    }
}

/// Execute one command. Returns the process exit code.
pub async fn run(command: Command, installer: &Installer) -> Result<i32> {
    match command {
        Command::Installs { json } => {
            let installs = installer.list_installs();
            emit(json, &installs, text_summary::build_install_list(&installs)).await?;
        }
        Command::Processes { json } => {
            let processes = installer
                .list_running_processes()
                .context("failed to enumerate processes")?;
            emit(json, &processes, text_summary::build_process_list(&processes)).await?;
        }
        Command::Options(args) => {
            let options = match args.action {
                Some(OptionsCommand::Set(set)) => {
                    if set.is_empty() {
                        return Err(anyhow::anyhow!(
                            "nothing to change; see `options set --help`"
                        ));
                    }
                    installer
                        .update_options(|o| set.apply(o))
                        .context("failed to save options")?
                }
                None => installer.get_options().context("failed to load options")?,
            };
            emit(args.json, &options, text_summary::build_options_summary(&options)).await?;
        }
        Command::Select { ids } => {
            installer
                .set_selected_installs(ids.clone())
                .context("failed to save selection")?;
            tracing::info!(installs = ?ids, "selection updated");
            let options = installer.get_options().context("failed to load options")?;
            emit(false, &options, text_summary::build_options_summary(&options)).await?;
        }
        Command::Run { json, export_json } => {
            return run_flow(installer, json, export_json).await;
        }
        Command::DevTest { step, source, json } => {
            let outcome = installer
                .run_dev_test(step, source)
                .await
                .with_context(|| format!("dev-test {step} failed"))?;
            emit(json, &outcome, text_summary::build_dev_test_summary(&outcome)).await?;
        }
        Command::Backups { command } => match command {
            BackupsCommand::List { json } => {
                let entries = installer.list_backups().context("failed to list backups")?;
                emit(json, &entries, text_summary::build_backup_list(&entries)).await?;
            }
            BackupsCommand::Delete { names } => {
                let report = installer.delete_backups(&names);
                emit(false, &report, text_summary::build_delete_report(&report)).await?;
                if !report.is_complete() {
                    return Ok(1);
                }
            }
        },
    }
    Ok(0)
}

/// Stream progress while the patch flow runs, then print the result.
async fn run_flow(installer: &Installer, json: bool, export_json: Option<PathBuf>) -> Result<i32> {
    let (out_tx, out_handle) = spawn_output_writer();
    // Subscribe before starting so the first Running event is not missed.
    let mut events = installer.subscribe_progress();
    let mut events_open = true;

    let flow = installer.run_patch_flow();
    tokio::pin!(flow);

    let outcome: Result<FlowResult, FlowError> = loop {
        tokio::select! {
            biased;
            ev = events.recv(), if events_open => match ev {
                Ok(ev) => {
                    if !json {
                        let _ = out_tx.send(OutputLine::Stderr(ev.to_message()));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "progress output fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => events_open = false,
            },
            outcome = &mut flow => break outcome,
        }
    };
    while let Ok(ev) = events.try_recv() {
        if !json {
            let _ = out_tx.send(OutputLine::Stderr(ev.to_message()));
        }
    }

    let processed = process_run_completion(&outcome, export_json.as_deref(), installer.backups());

    let result = match &outcome {
        Ok(result) => Some(result),
        Err(e) => e.result(),
    };
    if let Some(result) = result {
        if json {
            let out = serde_json::to_string_pretty(result)?;
            let _ = out_tx.send(OutputLine::Stdout(out));
        } else {
            for line in text_summary::build_flow_summary(result).lines {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
        }
    }
    if let Err(e) = &outcome {
        let _ = out_tx.send(OutputLine::Stderr(format!("Patch flow aborted: {e}")));
    }
    for msg in processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }
    if !json {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "{} backup(s) on disk",
            processed.backups.len()
        )));
    }

    drop(out_tx);
    let _ = out_handle.await;

    Ok(if outcome.is_ok() { 0 } else { 1 })
}
