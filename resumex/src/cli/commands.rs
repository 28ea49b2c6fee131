//! CLI command execution.
//!
//! Commands own the session record for the duration of a run: they create or
//! load it, hand the command to the supervisor, then write the outcome back
//! and save.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use super::args::{Cli, Commands};
use crate::config::Config;
use crate::models::SessionRecord;
use crate::process::{
    join_command, round_trips, tokenize, RunOutcome, RunReport, RunRequest, Supervisor,
    SupervisorError,
};
use crate::resume::ResumeRegistry;
use crate::store::SessionStore;

const COMMAND_WIDTH: usize = 50;
const DIR_WIDTH: usize = 30;

/// Everything a command needs, built once per invocation.
pub struct App {
    store: SessionStore,
    registry: ResumeRegistry,
    supervisor: Supervisor,
}

impl App {
    /// Open the session store and set up the resume rules.
    pub fn new(config: &Config) -> Result<Self> {
        let store = SessionStore::open(&config.base_dir).with_context(|| {
            format!(
                "Failed to set up session directory {}",
                config.base_dir.display()
            )
        })?;

        Ok(Self {
            store,
            registry: ResumeRegistry::builtin(),
            supervisor: Supervisor::new(config.grace_period),
        })
    }
}

// === Command Execution ===

/// Execute the parsed command line, returning the process exit code.
pub async fn execute(cli: Cli) -> Result<i32> {
    let config = Config::resolve(cli.base_dir)?;
    let app = App::new(&config)?;

    match cli.command {
        Commands::Run { command } => run_command(&app, &command).await,
        Commands::Resume { id } => resume_session(&app, &id).await,
        Commands::List => list_sessions(&app).map(|()| 0),
        Commands::Delete { id } => delete_session(&app, &id).map(|()| 0),
        Commands::Rules => {
            list_rules(&app);
            Ok(0)
        }
    }
}

async fn run_command(app: &App, command: &[String]) -> Result<i32> {
    let Some((program, args)) = command.split_first() else {
        bail!("A command is required");
    };

    if !round_trips(command) {
        warn!("empty or quoted arguments will not be passed unchanged on resume");
    }

    let working_directory =
        std::env::current_dir().context("Failed to get current directory")?;
    let mut record = app.store.create(join_command(command), working_directory);
    app.store
        .save(&record)
        .context("Failed to save session")?;

    println!("Starting session: {}", record.identifier);
    println!("Command: {}", record.command_line);

    let exit_code = supervise(app, &mut record, program, args).await?;

    println!(
        "\nSession {} finished with exit code: {exit_code}",
        record.identifier
    );
    Ok(exit_code)
}

async fn resume_session(app: &App, id: &str) -> Result<i32> {
    let id = app.store.resolve(id)?;
    let mut record = app
        .store
        .load(&id)
        .with_context(|| format!("Failed to load session {id}"))?;

    if !record.is_resumable() {
        println!("Session {id} is already completed");
        return Ok(0);
    }

    println!("Resuming session: {}", record.identifier);
    println!("Original command: {}", record.command_line);

    let resume_line = app.registry.resume_command(&record);
    println!("Resume command: {resume_line}");

    let tokens = tokenize(&resume_line);
    let Some((program, args)) = tokens.split_first() else {
        bail!("Invalid resume command: {resume_line:?}");
    };

    let previous = record.clone();
    record.mark_running();
    app.store
        .save(&record)
        .context("Failed to save session")?;

    let exit_code = match supervise(app, &mut record, program, args).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            if is_log_error(&e) {
                // Nothing ran; put the record back the way it was.
                if let Err(save_err) = app.store.save(&previous) {
                    error!(
                        id = %previous.identifier,
                        error = %save_err,
                        "failed to restore session"
                    );
                }
            }
            return Err(e);
        }
    };

    println!(
        "\nSession {} resumed and finished with exit code: {exit_code}",
        record.identifier
    );
    Ok(exit_code)
}

/// Run the command for `record` and persist the outcome.
async fn supervise(
    app: &App,
    record: &mut SessionRecord,
    program: &str,
    args: &[String],
) -> Result<i32> {
    let request = RunRequest::new(&record.identifier, program, &record.log_path)
        .args(args.iter().cloned())
        .working_dir(&record.working_directory);

    let report = match app.supervisor.run(&request).await {
        Ok(report) => report,
        Err(e @ SupervisorError::Log { .. }) => {
            return Err(e).context("Failed to set up session log");
        }
        Err(e) => {
            record.mark_interrupted();
            if let Err(save_err) = app.store.save(record) {
                error!(id = %record.identifier, error = %save_err, "failed to save session");
            }
            return Err(e).context("Error executing command");
        }
    };

    apply_report(record, report);
    app.store
        .save(record)
        .context("Failed to save session")?;

    if report.is_interrupted() {
        eprintln!("Error: {}", report.outcome);
    }

    info!(id = %record.identifier, status = %record.status, "session updated");
    Ok(report.exit_code)
}

fn is_log_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<SupervisorError>(),
        Some(SupervisorError::Log { .. })
    )
}

/// Map a supervisor report onto the session status.
///
/// Only a zero exit completes a session; anything else stays resumable.
fn apply_report(record: &mut SessionRecord, report: RunReport) {
    match report.outcome {
        RunOutcome::Completed if report.exit_code == 0 => record.mark_completed(0),
        RunOutcome::Completed | RunOutcome::Interrupted(_) => record.mark_interrupted(),
    }
}

fn list_sessions(app: &App) -> Result<()> {
    let sessions = app.store.load_all().context("Failed to read sessions")?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<10} {:<12} {:<50} {:<17} {}",
        "SESSION ID", "STATUS", "COMMAND", "START TIME", "WORKING DIR"
    );
    println!("{}", "-".repeat(120));

    for session in sessions {
        println!(
            "{:<10} {:<12} {:<50} {:<17} {}",
            session.short_id(),
            session.status,
            truncate_end(&session.command_line, COMMAND_WIDTH),
            session.start_time.format("%Y-%m-%d %H:%M").to_string(),
            truncate_start(&session.working_directory, DIR_WIDTH),
        );
    }

    Ok(())
}

fn delete_session(app: &App, id: &str) -> Result<()> {
    let full_id = app.store.resolve(id)?;
    app.store
        .delete(&full_id)
        .with_context(|| format!("Failed to delete session {full_id}"))?;

    println!("Session {id} deleted successfully.");
    Ok(())
}

fn list_rules(app: &App) {
    println!("Tools with resume rules:");
    for tool in app.registry.tools() {
        println!("  {tool}");
    }
}

/// Keep the head of `text`, marking the cut with "...".
fn truncate_end(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let head: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{head}...")
}

/// Keep the tail of a path, marking the cut with "...".
fn truncate_start(path: &Path, width: usize) -> String {
    let text = path.display().to_string();
    let len = text.chars().count();
    if len <= width {
        return text;
    }
    let tail: String = text.chars().skip(len - width.saturating_sub(3)).collect();
    format!("...{tail}")
}
