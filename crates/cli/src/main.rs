use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use colored::Colorize;
use ek_core::backend::{EnrichmentBackend, HttpBackend};
use ek_core::config::loader::{load_config, CONFIG_DIR};
use ek_core::config::models::AppConfig;
use ek_protocol::{HistoryEntry, ProgressBasis, SharedProcessRecord, StepName, ViewRole};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "enrich.log";

/// Track AI enrichment jobs running against Google Sheets.
#[derive(Parser, Debug)]
#[command(name = "enrich", version, about)]
struct Cli {
    /// Project root holding the `.enrich-kit/` directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch and follow jobs (the default).
    Home,
    /// Follow jobs launched from the home view.
    Monitor,
    /// List recorded job outcomes.
    History(HistoryArgs),
    /// List the process records views have shared with the backend.
    Processes {
        /// Print raw JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// List the enrichment steps and their prompt overrides.
    Steps,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Number of entries to fetch; defaults to `history_limit` from config.toml.
    #[arg(long)]
    limit: Option<u32>,

    /// Only entries for this sheet.
    #[arg(long)]
    sheet: Option<String>,

    /// Print raw JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Group entries by sheet; lists everything the backend stored.
    #[arg(long, conflicts_with_all = ["limit", "sheet"])]
    grouped: bool,

    /// Delete every recorded entry.
    #[arg(long, conflicts_with_all = ["limit", "sheet", "json", "grouped"])]
    clear: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Home) {
        Command::Home => run_view(ViewRole::Home, &cli.root).await,
        Command::Monitor => run_view(ViewRole::Monitor, &cli.root).await,
        Command::History(args) => {
            init_stderr_logging();
            let config = load(&cli.root).await?;
            show_history(&config, args).await
        }
        Command::Processes { json } => {
            init_stderr_logging();
            let config = load(&cli.root).await?;
            show_processes(&config, json).await
        }
        Command::Steps => {
            init_stderr_logging();
            let config = load(&cli.root).await?;
            show_steps(&config);
            Ok(())
        }
    }
}

async fn run_view(role: ViewRole, root: &Path) -> Result<()> {
    init_file_logging(root)?;
    ek_tui::run_app(role, root)
        .await
        .map_err(|e| eyre!("{e:#}"))
}

async fn load(root: &Path) -> Result<AppConfig> {
    load_config(root)
        .await
        .wrap_err_with(|| format!("failed to load {}", root.join(CONFIG_DIR).display()))
}

/// The terminal belongs to the TUI, so logs go to `.enrich-kit/enrich.log`.
fn init_file_logging(root: &Path) -> Result<()> {
    let dir = root.join(CONFIG_DIR);
    fs::create_dir_all(&dir).wrap_err("failed to create log directory")?;
    let file = File::options()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))
        .wrap_err("failed to open log file")?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

async fn show_history(config: &AppConfig, args: HistoryArgs) -> Result<()> {
    let backend = HttpBackend::new(&config.global.backend)?;
    let base_url = &config.global.backend.base_url;

    if args.clear {
        backend
            .clear_history()
            .await
            .wrap_err_with(|| format!("could not clear history on {base_url}"))?;
        println!("{}", "History cleared.".green());
        return Ok(());
    }

    if args.grouped {
        let grouped = backend
            .list_history_grouped()
            .await
            .wrap_err_with(|| format!("could not fetch history from {base_url}"))?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&grouped)?);
        } else if grouped.is_empty() {
            println!("{}", "No history recorded yet.".dimmed());
        } else {
            for (sheet, entries) in &grouped {
                println!("{} {}", sheet.bold(), format!("({})", entries.len()).dimmed());
                for entry in entries {
                    println!("  {}", history_line(entry));
                }
            }
        }
        return Ok(());
    }

    let limit = args.limit.unwrap_or(config.global.history_limit);
    let entries = backend
        .list_history(limit, args.sheet.as_deref())
        .await
        .wrap_err_with(|| format!("could not fetch history from {base_url}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{}", "No history recorded yet.".dimmed());
        return Ok(());
    }
    for entry in &entries {
        println!("{}", history_line(entry));
    }
    Ok(())
}

fn history_line(entry: &HistoryEntry) -> String {
    let message = if entry.message.contains("failed") {
        entry.message.red()
    } else if entry.message.contains("cancelled") {
        entry.message.yellow()
    } else {
        entry.message.normal()
    };
    format!(
        "{}  {:<20} {:>8}  {}",
        entry.timestamp.dimmed(),
        entry.sheet_name.bold(),
        entry.time,
        message
    )
}

async fn show_processes(config: &AppConfig, json: bool) -> Result<()> {
    let backend = HttpBackend::new(&config.global.backend)?;
    let base_url = &config.global.backend.base_url;
    let records = backend
        .list_shared_processes()
        .await
        .wrap_err_with(|| format!("could not fetch processes from {base_url}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("{}", "No processes shared in the last day.".dimmed());
        return Ok(());
    }

    let connected = backend
        .list_active_sessions()
        .await
        .wrap_err_with(|| format!("could not fetch active sessions from {base_url}"))?;
    for record in &records {
        let live = connected.contains(&record.session_id);
        println!("{}", process_line(record, live));
    }
    Ok(())
}

fn process_line(record: &SharedProcessRecord, live: bool) -> String {
    let state = if record.is_completed {
        "completed".green()
    } else if record.is_active && live {
        "running".cyan()
    } else if record.is_active {
        "no channel".yellow()
    } else {
        "stopped".dimmed()
    };
    format!(
        "{:<34} {:<20} {:>5.1}%  {}",
        record.step_name.as_str(),
        record.sheet_name.bold(),
        record.progress,
        state
    )
}

fn show_steps(config: &AppConfig) {
    for step in StepName::ALL {
        let basis = match step.progress_basis() {
            ProgressBasis::ProcessedRows => "all rows",
            ProgressBasis::EmptyRows => "empty rows",
        };
        let prompt = if config.prompt_for(step).is_some() {
            "custom prompt".green()
        } else {
            "default prompt".dimmed()
        };
        println!(
            "{:<14} {:<34} {:<11} {}",
            step.slug().cyan(),
            step.as_str(),
            basis,
            prompt
        );
    }
}
