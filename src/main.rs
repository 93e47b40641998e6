//! veld - batch file operations for the terminal.
//!
//! Usage:
//!   veld copy <SOURCES>... --to <DIR>     Copy entries into a directory
//!   veld move <SOURCES>... --to <DIR>     Move entries into a directory
//!   veld delete <PATHS>... [--yes]        Delete entries after confirming
//!   veld rename <PATH> <NAME>             Rename an entry in place
//!   veld mkdir <NAME> [--in DIR]          Create a directory
//!   veld batch                            Queue deletes and copies, run them with `w`
//!   veld archive <SOURCES>... [--to FILE] Pack entries into a zip or tar archive
//!   veld extract <ARCHIVE> [--to DIR]     Unpack an archive
//!   veld keys [--init]                    Show key bindings

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tracing_subscriber::EnvFilter;

use veld_core::{
    Action, ConfigError, KeyBindings, Notification, OpsConfig, Panel, PathEntry, Settings,
    Severity, ViewId,
};
use veld_ops::{
    ActionReport, BatchKind, BatchRequest, BatchWorker, ConflictResolution, DeferredActionLog,
    LocalFs, OperationKind, RefreshBroadcaster, ResolutionRequest, WorkerMessage, confirmed,
    create_archive, create_directory, default_archive_path, delete_prompt, delete_selection,
    extract_archive, rename_entry,
};

#[derive(Parser)]
#[command(
    name = "veld",
    version,
    about = "Batch file operations with conflict prompts",
    long_about = "veld moves, copies, deletes and archives files in batches.\n\n\
                  Name collisions are resolved one item at a time: replace the \
                  existing entry, keep both under a numbered name, or skip."
)]
struct Cli {
    /// Send deleted entries to the system trash
    #[arg(long, global = true)]
    trash: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy entries into a directory
    Copy {
        /// Entries to copy
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination directory
        #[arg(short, long)]
        to: PathBuf,

        /// How to handle name collisions
        #[arg(long, default_value = "ask")]
        on_conflict: OnConflict,
    },

    /// Move entries into a directory
    Move {
        /// Entries to move
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Destination directory
        #[arg(short, long)]
        to: PathBuf,

        /// How to handle name collisions
        #[arg(long, default_value = "ask")]
        on_conflict: OnConflict,
    },

    /// Delete entries after confirmation
    Delete {
        /// Entries to delete
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Do not ask before deleting
        #[arg(short, long)]
        yes: bool,
    },

    /// Rename an entry within its directory
    Rename {
        /// Entry to rename
        path: PathBuf,

        /// New name
        name: String,
    },

    /// Create a directory
    Mkdir {
        /// Name of the new directory
        name: String,

        /// Parent directory (defaults to the working directory)
        #[arg(long = "in", value_name = "DIR")]
        parent: Option<PathBuf>,
    },

    /// Queue deletes and copies from stdin and run them together
    Batch,

    /// Pack entries into an archive (.zip, .tar, .tar.gz)
    Archive {
        /// Entries to archive
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// Archive file (defaults to <name>.zip or archive.zip next to the first entry)
        #[arg(short, long)]
        to: Option<PathBuf>,
    },

    /// Unpack an archive
    Extract {
        /// Archive to unpack
        archive: PathBuf,

        /// Destination directory (defaults to the archive's directory)
        #[arg(short, long)]
        to: Option<PathBuf>,
    },

    /// Show the configured key bindings
    Keys {
        /// Write the default configuration file if none exists
        #[arg(long)]
        init: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OnConflict {
    #[default]
    Ask,
    Replace,
    Duplicate,
    Skip,
}

impl OnConflict {
    fn fixed(self) -> Option<ConflictResolution> {
        match self {
            Self::Ask => None,
            Self::Replace => Some(ConflictResolution::Replace),
            Self::Duplicate => Some(ConflictResolution::Duplicate),
            Self::Skip => Some(ConflictResolution::Skip),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load();
    let config = ops_config(&settings.operations, cli.trash)?;

    match cli.command {
        Command::Copy {
            sources,
            to,
            on_conflict,
        } => run_transfer(BatchKind::Copy, sources, to, on_conflict, config),
        Command::Move {
            sources,
            to,
            on_conflict,
        } => run_transfer(BatchKind::Move, sources, to, on_conflict, config),
        Command::Delete { paths, yes } => run_delete(&paths, yes, config.use_trash),
        Command::Rename { path, name } => run_rename(&path, &name),
        Command::Mkdir { name, parent } => run_mkdir(&name, parent),
        Command::Batch => run_deferred(&settings.keybindings, &config),
        Command::Archive { sources, to } => run_archive(&sources, to),
        Command::Extract { archive, to } => run_extract(&archive, to),
        Command::Keys { init, format } => run_keys(&settings, init, format),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();
}

/// Settings from the file, with command-line overrides applied.
fn ops_config(file: &OpsConfig, trash: bool) -> Result<OpsConfig> {
    let config = OpsConfig::builder()
        .max_duplicate_attempts(file.max_duplicate_attempts)
        .channel_size(file.channel_size)
        .use_trash(file.use_trash || trash)
        .build()?;
    Ok(config)
}

fn working_dir() -> Result<PathBuf> {
    std::env::current_dir().context("No working directory")
}

fn print_notification(notification: &Notification) {
    match notification.severity {
        Severity::Info => println!("{}", notification.message),
        Severity::Warning | Severity::Error => eprintln!("{notification}"),
    }
}

/// Run a move or copy batch through the background worker.
fn run_transfer(
    kind: BatchKind,
    sources: Vec<PathBuf>,
    to: PathBuf,
    on_conflict: OnConflict,
    config: OpsConfig,
) -> Result<()> {
    // The sources are selected in a view of the working directory; the
    // destination gets a view of its own.
    let mut panels = vec![
        Panel::new(ViewId(0), working_dir()?),
        Panel::new(ViewId(1), std::path::absolute(&to)?),
    ];
    for source in &sources {
        panels[0].select(PathEntry::resolve(source)?);
    }
    let request = BatchRequest::new(kind, panels[0].selection().paths(), to);

    let rt = tokio::runtime::Runtime::new()?;
    let success = rt.block_on(drive_batch(request, on_conflict, config, &mut panels))?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}

async fn drive_batch(
    request: BatchRequest,
    on_conflict: OnConflict,
    config: OpsConfig,
    panels: &mut [Panel],
) -> Result<bool> {
    let (mut worker, mut rx) = BatchWorker::local(config);
    worker.submit(request)?;

    while let Some(message) = rx.recv().await {
        match message {
            WorkerMessage::ItemApplied(outcome) => print_notification(&outcome.notification()),
            WorkerMessage::ConflictRequest(pending) => {
                let resolution = match on_conflict.fixed() {
                    Some(resolution) => resolution,
                    None => ask(pending.request()).await?,
                };
                worker.resume(pending, resolution);
            }
            WorkerMessage::BatchDone(report) => {
                print_notification(&report.notification());
                RefreshBroadcaster.batch_finished(panels, Some(ViewId(0)), &report);
                return Ok(report.is_success());
            }
        }
    }

    bail!("Batch worker stopped without reporting")
}

/// Prompt on stderr and read one answer from stdin.
async fn ask(request: &ResolutionRequest) -> Result<ConflictResolution> {
    let prompt = request.prompt();
    let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
        eprint!("{prompt} ");
        io::stderr().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .context("Prompt task failed")?
    .context("Failed to read answer")?;

    Ok(ConflictResolution::from_choice(&answer))
}

/// Print every outcome; exit non-zero if any failed.
fn finish_report(report: &ActionReport) -> Result<()> {
    for notification in report.notifications() {
        print_notification(&notification);
    }
    if report.failed() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_delete(paths: &[PathBuf], yes: bool, use_trash: bool) -> Result<()> {
    let mut panels = vec![Panel::new(ViewId(0), working_dir()?)];
    for path in paths {
        panels[0].select(PathEntry::resolve(path)?);
    }

    if !yes {
        eprint!("{} ", delete_prompt(panels[0].selection().len()));
        io::stderr().flush()?;
        let mut answer = String::new();
        io::stdin()
            .read_line(&mut answer)
            .context("Failed to read answer")?;
        if !confirmed(&answer) {
            eprintln!("Nothing deleted.");
            return Ok(());
        }
    }

    let report = delete_selection(&LocalFs, &mut panels, ViewId(0), use_trash);
    finish_report(&report)
}

fn run_rename(path: &Path, name: &str) -> Result<()> {
    let entry = PathEntry::resolve(path)?;
    let mut panels = vec![Panel::new(ViewId(0), working_dir()?)];
    let report = rename_entry(&LocalFs, &mut panels, &entry, name);
    finish_report(&report)
}

fn run_mkdir(name: &str, parent: Option<PathBuf>) -> Result<()> {
    let cwd = working_dir()?;
    let parent = match parent {
        Some(dir) => std::path::absolute(dir)?,
        None => cwd.clone(),
    };
    let mut panels = vec![Panel::new(ViewId(0), cwd)];
    let report = create_directory(&LocalFs, &mut panels, &parent, name);
    finish_report(&report)
}

/// Line-driven deferred action log over the current directory.
///
/// Besides the built-in command words, keys bound to delete, copy, move and
/// quit in the configuration are accepted.
fn run_deferred(keys: &KeyBindings, config: &OpsConfig) -> Result<()> {
    let cwd = working_dir()?;
    let mut panels = vec![Panel::new(ViewId(0), &cwd)];
    let mut log = DeferredActionLog::new(config.use_trash);

    eprintln!(
        "Commands: delete|d|{} <path>..., copy|y <path>... <dir>, list, w, c, q",
        keys.key(Action::DeleteSelected)
    );
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read command")?;
        let mut words = line.trim().trim_start_matches(':').split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let args: Vec<&str> = words.collect();

        match (command, keys.action_for(command)) {
            ("list" | "l", _) => {
                for line in log.lines() {
                    println!("{line}");
                }
            }
            ("w", _) => {
                let report = log.execute_all(&LocalFs, &mut panels);
                for notification in report.notifications() {
                    print_notification(&notification);
                }
            }
            ("c", _) => {
                log.clear();
                println!("Cleared queued actions");
            }
            ("q", _) | (_, Some(Action::Quit)) => break,
            ("delete" | "d", _) | (_, Some(Action::DeleteSelected)) => {
                queue(&mut log, &mut panels[0], OperationKind::Delete, &args, None)
            }
            ("copy" | "y", _) | (_, Some(Action::CopySelected)) => match args.split_last() {
                Some((dest, paths)) if !paths.is_empty() => queue(
                    &mut log,
                    &mut panels[0],
                    OperationKind::Copy,
                    paths,
                    Some(cwd.join(dest).as_path()),
                ),
                _ => print_notification(&Notification::warning("Usage: copy <path>... <dir>")),
            },
            ("move" | "m", _) | (_, Some(Action::MoveSelected)) => print_notification(
                &Notification::warning("Move is not supported for deferred actions"),
            ),
            (other, _) => {
                print_notification(&Notification::warning(format!("Unknown command: {other}")))
            }
        }
    }

    if !log.is_empty() {
        print_notification(&Notification::warning(format!(
            "Discarded {} queued actions",
            log.len()
        )));
    }
    Ok(())
}

fn queue(
    log: &mut DeferredActionLog,
    panel: &mut Panel,
    kind: OperationKind,
    paths: &[&str],
    destination: Option<&Path>,
) {
    for path in paths {
        match PathEntry::resolve(path) {
            Ok(entry) => {
                panel.select(entry);
            }
            Err(e) => print_notification(&Notification::error(format!("{path}: {e}"))),
        }
    }

    match log.queue_selection(panel, kind, destination) {
        Ok(count) => {
            let noun = match kind {
                OperationKind::Delete => "deletion",
                _ => "copy",
            };
            println!("Queued {noun} of {count} items.");
        }
        Err(e) => {
            panel.selection_mut().clear();
            print_notification(&Notification::error(e.to_string()));
        }
    }
}

fn run_archive(sources: &[PathBuf], to: Option<PathBuf>) -> Result<()> {
    let entries = sources
        .iter()
        .map(PathEntry::resolve)
        .collect::<Result<Vec<_>, _>>()?;
    let target = match to {
        Some(path) => std::path::absolute(path)?,
        None => {
            let dir = entries
                .first()
                .and_then(PathEntry::parent)
                .map(Path::to_path_buf)
                .unwrap_or_default();
            default_archive_path(&entries, &dir)
        }
    };

    let summary = create_archive(&entries, &target).wrap_err("Error creating archive")?;
    let name = target.file_name().unwrap_or_default().to_string_lossy();
    println!(
        "Created archive '{name}' ({} entries, {} bytes).",
        summary.entries, summary.bytes
    );
    Ok(())
}

fn run_extract(archive: &Path, to: Option<PathBuf>) -> Result<()> {
    let archive = std::path::absolute(archive)?;
    let destination = match to {
        Some(path) => std::path::absolute(path)?,
        None => archive.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let summary = extract_archive(&archive, &destination).wrap_err("Error extracting archive")?;
    for name in &summary.rejected {
        print_notification(&Notification::warning(format!("Skipped unsafe entry {name}")));
    }
    println!("Extracted to '{}'.", destination.display());
    Ok(())
}

fn run_keys(settings: &Settings, init: bool, format: OutputFormat) -> Result<()> {
    if init {
        let path = Settings::config_path().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            eprintln!("{} already exists", path.display());
        } else {
            Settings::write_default(&path)?;
            eprintln!("Wrote {}", path.display());
        }
    }

    match format {
        OutputFormat::Text => {
            for (action, key) in settings.keybindings.iter() {
                println!("{:<24} {:<10} {}", action.as_ref(), key, action.description());
            }
        }
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = settings
                .keybindings
                .iter()
                .map(|(action, key)| (action.as_ref().to_string(), key.into()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trash_flag_overrides_file_settings() {
        let file = OpsConfig {
            max_duplicate_attempts: 7,
            ..OpsConfig::default()
        };

        let config = ops_config(&file, true).unwrap();
        assert!(config.use_trash);
        assert_eq!(config.max_duplicate_attempts, 7);
        assert_eq!(ops_config(&file, false).unwrap(), file);
    }

    #[test]
    fn test_parse_delete_and_mkdir() {
        let cli = Cli::try_parse_from(["veld", "delete", "a", "b", "--yes", "--trash"]).unwrap();
        assert!(cli.trash);
        assert!(matches!(cli.command, Command::Delete { ref paths, yes: true } if paths.len() == 2));

        let cli = Cli::try_parse_from(["veld", "mkdir", "new", "--in", "/tmp"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Mkdir { ref name, parent: Some(_) } if name == "new"
        ));
    }
}
