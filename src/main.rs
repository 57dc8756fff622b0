//! Backup Engine - Command-line front end
//!
//! Thin presentation layer over the reconciliation engine: argument
//! parsing, interactive prompts for missing flags, a single-line progress
//! display and exit-code mapping.

use backup_engine::{
    BackupEngine, BackupError, BackupMode, BackupProgress, BackupRequest, BackupResult, Config,
};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_BAD_MODE: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about = "Directory-tree backup tool", long_about = None)]
struct Args {
    /// Source directory to back up
    #[arg(long)]
    source: Option<String>,

    /// Destination directory
    #[arg(long)]
    dest: Option<String>,

    /// Backup mode: sync, add or remove
    #[arg(long)]
    mode: Option<String>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {e}", path.display());
                return EXIT_ERROR;
            }
        },
        None => Config::default(),
    };

    // CLI flag wins over the config file; RUST_LOG wins over both
    init_logging(args.log_level.as_deref().unwrap_or(&config.log.level));

    // Missing flags are filled interactively
    let mode_input = match args.mode {
        Some(mode) => mode,
        None => prompt("Mode (sync/add/remove): "),
    };
    let mode: BackupMode = match mode_input.parse() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_BAD_MODE;
        }
    };
    let source = args.source.unwrap_or_else(|| prompt("Source directory: "));
    let destination = args.dest.unwrap_or_else(|| prompt("Destination directory: "));

    println!(
        "backup-engine v{} - {} mode",
        env!("CARGO_PKG_VERSION"),
        mode
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel::<BackupProgress>();
    let render_task = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(sample) = progress_rx.recv().await {
            let _ = write!(
                stdout,
                "\r{}: {}/{} ({:.0}%)   ",
                sample.phase,
                sample.processed,
                sample.total,
                sample.percent()
            );
            let _ = stdout.flush();
        }
        let _ = writeln!(stdout);
    });

    let request = BackupRequest {
        source,
        destination,
        mode,
    };
    let engine = BackupEngine::new(config.backup);
    let started = Instant::now();
    let outcome = engine.execute(&request, Some(&progress_tx), &cancel).await;

    drop(progress_tx);
    let _ = render_task.await;

    match outcome {
        Ok(result) => {
            print_tally(&result, started.elapsed().as_secs());
            EXIT_OK
        }
        Err(BackupError::Cancelled) => {
            eprintln!("Backup cancelled");
            EXIT_CANCELLED
        }
        Err(e) => {
            eprintln!("Backup failed: {e}");
            EXIT_ERROR
        }
    }
}

fn print_tally(result: &BackupResult, elapsed_secs: u64) {
    println!(
        "Done in {}: {} directories created, {} files copied, {} files overwritten, \
         {} files deleted, {} directories deleted",
        backup_engine::transfer::progress::format_duration(elapsed_secs),
        result.dirs_created,
        result.files_copied,
        result.files_overwritten,
        result.files_deleted,
        result.dirs_deleted
    );
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn prompt(message: &str) -> String {
    print!("{message}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}
