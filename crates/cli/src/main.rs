//! app-upload CLI - push a project to a device and restart it

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

mod cmd;
mod util;

/// Upload an application project to a device over HTTP
#[derive(Parser)]
#[command(name = "app-upload")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Device URL, `host[:port]` or `http://host[:port]` (default: $APP_UPLOAD_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Device host, overrides the one in the URL
    #[arg(long, global = true)]
    host: Option<String>,

    /// Device port, overrides the one in the URL (default: 5481)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Project directory (default: current directory)
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the project once
    Upload {
        /// Only upload files changed since the last run, tracked in FILE
        /// (default: .app-upload-state in the project)
        #[arg(long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
        incremental: Option<Option<PathBuf>>,

        /// List the files that would be uploaded and stop
        #[arg(long)]
        dry_run: bool,

        /// Don't restart the application after uploading
        #[arg(long)]
        no_restart: bool,
    },
    /// Upload every time the trigger file changes
    Watch {
        /// Trigger file (created if missing)
        file: PathBuf,

        /// Only upload files changed since the last run, tracked in FILE
        #[arg(long, value_name = "FILE", num_args = 0..=1, require_equals = true)]
        incremental: Option<Option<PathBuf>>,

        /// Don't restart the application after uploading
        #[arg(long)]
        no_restart: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let global = cmd::GlobalArgs {
        url: cli.url,
        host: cli.host,
        port: cli.port,
        project: cli.project,
    };

    match cli.command {
        Commands::Upload { incremental, dry_run, no_restart } => {
            cmd::upload::run(&global, incremental, dry_run, no_restart).await
        }
        Commands::Watch { file, incremental, no_restart } => {
            cmd::watch::run(&global, &file, incremental, no_restart).await
        }
    }
}
