mod commands;

use clap::{Parser, Subcommand};
use git_cipher::error::Result;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "git-cipher")]
#[command(version = "0.1.0")]
#[command(about = "Transparent, tamper-evident file encryption in git", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate secrets and configure git-cipher in the current repository
    Init,

    /// Mark files for encryption
    Add {
        /// Files to manage
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Unlock the repository (decrypt files)
    Unlock {
        /// Proceed even with uncommitted changes
        #[arg(short, long)]
        force: bool,
    },

    /// Lock the repository (show encrypted content)
    Lock {
        /// Proceed even with uncommitted changes
        #[arg(short, long)]
        force: bool,
    },

    /// Show lock state and managed files
    Ls,

    /// Clean filter (used internally by git)
    Clean {
        /// Path of the file relative to the top-level
        path: String,
    },

    /// Smudge filter (used internally by git)
    Smudge {
        /// Path of the file relative to the top-level
        path: String,
    },

    /// Diff textconv (used internally by git)
    Textconv {
        /// File to read instead of stdin
        file: Option<PathBuf>,
    },

    /// Merge driver (used internally by git)
    Merge {
        base: PathBuf,
        ours: PathBuf,
        theirs: PathBuf,
        marker_size: usize,
        path: String,
    },
}

fn main() {
    init_tracing();

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Diagnostics go to stderr; stdout carries filter output.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("GIT_CIPHER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init()?,
        Commands::Add { paths } => commands::add(&paths)?,
        Commands::Unlock { force } => commands::unlock(force)?,
        Commands::Lock { force } => commands::lock(force)?,
        Commands::Ls => commands::ls()?,
        Commands::Clean { path } => commands::clean(&path)?,
        Commands::Smudge { path } => commands::smudge(&path)?,
        Commands::Textconv { file } => commands::textconv(file.as_deref())?,
        Commands::Merge {
            base,
            ours,
            theirs,
            marker_size,
            path,
        } => return commands::merge(&base, &ours, &theirs, marker_size, &path),
    }

    Ok(0)
}
