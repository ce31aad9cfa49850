//! Tidemark CLI
//!
//! Operator tools for the pull cursors a tidemark client persists.
//!
//! # Commands
//!
//! - `cursor list` - Show every stored cursor
//! - `cursor show` - Show one collection's cursor
//! - `cursor check` - Flag cursors beyond the poisoning guard
//! - `cursor reset` - Move a cursor back and clear its success marker

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tidemark sync cursor tools.
#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the cursor directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and repair pull cursors
    Cursor {
        #[command(subcommand)]
        action: CursorAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CursorAction {
    /// List every stored cursor
    List {
        /// Poisoning guard, in hours
        #[arg(long, default_value_t = 5)]
        guard_hours: u32,
    },

    /// Show one collection's cursor
    Show {
        /// Collection name
        collection: String,

        /// Poisoning guard, in hours
        #[arg(long, default_value_t = 5)]
        guard_hours: u32,
    },

    /// Report cursors lying beyond the poisoning guard
    Check {
        /// Poisoning guard, in hours
        #[arg(long, default_value_t = 5)]
        guard_hours: u32,
    },

    /// Reset a cursor to some hours before now
    Reset {
        /// Collection name
        collection: String,

        /// How far back to move the cursor
        #[arg(long, default_value_t = 12)]
        hours: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Cursor { action } => {
            let path = cli.path.ok_or("Cursor directory path required")?;
            let format = cli.format.as_str();
            match action {
                CursorAction::List { guard_hours } => {
                    commands::cursor::list(&path, guard_hours, format)?;
                }
                CursorAction::Show {
                    collection,
                    guard_hours,
                } => {
                    commands::cursor::show(&path, &collection, guard_hours, format)?;
                }
                CursorAction::Check { guard_hours } => {
                    commands::cursor::check(&path, guard_hours, format)?;
                }
                CursorAction::Reset { collection, hours } => {
                    commands::cursor::reset(&path, &collection, hours)?;
                }
            }
        }
        Commands::Version => {
            println!("Tidemark CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
