//! Cursor command implementations.

use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tidemark_engine::{FileCursorStore, SyncError};
use tidemark_protocol::{Cursor, Timestamp};
use tracing::{info, warn};

/// Errors reported by the cursor commands.
#[derive(Debug, Error)]
pub enum CursorCommandError {
    /// No cursor is stored for the collection.
    #[error("no cursor stored for collection '{0}'")]
    NotFound(String),

    /// `check` found poisoned cursors.
    #[error("{0} poisoned cursor(s) found")]
    Poisoned(usize),

    /// Reading or writing the cursor store failed.
    #[error(transparent)]
    Store(#[from] SyncError),

    /// Output could not be rendered.
    #[error("failed to render output: {0}")]
    Render(#[from] serde_json::Error),
}

/// Printable view of a stored cursor.
#[derive(Debug, Serialize)]
pub struct CursorView {
    /// Collection name.
    pub collection: String,
    /// Watermark timestamp, RFC 3339.
    pub last_seen: String,
    /// Watermark id.
    pub last_seen_id: String,
    /// Last successful pull, RFC 3339.
    pub last_success: Option<String>,
    /// The watermark lies beyond the guard window.
    pub poisoned: bool,
}

impl CursorView {
    fn new(collection: &str, cursor: &Cursor, now: Timestamp, guard: Duration) -> Self {
        Self {
            collection: collection.to_string(),
            last_seen: cursor.last_seen.to_string(),
            last_seen_id: cursor.last_seen_id.clone(),
            last_success: cursor.last_success.map(|at| at.to_string()),
            poisoned: cursor.is_poisoned(now, guard),
        }
    }
}

const SECS_PER_HOUR: u64 = 3600;

fn guard_window(hours: u32) -> Duration {
    Duration::from_secs(u64::from(hours) * SECS_PER_HOUR)
}

/// How far behind now a reset cursor lands.
fn reset_offset(hours: u32) -> Duration {
    Duration::from_secs(u64::from(hours) * SECS_PER_HOUR)
}

fn open(path: &Path) -> Result<FileCursorStore, CursorCommandError> {
    Ok(FileCursorStore::open(path)?)
}

fn print_views(views: &[CursorView], format: &str) -> Result<(), CursorCommandError> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(views)?),
        _ => {
            if views.is_empty() {
                println!("No cursors stored.");
            }
            for view in views {
                print_text(view);
            }
        }
    }
    Ok(())
}

fn print_text(view: &CursorView) {
    println!("{}", view.collection);
    println!("  last seen:    {}", view.last_seen);
    if !view.last_seen_id.is_empty() {
        println!("  last seen id: {}", view.last_seen_id);
    }
    println!(
        "  last success: {}",
        view.last_success.as_deref().unwrap_or("never")
    );
    if view.poisoned {
        println!("  POISONED: beyond the guard window");
    }
}

/// Lists every stored cursor.
pub fn list(path: &Path, guard_hours: u32, format: &str) -> Result<(), CursorCommandError> {
    let views = collect(path, guard_hours)?;
    print_views(&views, format)
}

/// Shows one collection's cursor.
pub fn show(
    path: &Path,
    collection: &str,
    guard_hours: u32,
    format: &str,
) -> Result<(), CursorCommandError> {
    let store = open(path)?;
    let cursor = store
        .load_sync(collection)?
        .ok_or_else(|| CursorCommandError::NotFound(collection.to_string()))?;
    let view = CursorView::new(collection, &cursor, Timestamp::now(), guard_window(guard_hours));
    print_views(std::slice::from_ref(&view), format)
}

/// Reports poisoned cursors. Fails if there is at least one.
pub fn check(path: &Path, guard_hours: u32, format: &str) -> Result<(), CursorCommandError> {
    let poisoned: Vec<CursorView> = collect(path, guard_hours)?
        .into_iter()
        .filter(|view| view.poisoned)
        .collect();
    for view in &poisoned {
        warn!(collection = %view.collection, last_seen = %view.last_seen, "poisoned cursor");
    }
    if poisoned.is_empty() && format != "json" {
        println!("All cursors are within the {guard_hours}h guard window.");
        return Ok(());
    }
    print_views(&poisoned, format)?;
    if poisoned.is_empty() {
        Ok(())
    } else {
        Err(CursorCommandError::Poisoned(poisoned.len()))
    }
}

/// Resets a cursor to `hours` before now with no recorded success.
///
/// The next pull of the collection then uses the extended overlap window.
pub fn reset(path: &Path, collection: &str, hours: u32) -> Result<(), CursorCommandError> {
    let store = FileCursorStore::open_with_create_dirs(path)?;
    let previous = store.load_sync(collection)?;
    let cursor = reset_cursor(Timestamp::now(), hours);
    store.save_sync(collection, &cursor)?;

    info!(
        collection,
        previous = ?previous.map(|c| c.last_seen.to_string()),
        reset_to = %cursor.last_seen,
        "cursor reset"
    );
    println!("Reset '{collection}' to {}", cursor.last_seen);
    Ok(())
}

fn reset_cursor(now: Timestamp, hours: u32) -> Cursor {
    Cursor::new(now.saturating_sub(reset_offset(hours)), "")
}

fn collect(path: &Path, guard_hours: u32) -> Result<Vec<CursorView>, CursorCommandError> {
    let store = open(path)?;
    let now = Timestamp::now();
    let guard = guard_window(guard_hours);
    Ok(store
        .list_sync()?
        .iter()
        .map(|(collection, cursor)| CursorView::new(collection, cursor, now, guard))
        .collect())
}
