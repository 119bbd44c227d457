//! SQLite persistence for blocking rules and the blocked-call log.

pub mod call_log;
pub mod rule_store;

pub use call_log::{BlockedCallRecord, CallLogStore};
pub use rule_store::{MemoryRuleStore, RuleStore, SqliteRuleStore};

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Opens a database file, creating its parent directory when needed.
pub(crate) fn open_database(db_path: &str) -> Result<Connection> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database: {db_path}"))?;
    // Rule edits from the CLI and screenings may hit the same file
    conn.busy_timeout(std::time::Duration::from_millis(500))?;
    Ok(conn)
}

pub(crate) fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| anyhow!("database connection lock poisoned"))
}
