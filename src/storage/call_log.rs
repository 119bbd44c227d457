use super::{lock, open_database};
use anyhow::Result;
use chrono::{Duration as ChronoDuration, Local, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// One blocked call, as shown to the user in the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedCallRecord {
    /// Assigned by the store; zero until inserted.
    pub id: i64,
    pub phone_number: String,
    /// Matched prefix, or the label of the policy that blocked the call.
    pub matched_reason: String,
    pub timestamp_millis: i64,
    pub contact_name: Option<String>,
}

impl BlockedCallRecord {
    pub fn new(
        phone_number: impl Into<String>,
        matched_reason: impl Into<String>,
        contact_name: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            phone_number: phone_number.into(),
            matched_reason: matched_reason.into(),
            timestamp_millis: Utc::now().timestamp_millis(),
            contact_name,
        }
    }
}

/// Append-only blocked-call log. Records are never updated, only deleted.
#[derive(Clone)]
pub struct CallLogStore {
    conn: Arc<Mutex<Connection>>,
}

impl CallLogStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_database(db_path)?;
        Self::init_database(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_database(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_database(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocked_calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone_number TEXT NOT NULL,
                matched_prefix TEXT NOT NULL,
                blocked_at INTEGER NOT NULL,
                contact_name TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_blocked_calls_blocked_at ON blocked_calls (blocked_at)",
            [],
        )?;
        Ok(())
    }

    pub fn insert(&self, record: &BlockedCallRecord) -> Result<i64> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO blocked_calls (phone_number, matched_prefix, blocked_at, contact_name)
             VALUES (?, ?, ?, ?)",
            params![
                record.phone_number,
                record.matched_reason,
                record.timestamp_millis,
                record.contact_name
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<BlockedCallRecord>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, phone_number, matched_prefix, blocked_at, contact_name
             FROM blocked_calls ORDER BY blocked_at DESC, id DESC LIMIT ?",
        )?;
        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(BlockedCallRecord {
                    id: row.get(0)?,
                    phone_number: row.get(1)?,
                    matched_reason: row.get(2)?,
                    timestamp_millis: row.get(3)?,
                    contact_name: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count(&self) -> Result<u64> {
        let conn = lock(&self.conn)?;
        let count = conn.query_row("SELECT COUNT(*) FROM blocked_calls", [], |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(count as u64)
    }

    pub fn count_since(&self, since_millis: i64) -> Result<u64> {
        let conn = lock(&self.conn)?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM blocked_calls WHERE blocked_at >= ?",
            params![since_millis],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count as u64)
    }

    pub fn count_today(&self) -> Result<u64> {
        self.count_since(start_of_today_millis())
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute("DELETE FROM blocked_calls WHERE id = ?", params![id])?;
        Ok(removed > 0)
    }

    pub fn clear_all(&self) -> Result<usize> {
        let conn = lock(&self.conn)?;
        Ok(conn.execute("DELETE FROM blocked_calls", [])?)
    }

    pub fn delete_older_than(&self, cutoff_millis: i64) -> Result<usize> {
        let conn = lock(&self.conn)?;
        Ok(conn.execute(
            "DELETE FROM blocked_calls WHERE blocked_at < ?",
            params![cutoff_millis],
        )?)
    }

    /// Removes records older than `days` days. Returns how many went.
    ///
    /// A cutoff before the earliest representable time prunes nothing.
    pub fn prune_older_than_days(&self, days: u32) -> Result<usize> {
        let cutoff = ChronoDuration::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => self.delete_older_than(cutoff.timestamp_millis()),
            None => {
                log::debug!("Retention of {days} days reaches past any record, nothing pruned");
                Ok(0)
            }
        }
    }
}

/// Local midnight, in epoch milliseconds.
pub fn start_of_today_millis() -> i64 {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.timestamp_millis())
        // Midnight can be skipped by a DST change; fall back to a rolling day
        .unwrap_or_else(|| (now - ChronoDuration::days(1)).timestamp_millis())
}
