use super::{lock, open_database};
use crate::rules::{
    normalize_country_code, normalize_description, normalize_prefix, BlockedPrefix, RuleError,
    RuleSnapshot, DEFAULT_HOME_COUNTRY_CODE,
};
use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, RwLock};

/// Source of rule snapshots for the screening path.
pub trait RuleStore: Send + Sync {
    /// All toggles and the prefix list from one coherent state.
    fn snapshot(&self) -> Result<RuleSnapshot>;
}

pub struct SqliteRuleStore {
    conn: Mutex<Connection>,
}

impl SqliteRuleStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_database(db_path)?;
        Self::init_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_database(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocking_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                block_unknown INTEGER NOT NULL DEFAULT 0,
                block_all INTEGER NOT NULL DEFAULT 0,
                block_international INTEGER NOT NULL DEFAULT 0,
                user_country_code TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocked_prefixes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                prefix TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO blocking_settings (id, user_country_code) VALUES (1, ?)",
            params![DEFAULT_HOME_COUNTRY_CODE],
        )?;

        Ok(())
    }

    fn read_snapshot(conn: &Connection) -> Result<RuleSnapshot> {
        let settings = conn
            .query_row(
                "SELECT block_all, block_unknown, block_international, user_country_code
                 FROM blocking_settings WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, bool>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let mut snapshot = match settings {
            Some((block_all, block_unknown, block_international, home_country_code)) => {
                RuleSnapshot {
                    block_all,
                    block_unknown,
                    block_international,
                    home_country_code,
                    blocked_prefixes: Vec::new(),
                }
            }
            None => RuleSnapshot::permissive(),
        };

        let mut stmt = conn.prepare("SELECT prefix FROM blocked_prefixes ORDER BY id ASC")?;
        snapshot.blocked_prefixes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(snapshot)
    }

    pub fn set_block_all(&self, enabled: bool) -> Result<()> {
        self.set_toggle("block_all", enabled)
    }

    pub fn set_block_unknown(&self, enabled: bool) -> Result<()> {
        self.set_toggle("block_unknown", enabled)
    }

    pub fn set_block_international(&self, enabled: bool) -> Result<()> {
        self.set_toggle("block_international", enabled)
    }

    fn set_toggle(&self, column: &'static str, enabled: bool) -> Result<()> {
        let conn = lock(&self.conn)?;
        conn.execute(
            &format!("UPDATE blocking_settings SET {column} = ? WHERE id = 1"),
            params![enabled],
        )?;
        log::info!("Setting {column} = {enabled}");
        Ok(())
    }

    pub fn set_home_country_code(&self, code: &str) -> Result<String> {
        let code = normalize_country_code(code)?;
        let conn = lock(&self.conn)?;
        conn.execute(
            "UPDATE blocking_settings SET user_country_code = ? WHERE id = 1",
            params![code],
        )?;
        log::info!("Home country code set to {code}");
        Ok(code)
    }

    /// Appends a prefix to the end of the evaluation order.
    pub fn add_prefix(&self, prefix: &str, description: Option<&str>) -> Result<BlockedPrefix> {
        let prefix = normalize_prefix(prefix)?;
        let description = normalize_description(description);
        let created_at_millis = Utc::now().timestamp_millis();

        let conn = lock(&self.conn)?;
        if Self::exists(&conn, &prefix)? {
            return Err(RuleError::DuplicatePrefix(prefix).into());
        }

        conn.execute(
            "INSERT INTO blocked_prefixes (prefix, description, created_at) VALUES (?, ?, ?)",
            params![prefix, description, created_at_millis],
        )?;
        let id = conn.last_insert_rowid();
        log::info!("Added blocked prefix {prefix}");

        Ok(BlockedPrefix {
            id,
            prefix,
            description,
            created_at_millis,
        })
    }

    pub fn remove_prefix(&self, prefix: &str) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute(
            "DELETE FROM blocked_prefixes WHERE prefix = ?",
            params![prefix.trim()],
        )?;
        Ok(removed > 0)
    }

    pub fn delete_prefix(&self, id: i64) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let removed = conn.execute("DELETE FROM blocked_prefixes WHERE id = ?", params![id])?;
        Ok(removed > 0)
    }

    fn exists(conn: &Connection, prefix: &str) -> Result<bool> {
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM blocked_prefixes WHERE prefix = ?)",
            params![prefix],
            |row| row.get::<_, bool>(0),
        )?;
        Ok(exists)
    }

    /// Prefixes in evaluation order.
    pub fn prefixes(&self) -> Result<Vec<BlockedPrefix>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, prefix, description, created_at FROM blocked_prefixes ORDER BY id ASC",
        )?;
        let prefixes = stmt
            .query_map([], |row| {
                Ok(BlockedPrefix {
                    id: row.get(0)?,
                    prefix: row.get(1)?,
                    description: row.get(2)?,
                    created_at_millis: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(prefixes)
    }
}

impl RuleStore for SqliteRuleStore {
    fn snapshot(&self) -> Result<RuleSnapshot> {
        let conn = lock(&self.conn)?;
        // Settings row and prefix list must come from the same state
        let tx = conn.unchecked_transaction()?;
        let snapshot = Self::read_snapshot(&tx)?;
        tx.commit()?;
        Ok(snapshot)
    }
}

/// Rule store held in memory; updates replace the whole snapshot at once.
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<RuleSnapshot>,
}

impl MemoryRuleStore {
    pub fn new(rules: RuleSnapshot) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    pub fn update<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut RuleSnapshot),
    {
        let mut rules = self
            .rules
            .write()
            .map_err(|_| anyhow!("rule store lock poisoned"))?;
        let mut next = rules.clone();
        edit(&mut next);
        *rules = next;
        Ok(())
    }
}

impl RuleStore for MemoryRuleStore {
    fn snapshot(&self) -> Result<RuleSnapshot> {
        let rules = self
            .rules
            .read()
            .map_err(|_| anyhow!("rule store lock poisoned"))?;
        Ok(rules.clone())
    }
}
