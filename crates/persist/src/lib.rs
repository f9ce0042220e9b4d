//! Archon persistence: SQLite store of the last observed attribute tree per
//! resource address, with a short history of previous snapshots.

#![forbid(unsafe_code)]

use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Snapshots kept per address in `state_history`.
const HISTORY_DEPTH: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// `<type_name>.<local name>`, e.g. `archon_network.main`.
    pub address: String,
    pub type_name: String,
    /// Resource identifier; empty once the remote object is gone.
    pub id: String,
    pub attrs_json: String,
    pub ts: i64,
}

pub trait StateStore {
    fn put(&self, rec: StateRecord) -> Result<()>;
    fn get(&self, address: &str) -> Result<Option<StateRecord>>;
    fn remove(&self, address: &str) -> Result<bool>;
    fn list(&self) -> Result<Vec<StateRecord>>;
    /// Previous snapshots for `address`, newest first.
    fn history(&self, address: &str, limit: Option<usize>) -> Result<Vec<StateRecord>>;
}

/// SQLite-backed store. Synchronous; the CLI issues a handful of calls per run.
pub struct SqliteStore {
    db: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("ARCHON_STATE_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", "WAL").ok();
        db.pragma_update(None, "synchronous", "NORMAL").ok();
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS resource_state (
                address   TEXT PRIMARY KEY,
                type_name TEXT NOT NULL,
                id        TEXT NOT NULL,
                attrs     TEXT NOT NULL,
                ts        INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS state_history (
                address   TEXT NOT NULL,
                type_name TEXT NOT NULL,
                id        TEXT NOT NULL,
                attrs     TEXT NOT NULL,
                ts        INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_state_history_addr_ts ON state_history(address, ts DESC);",
        )
        .context("creating state tables")?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        debug!(path = %path, "persist: opened");
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| anyhow!("state db lock poisoned"))
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StateRecord> {
    Ok(StateRecord { address: row.get(0)?, type_name: row.get(1)?, id: row.get(2)?, attrs_json: row.get(3)?, ts: row.get(4)? })
}

impl StateStore for SqliteStore {
    fn put(&self, rec: StateRecord) -> Result<()> {
        let started = std::time::Instant::now();
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        // Current row moves to history before it is overwritten.
        tx.execute(
            "INSERT INTO state_history(address, type_name, id, attrs, ts)
             SELECT address, type_name, id, attrs, ts FROM resource_state WHERE address = ?1",
            [&rec.address],
        )?;
        tx.execute(
            "DELETE FROM state_history
             WHERE address = ?1
               AND rowid NOT IN (
                   SELECT rowid FROM state_history WHERE address = ?1 ORDER BY ts DESC, rowid DESC LIMIT ?2
               )",
            (&rec.address, HISTORY_DEPTH),
        )?;
        tx.execute(
            "INSERT INTO resource_state(address, type_name, id, attrs, ts) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(address) DO UPDATE SET type_name = excluded.type_name, id = excluded.id, attrs = excluded.attrs, ts = excluded.ts",
            (&rec.address, &rec.type_name, &rec.id, &rec.attrs_json, rec.ts),
        )?;
        tx.commit()?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn get(&self, address: &str) -> Result<Option<StateRecord>> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT address, type_name, id, attrs, ts FROM resource_state WHERE address = ?1")?;
        let mut rows = stmt.query([address])?;
        let out = match rows.next()? {
            Some(row) => Some(record_from_row(row)?),
            None => None,
        };
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn remove(&self, address: &str) -> Result<bool> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        let n = tx.execute("DELETE FROM resource_state WHERE address = ?1", [address])?;
        tx.execute("DELETE FROM state_history WHERE address = ?1", [address])?;
        tx.commit()?;
        counter!("persist_remove_total", 1u64);
        Ok(n > 0)
    }

    fn list(&self) -> Result<Vec<StateRecord>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT address, type_name, id, attrs, ts FROM resource_state ORDER BY address")?;
        let rows = stmt.query_map([], record_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("listing state")
    }

    fn history(&self, address: &str, limit: Option<usize>) -> Result<Vec<StateRecord>> {
        let cap = limit.map(|l| l as i64).unwrap_or(HISTORY_DEPTH);
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT address, type_name, id, attrs, ts FROM state_history WHERE address = ?1 ORDER BY ts DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map((address, cap), record_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("reading state history")
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".archon");
        let _ = std::fs::create_dir_all(&p);
        p.push("state.db");
        return p.to_string_lossy().to_string();
    }
    "archon-state.db".to_string()
}

pub fn now_ts() -> i64 {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    now.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> String {
        let dir = std::env::temp_dir();
        let f = format!("archon-test-{}.db", std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos());
        dir.join(f).to_string_lossy().to_string()
    }

    fn rec(address: &str, id: &str, ts: i64) -> StateRecord {
        StateRecord {
            address: address.into(),
            type_name: "archon_network".into(),
            id: id.into(),
            attrs_json: format!(r#"{{"metadata":{{"name":"{ts}"}}}}"#),
            ts,
        }
    }

    #[test]
    fn put_get_overwrite_remove() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        assert!(s.get("archon_network.main").unwrap().is_none());
        s.put(rec("archon_network.main", "default/main", 1)).unwrap();
        s.put(rec("archon_network.main", "default/main", 2)).unwrap();
        let got = s.get("archon_network.main").unwrap().unwrap();
        assert_eq!(got.ts, 2);
        assert_eq!(got.id, "default/main");
        assert!(s.remove("archon_network.main").unwrap());
        assert!(!s.remove("archon_network.main").unwrap());
        assert!(s.get("archon_network.main").unwrap().is_none());
    }

    #[test]
    fn list_is_sorted_by_address() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        s.put(rec("archon_user.b", "default/b", 1)).unwrap();
        s.put(rec("archon_network.a", "default/a", 1)).unwrap();
        let addrs: Vec<String> = s.list().unwrap().into_iter().map(|r| r.address).collect();
        assert_eq!(addrs, vec!["archon_network.a", "archon_user.b"]);
    }

    #[test]
    fn history_keeps_latest_snapshots() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        for i in 0..6 {
            s.put(rec("archon_network.main", "default/main", i)).unwrap();
        }
        let hist = s.history("archon_network.main", None).unwrap();
        let ts: Vec<i64> = hist.iter().map(|r| r.ts).collect();
        assert_eq!(ts, vec![4, 3, 2]);
        assert_eq!(s.get("archon_network.main").unwrap().unwrap().ts, 5);
    }
}
