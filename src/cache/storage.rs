//! SQLite and in-memory implementations of the cache store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::key::RequestKey;
use super::traits::{CacheStore, CachedEntry, CachedResponse};
use crate::net::Response;

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// A database that lives only as long as this value.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named partitions; the autoincrement id preserves creation order for lookups
CREATE TABLE IF NOT EXISTS partitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored response snapshots keyed by request identity
CREATE TABLE IF NOT EXISTS entries (
    partition_id INTEGER NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition_id, request_hash),
    FOREIGN KEY (partition_id) REFERENCES partitions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_request ON entries(request_hash);
"#;

fn ensure_partition(conn: &Connection, name: &str) -> Result<i64> {
  conn
    .execute(
      "INSERT OR IGNORE INTO partitions (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to create partition {}: {}", name, e))?;

  conn
    .query_row(
      "SELECT id FROM partitions WHERE name = ?",
      params![name],
      |row| row.get(0),
    )
    .map_err(|e| eyre!("Failed to look up partition {}: {}", name, e))
}

fn insert_entry(
  conn: &Connection,
  partition_id: i64,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers for {}: {}", key, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries (partition_id, request_hash, method, url, status, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        partition_id,
        key.cache_hash(),
        key.method(),
        key.url(),
        response.status,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store entry {}: {}", key, e))?;

  Ok(())
}

impl CacheStore for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    ensure_partition(&conn, name)?;
    Ok(())
  }

  fn add_all(&self, name: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let partition_id = ensure_partition(&tx, name)?;
    for (key, response) in entries {
      insert_entry(&tx, partition_id, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let partition_id = ensure_partition(&tx, name)?;
    insert_entry(&tx, partition_id, key, response)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String, String)> = conn
      .query_row(
        "SELECT e.status, e.headers, e.body, e.cached_at, p.name
         FROM entries e
         INNER JOIN partitions p ON p.id = e.partition_id
         WHERE e.request_hash = ?
         ORDER BY p.id
         LIMIT 1",
        params![key.cache_hash()],
        |row| {
          Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    let Some((status, headers, body, cached_at, partition)) = row else {
      return Ok(None);
    };

    let headers = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", key, e))?;

    Ok(Some(CachedResponse {
      response: Response {
        status,
        headers,
        body,
      },
      partition,
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn keys(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM partitions ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition name: {}", e))?;

    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM entries WHERE partition_id IN (SELECT id FROM partitions WHERE name = ?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let removed = tx
      .execute("DELETE FROM partitions WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn entries(&self, name: &str) -> Result<Vec<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT e.method, e.url, e.status, length(e.body) FROM entries e
         INNER JOIN partitions p ON p.id = e.partition_id
         WHERE p.name = ?
         ORDER BY e.rowid",
      )
      .map_err(|e| eyre!("Failed to prepare entry query: {}", e))?;

    let entries = stmt
      .query_map(params![name], |row| {
        Ok(CachedEntry {
          method: row.get(0)?,
          url: row.get(1)?,
          status: row.get(2)?,
          size: row.get(3)?,
        })
      })
      .map_err(|e| eyre!("Failed to query entries: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read entry: {}", e))?;

    Ok(entries)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

/// A partition held in memory.
struct MemoryPartition {
  name: String,
  entries: Vec<(RequestKey, Response, DateTime<Utc>)>,
}

impl MemoryPartition {
  fn upsert(&mut self, key: &RequestKey, response: &Response) {
    let now = Utc::now();
    match self.entries.iter_mut().find(|(k, _, _)| k == key) {
      Some(entry) => *entry = (key.clone(), response.clone(), now),
      None => self.entries.push((key.clone(), response.clone(), now)),
    }
  }
}

/// Storage that lives only for the current process.
/// Used for `--ephemeral` runs and in tests.
#[derive(Default)]
pub struct MemoryStorage {
  partitions: Mutex<Vec<MemoryPartition>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

fn partition_mut<'a>(
  partitions: &'a mut Vec<MemoryPartition>,
  name: &str,
) -> &'a mut MemoryPartition {
  let index = match partitions.iter().position(|p| p.name == name) {
    Some(index) => index,
    None => {
      partitions.push(MemoryPartition {
        name: name.to_string(),
        entries: Vec::new(),
      });
      partitions.len() - 1
    }
  };
  &mut partitions[index]
}

impl CacheStore for MemoryStorage {
  fn open(&self, name: &str) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partition_mut(&mut partitions, name);
    Ok(())
  }

  fn add_all(&self, name: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    // A single lock hold makes the batch atomic for other callers.
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let partition = partition_mut(&mut partitions, name);
    for (key, response) in entries {
      partition.upsert(key, response);
    }
    Ok(())
  }

  fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    partition_mut(&mut partitions, name).upsert(key, response);
    Ok(())
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let found = partitions.iter().find_map(|p| {
      p.entries
        .iter()
        .find(|(k, _, _)| k == key)
        .map(|(_, response, cached_at)| CachedResponse {
          response: response.clone(),
          partition: p.name.clone(),
          cached_at: *cached_at,
        })
    });

    Ok(found)
  }

  fn keys(&self) -> Result<Vec<String>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(partitions.iter().map(|p| p.name.clone()).collect())
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = partitions.len();
    partitions.retain(|p| p.name != name);
    Ok(partitions.len() != before)
  }

  fn entries(&self, name: &str) -> Result<Vec<CachedEntry>> {
    let partitions = self
      .partitions
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let entries = partitions
      .iter()
      .find(|p| p.name == name)
      .map(|p| {
        p.entries
          .iter()
          .map(|(key, response, _)| CachedEntry {
            method: key.method().to_string(),
            url: key.url().to_string(),
            status: response.status,
            size: response.body.len(),
          })
          .collect()
      })
      .unwrap_or_default();

    Ok(entries)
  }
}
