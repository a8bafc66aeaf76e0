//! SQLite-backed cache store.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{CacheStore, StoredResponse};
use crate::error::StoreError;
use crate::http::{Request, ResponseSnapshot};

/// Cache store backed by a single SQLite database.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the response cache.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request identity within a generation
CREATE TABLE IF NOT EXISTS responses (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key)
);

CREATE INDEX IF NOT EXISTS idx_responses_generation ON responses(generation);
"#;

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self, StoreError> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at an explicit database path.
  pub fn open_at(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Default database path: `<data_dir>/outpost/outpost.db`.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or(StoreError::NoDataDir)?;

    Ok(data_dir.join("outpost").join("outpost.db"))
  }

  fn run_migrations(&self) -> Result<(), StoreError> {
    self.lock()?.execute_batch(SCHEMA)?;
    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::LockPoisoned)
  }
}

impl CacheStore for SqliteStore {
  fn open(&self, generation: &str) -> Result<(), StoreError> {
    self.lock()?.execute(
      "INSERT OR IGNORE INTO generations (name) VALUES (?)",
      params![generation],
    )?;
    Ok(())
  }

  fn put(
    &self,
    generation: &str,
    request: &Request,
    snapshot: &ResponseSnapshot,
  ) -> Result<(), StoreError> {
    let headers = serde_json::to_vec(&snapshot.headers)?;
    let conn = self.lock()?;

    conn.execute(
      "INSERT OR IGNORE INTO generations (name) VALUES (?)",
      params![generation],
    )?;
    conn.execute(
      "INSERT OR REPLACE INTO responses
         (generation, request_key, method, url, status, headers, body, stored_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        generation,
        request.cache_key(),
        request.method.as_str(),
        request.url.as_str(),
        snapshot.status,
        headers,
        snapshot.body,
      ],
    )?;

    Ok(())
  }

  fn lookup(
    &self,
    generation: &str,
    request: &Request,
  ) -> Result<Option<StoredResponse>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT status, headers, body, stored_at FROM responses
       WHERE generation = ? AND request_key = ?",
    )?;

    let row: Option<(u16, Vec<u8>, Vec<u8>, String)> = stmt
      .query_row(params![generation, request.cache_key()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .optional()?;

    match row {
      Some((status, headers, body, stored_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_slice(&headers)?;
        Ok(Some(StoredResponse {
          snapshot: ResponseSnapshot {
            status,
            headers,
            body,
          },
          stored_at: parse_datetime(&stored_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn generations(&self) -> Result<Vec<String>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY created_at, name")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn delete_generation(&self, generation: &str) -> Result<bool, StoreError> {
    let conn = self.lock()?;
    conn.execute(
      "DELETE FROM responses WHERE generation = ?",
      params![generation],
    )?;
    let removed = conn.execute(
      "DELETE FROM generations WHERE name = ?",
      params![generation],
    )?;
    Ok(removed > 0)
  }

  fn entry_urls(&self, generation: &str) -> Result<Vec<String>, StoreError> {
    let conn = self.lock()?;
    let mut stmt =
      conn.prepare("SELECT url FROM responses WHERE generation = ? ORDER BY url")?;
    let urls = stmt
      .query_map(params![generation], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(urls)
  }
}

/// Parse a datetime string from SQLite's `datetime('now')` format.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|_| StoreError::Timestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Method;
  use url::Url;

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  fn snapshot(status: u16, body: &[u8]) -> ResponseSnapshot {
    ResponseSnapshot {
      status,
      headers: vec![("content-type".to_string(), "text/css".to_string())],
      body: body.to_vec(),
    }
  }

  fn temp_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_at(&dir.path().join("cache.db")).unwrap();
    (dir, store)
  }

  #[test]
  fn put_then_lookup_roundtrips() {
    let (_dir, store) = temp_store();
    let request = get("https://example.org/static/app.css");
    let stored = snapshot(200, b"body { margin: 0 }");

    store.put("app-v1", &request, &stored).unwrap();
    let found = store.lookup("app-v1", &request).unwrap().unwrap();

    assert_eq!(found.snapshot, stored);
  }

  #[test]
  fn put_overwrites_instead_of_duplicating() {
    let (_dir, store) = temp_store();
    let request = get("https://example.org/static/app.css");

    store.put("app-v1", &request, &snapshot(200, b"old")).unwrap();
    store.put("app-v1", &request, &snapshot(200, b"new")).unwrap();

    let found = store.lookup("app-v1", &request).unwrap().unwrap();
    assert_eq!(found.snapshot.body, b"new");
    assert_eq!(store.entry_urls("app-v1").unwrap().len(), 1);
  }

  #[test]
  fn lookup_misses_in_other_generations() {
    let (_dir, store) = temp_store();
    let request = get("https://example.org/static/app.css");

    store.put("app-v1", &request, &snapshot(200, b"x")).unwrap();
    assert!(store.lookup("app-v2", &request).unwrap().is_none());
  }

  #[test]
  fn method_is_part_of_the_identity() {
    let (_dir, store) = temp_store();
    let get_req = get("https://example.org/api/x");
    let post_req = Request {
      method: Method::Post,
      ..get_req.clone()
    };

    store.put("app-v1", &get_req, &snapshot(200, b"x")).unwrap();
    assert!(store.lookup("app-v1", &post_req).unwrap().is_none());
  }

  #[test]
  fn delete_generation_removes_entries_and_name() {
    let (_dir, store) = temp_store();
    let request = get("https://example.org/a.html");

    store.put("app-v1", &request, &snapshot(200, b"a")).unwrap();
    store.put("app-v2", &request, &snapshot(200, b"a")).unwrap();

    assert!(store.delete_generation("app-v1").unwrap());
    assert!(!store.delete_generation("app-v1").unwrap());
    assert_eq!(store.generations().unwrap(), vec!["app-v2".to_string()]);
    assert!(store.lookup("app-v1", &request).unwrap().is_none());
  }

  #[test]
  fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let request = get("https://example.org/offline.html");

    {
      let store = SqliteStore::open_at(&path).unwrap();
      store.put("app-v1", &request, &snapshot(200, b"offline")).unwrap();
    }

    let store = SqliteStore::open_at(&path).unwrap();
    let found = store.lookup("app-v1", &request).unwrap().unwrap();
    assert_eq!(found.snapshot.body, b"offline");
  }
}
