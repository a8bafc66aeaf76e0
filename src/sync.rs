//! Durable queue of mutating actions captured while offline.
//!
//! Per-action lifecycle: queued, replayed in flight on a sync trigger,
//! then removed on confirmed success or left queued for the next trigger.
//! There is no terminal failed state and no automatic expiry.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::StoreError;
use crate::http::{Method, Request};
use crate::net::Fetcher;
use crate::store::sqlite::parse_datetime;

/// Header carrying the client-generated replay token, so endpoints that
/// honor it cannot double-apply a replay whose first success was lost.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// A mutating request captured for later replay.
#[derive(Debug, Clone)]
pub struct PendingAction {
  pub id: i64,
  pub url: Url,
  pub method: Method,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  /// Replay token, stable across retries and restarts.
  pub token: String,
  pub enqueued_at: DateTime<Utc>,
}

impl PendingAction {
  /// Rebuild the original request, tagged with the replay token.
  pub fn to_request(&self) -> Request {
    let mut headers = self.headers.clone();
    headers.push((IDEMPOTENCY_HEADER.to_string(), self.token.clone()));
    Request {
      method: self.method,
      url: self.url.clone(),
      headers,
      body: self.body.clone(),
    }
  }
}

/// An action not yet queued; id and token are assigned at enqueue time.
#[derive(Debug, Clone)]
pub struct NewAction {
  pub url: Url,
  pub method: Method,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl NewAction {
  pub fn from_request(request: &Request) -> Self {
    Self {
      url: request.url.clone(),
      method: request.method,
      headers: request.headers.clone(),
      body: request.body.clone(),
    }
  }
}

/// Durable FIFO storage for pending actions.
///
/// Entries survive process restarts and are removed only after a
/// confirmed successful replay.
pub trait ActionQueue: Send + Sync {
  /// Append an action, assigning its id and replay token.
  fn enqueue(&self, action: NewAction) -> Result<PendingAction, StoreError>;

  /// All queued actions in enqueue order.
  fn pending(&self) -> Result<Vec<PendingAction>, StoreError>;

  /// Remove an action after a confirmed replay.
  fn remove(&self, id: i64) -> Result<(), StoreError>;
}

/// Result of one drain sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
  pub attempted: usize,
  pub synced: usize,
  pub requeued: usize,
}

/// Replay every queued action in enqueue order, sequentially.
///
/// Each action is independent: a failed replay stays queued for the next
/// trigger and never blocks the rest of the batch. Safe to re-invoke;
/// never raises past its per-action logs.
pub async fn drain<Q, F>(queue: &Q, fetcher: &F) -> DrainReport
where
  Q: ActionQueue,
  F: Fetcher,
{
  let actions = match queue.pending() {
    Ok(actions) => actions,
    Err(err) => {
      warn!(%err, "could not load pending actions");
      return DrainReport::default();
    }
  };

  let mut report = DrainReport {
    attempted: actions.len(),
    ..DrainReport::default()
  };

  for action in actions {
    match fetcher.fetch(&action.to_request()).await {
      Ok(response) if response.is_success() => match queue.remove(action.id) {
        Ok(()) => {
          info!(id = action.id, url = %action.url, "replayed offline action");
          report.synced += 1;
        }
        Err(err) => {
          warn!(id = action.id, %err, "replayed but not removed, will retry");
          report.requeued += 1;
        }
      },
      Ok(response) => {
        warn!(
          id = action.id,
          status = response.status,
          "replay rejected, action stays queued"
        );
        report.requeued += 1;
      }
      Err(err) => {
        warn!(id = action.id, %err, "replay failed, action stays queued");
        report.requeued += 1;
      }
    }
  }

  report
}

/// Action queue backed by the same SQLite database as the cache store.
pub struct SqliteQueue {
  conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    method TEXT NOT NULL,
    headers BLOB NOT NULL,
    body BLOB,
    token TEXT NOT NULL,
    enqueued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteQueue {
  /// Open or create the queue at an explicit database path.
  pub fn open_at(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    let queue = Self {
      conn: Mutex::new(conn),
    };
    queue.lock()?.execute_batch(SCHEMA)?;

    Ok(queue)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::LockPoisoned)
  }
}

impl ActionQueue for SqliteQueue {
  fn enqueue(&self, action: NewAction) -> Result<PendingAction, StoreError> {
    let token = Uuid::new_v4().to_string();
    let headers = serde_json::to_vec(&action.headers)?;
    let conn = self.lock()?;

    conn.execute(
      "INSERT INTO pending_actions (url, method, headers, body, token)
       VALUES (?, ?, ?, ?, ?)",
      params![
        action.url.as_str(),
        action.method.as_str(),
        headers,
        action.body,
        token,
      ],
    )?;
    let id = conn.last_insert_rowid();

    // Read the timestamp back so it matches storage exactly.
    let enqueued_at: String = conn.query_row(
      "SELECT enqueued_at FROM pending_actions WHERE id = ?",
      params![id],
      |row| row.get(0),
    )?;

    Ok(PendingAction {
      id,
      url: action.url,
      method: action.method,
      headers: action.headers,
      body: action.body,
      token,
      enqueued_at: parse_datetime(&enqueued_at)?,
    })
  }

  fn pending(&self) -> Result<Vec<PendingAction>, StoreError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT id, url, method, headers, body, token, enqueued_at
       FROM pending_actions ORDER BY id",
    )?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, Vec<u8>>(3)?,
          row.get::<_, Option<Vec<u8>>>(4)?,
          row.get::<_, String>(5)?,
          row.get::<_, String>(6)?,
        ))
      })?
      .collect::<Result<Vec<_>, _>>()?;

    let mut actions = Vec::with_capacity(rows.len());
    for (id, url, method, headers, body, token, enqueued_at) in rows {
      match decode_row(id, &url, &method, &headers, body, token, &enqueued_at) {
        Ok(action) => actions.push(action),
        // A corrupt row is skipped rather than wedging the whole queue.
        Err(err) => warn!(id, %err, "skipping undecodable pending action"),
      }
    }
    Ok(actions)
  }

  fn remove(&self, id: i64) -> Result<(), StoreError> {
    self
      .lock()?
      .execute("DELETE FROM pending_actions WHERE id = ?", params![id])?;
    Ok(())
  }
}

fn decode_row(
  id: i64,
  url: &str,
  method: &str,
  headers: &[u8],
  body: Option<Vec<u8>>,
  token: String,
  enqueued_at: &str,
) -> Result<PendingAction, StoreError> {
  let url = Url::parse(url).map_err(|e| StoreError::Corrupt(e.to_string()))?;
  let method: Method = method.parse().map_err(StoreError::Corrupt)?;
  let headers: Vec<(String, String)> = serde_json::from_slice(headers)?;

  Ok(PendingAction {
    id,
    url,
    method,
    headers,
    body,
    token,
    enqueued_at: parse_datetime(enqueued_at)?,
  })
}

/// In-memory queue for ephemeral runs and tests.
#[derive(Default)]
pub struct MemoryQueue {
  state: Mutex<MemoryQueueState>,
}

#[derive(Default)]
struct MemoryQueueState {
  next_id: i64,
  actions: Vec<PendingAction>,
}

impl MemoryQueue {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ActionQueue for MemoryQueue {
  fn enqueue(&self, action: NewAction) -> Result<PendingAction, StoreError> {
    let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
    state.next_id += 1;
    let pending = PendingAction {
      id: state.next_id,
      url: action.url,
      method: action.method,
      headers: action.headers,
      body: action.body,
      token: Uuid::new_v4().to_string(),
      enqueued_at: Utc::now(),
    };
    state.actions.push(pending.clone());
    Ok(pending)
  }

  fn pending(&self) -> Result<Vec<PendingAction>, StoreError> {
    let state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
    Ok(state.actions.clone())
  }

  fn remove(&self, id: i64) -> Result<(), StoreError> {
    let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
    state.actions.retain(|action| action.id != id);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::mock::{snapshot, MockFetcher};

  fn post(url: &str, body: &[u8]) -> NewAction {
    NewAction {
      url: Url::parse(url).unwrap(),
      method: Method::Post,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: Some(body.to_vec()),
    }
  }

  #[test]
  fn enqueue_preserves_fifo_order() {
    let queue = MemoryQueue::new();
    queue.enqueue(post("https://example.org/api/a", b"1")).unwrap();
    queue.enqueue(post("https://example.org/api/b", b"2")).unwrap();
    queue.enqueue(post("https://example.org/api/c", b"3")).unwrap();

    let urls: Vec<String> = queue
      .pending()
      .unwrap()
      .iter()
      .map(|a| a.url.to_string())
      .collect();
    assert_eq!(
      urls,
      vec![
        "https://example.org/api/a".to_string(),
        "https://example.org/api/b".to_string(),
        "https://example.org/api/c".to_string(),
      ]
    );
  }

  #[test]
  fn replay_requests_carry_the_idempotency_token() {
    let queue = MemoryQueue::new();
    let action = queue.enqueue(post("https://example.org/api/a", b"1")).unwrap();

    let request = action.to_request();
    assert_eq!(request.header(IDEMPOTENCY_HEADER), Some(action.token.as_str()));
    assert_eq!(request.body.as_deref(), Some(b"1".as_slice()));
  }

  #[tokio::test]
  async fn one_failure_never_blocks_the_rest_of_the_batch() {
    let queue = MemoryQueue::new();
    queue.enqueue(post("https://example.org/api/a", b"1")).unwrap();
    let second = queue.enqueue(post("https://example.org/api/b", b"2")).unwrap();
    queue.enqueue(post("https://example.org/api/c", b"3")).unwrap();

    let fetcher = MockFetcher::offline();
    fetcher.respond("https://example.org/api/a", snapshot(201, "application/json", b"ok"));
    fetcher.fail("https://example.org/api/b");
    fetcher.respond("https://example.org/api/c", snapshot(200, "application/json", b"ok"));

    let report = drain(&queue, &fetcher).await;
    assert_eq!(
      report,
      DrainReport {
        attempted: 3,
        synced: 2,
        requeued: 1,
      }
    );

    let remaining = queue.pending().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);
  }

  #[tokio::test]
  async fn a_second_drain_attempts_only_what_remains() {
    let queue = MemoryQueue::new();
    queue.enqueue(post("https://example.org/api/a", b"1")).unwrap();
    queue.enqueue(post("https://example.org/api/b", b"2")).unwrap();

    let fetcher = MockFetcher::offline();
    fetcher.respond("https://example.org/api/a", snapshot(200, "application/json", b"ok"));

    drain(&queue, &fetcher).await;
    let first_sweep = fetcher.calls().len();

    fetcher.respond("https://example.org/api/b", snapshot(200, "application/json", b"ok"));
    let report = drain(&queue, &fetcher).await;

    assert_eq!(report.attempted, 1);
    assert_eq!(fetcher.calls().len(), first_sweep + 1);
    assert!(queue.pending().unwrap().is_empty());
  }

  #[tokio::test]
  async fn a_rejected_replay_stays_queued() {
    let queue = MemoryQueue::new();
    queue.enqueue(post("https://example.org/api/a", b"1")).unwrap();

    let fetcher = MockFetcher::offline();
    fetcher.respond("https://example.org/api/a", snapshot(422, "application/json", b"no"));

    let report = drain(&queue, &fetcher).await;
    assert_eq!(report.requeued, 1);
    assert_eq!(queue.pending().unwrap().len(), 1);
  }

  #[test]
  fn actions_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let token = {
      let queue = SqliteQueue::open_at(&path).unwrap();
      let action = queue.enqueue(post("https://example.org/api/a", b"1")).unwrap();
      action.token
    };

    let queue = SqliteQueue::open_at(&path).unwrap();
    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url.as_str(), "https://example.org/api/a");
    assert_eq!(pending[0].method, Method::Post);
    // The replay token is stable across restarts.
    assert_eq!(pending[0].token, token);
  }

  #[test]
  fn remove_deletes_exactly_one_action() {
    let dir = tempfile::tempdir().unwrap();
    let queue = SqliteQueue::open_at(&dir.path().join("queue.db")).unwrap();

    let first = queue.enqueue(post("https://example.org/api/a", b"1")).unwrap();
    queue.enqueue(post("https://example.org/api/b", b"2")).unwrap();

    queue.remove(first.id).unwrap();
    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url.as_str(), "https://example.org/api/b");
  }
}
