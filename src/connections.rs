//! In-memory bookkeeping for live SSH sessions and live target forwards.
//! The registry owns short-lived state keyed by durable ids: outer map
//! mutations take the write lock, lookups take the read lock, and counter
//! mutations take a per-entry mutex so concurrent forwards never contend
//! with each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::models::{Connection, TargetConnection};

struct SessionEntry {
    connection: Connection,
    last_updated: DateTime<Utc>,
}

struct TargetEntry {
    inner: Mutex<TargetState>,
}

struct TargetState {
    connection: TargetConnection,
    last_updated: DateTime<Utc>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    targets: RwLock<HashMap<i64, Arc<TargetEntry>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_session(&self, connection: Connection) {
        let session_id = connection.session_id.clone();
        let entry = SessionEntry {
            connection,
            last_updated: Utc::now(),
        };
        self.sessions.write().await.insert(session_id, entry);
    }

    pub async fn session_connection_id(&self, session_id: &str) -> Option<i64> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| entry.connection.id)
    }

    pub async fn remove_session(&self, session_id: &str) -> Option<Connection> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .map(|entry| entry.connection)
    }

    pub async fn register_target(&self, connection: TargetConnection) {
        let target_id = connection.id;
        let entry = Arc::new(TargetEntry {
            inner: Mutex::new(TargetState {
                connection,
                last_updated: Utc::now(),
            }),
        });
        self.targets.write().await.insert(target_id, entry);
    }

    /// Attribute relayed bytes to a live forward. A missing entry (already
    /// finalized) is a no-op.
    pub async fn add_target_traffic(&self, target_id: i64, bytes_up: u64, bytes_down: u64) {
        let targets = self.targets.read().await;
        if let Some(entry) = targets.get(&target_id) {
            let mut state = entry.inner.lock().await;
            state.connection.bytes_up += bytes_up as i64;
            state.connection.bytes_down += bytes_down as i64;
            state.last_updated = Utc::now();
        }
    }

    /// Remove a forward and hand back its final state, counters included.
    pub async fn remove_target(&self, target_id: i64) -> Option<TargetConnection> {
        let entry = self.targets.write().await.remove(&target_id)?;
        let state = entry.inner.lock().await;
        Some(state.connection.clone())
    }

    /// Counter totals of every live forward, each read under its entry
    /// mutex. The snapshot is consistent per entry, not across entries.
    pub async fn snapshot_target_traffic(&self) -> Vec<(i64, i64, i64)> {
        let targets = self.targets.read().await;
        let mut snapshot = Vec::with_capacity(targets.len());
        for (target_id, entry) in targets.iter() {
            let state = entry.inner.lock().await;
            snapshot.push((
                *target_id,
                state.connection.bytes_up,
                state.connection.bytes_down,
            ));
        }
        snapshot
    }
}
