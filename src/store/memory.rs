//! In-memory batch store with idle-session expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::traits::{BatchStore, SessionId};
use crate::roster::Batch;

struct Entry {
    batch: Arc<Batch>,
    touched_at: Instant,
}

impl Entry {
    fn is_idle(&self, ttl: Duration) -> bool {
        self.touched_at.elapsed() >= ttl
    }
}

/// Process-local store. Contents are lost on restart.
///
/// Entries idle for `idle_ttl` are dropped lazily: on read of that entry,
/// and from the whole map on every write.
pub struct MemoryBatchStore {
    sessions: RwLock<HashMap<SessionId, Entry>>,
    idle_ttl: Duration,
}

impl MemoryBatchStore {
    pub fn new(idle_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
        })
    }

    /// Number of sessions holding a batch.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn expire_idle(sessions: &mut HashMap<SessionId, Entry>, ttl: Duration) -> usize {
    let before = sessions.len();
    sessions.retain(|_, entry| !entry.is_idle(ttl));
    let expired = before - sessions.len();
    if expired > 0 {
        info!(expired, remaining = sessions.len(), "Expired idle roster sessions");
    }
    expired
}

#[async_trait]
impl BatchStore for MemoryBatchStore {
    async fn get(&self, session: &SessionId) -> Option<Arc<Batch>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(session)?;
        if entry.is_idle(self.idle_ttl) {
            sessions.remove(session);
            debug!(session = %session, "Roster batch expired");
            return None;
        }
        entry.touched_at = Instant::now();
        Some(Arc::clone(&entry.batch))
    }

    async fn put(&self, session: SessionId, batch: Arc<Batch>) {
        debug!(session = %session, rows = batch.len(), "Storing roster batch");
        let mut sessions = self.sessions.write().await;
        expire_idle(&mut sessions, self.idle_ttl);
        sessions.insert(
            session,
            Entry {
                batch,
                touched_at: Instant::now(),
            },
        );
    }
}
