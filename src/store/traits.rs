//! Session-keyed batch storage.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roster::Batch;

/// Key of one session's roster slot. Lives inside the HTTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Holds at most one batch per session. A `put` replaces whatever the
/// session held before.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Batch currently stored for the session, if any.
    async fn get(&self, session: &SessionId) -> Option<Arc<Batch>>;

    /// Store a batch for the session, replacing any previous one.
    async fn put(&self, session: SessionId, batch: Arc<Batch>);
}
