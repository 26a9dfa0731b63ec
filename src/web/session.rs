//! Cookie sessions, backed by tower-sessions.
//!
//! The HTTP session only carries a [`SessionId`]; the parsed batch itself
//! lives in the [`BatchStore`](crate::store::BatchStore) under that key.

use std::time::Duration;

use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

use crate::store::SessionId;

pub const SESSION_COOKIE: &str = "roster_session";

const ROSTER_ID_KEY: &str = "roster_id";

/// Longest inactivity window honoured; cookie expiry dates must stay
/// representable.
const MAX_IDLE_TTL: Duration = Duration::from_secs(365 * 86_400);

/// Session middleware: `roster_session` cookie, expiring after `idle_ttl`
/// without a request.
pub fn session_layer(idle_ttl: Duration) -> SessionManagerLayer<MemoryStore> {
    let secs = idle_ttl.min(MAX_IDLE_TTL).as_secs();
    let inactivity = time::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX));

    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_always_save(true)
        .with_expiry(Expiry::OnInactivity(inactivity))
}

/// Roster key of this session, if it ever uploaded.
pub async fn current_roster_id(
    session: &Session,
) -> Result<Option<SessionId>, tower_sessions::session::Error> {
    session.get(ROSTER_ID_KEY).await
}

/// Roster key of this session, allocated on first use.
pub async fn roster_id(session: &Session) -> Result<SessionId, tower_sessions::session::Error> {
    if let Some(id) = current_roster_id(session).await? {
        return Ok(id);
    }
    let id = SessionId::new();
    session.insert(ROSTER_ID_KEY, id).await?;
    Ok(id)
}
