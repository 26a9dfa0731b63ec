//! HTTP surface: axum router, handlers and session handling.

pub mod routes;
pub mod session;

pub use routes::{AppState, UPLOAD_FIELD, roster_routes};
pub use session::{SESSION_COOKIE, current_roster_id, roster_id, session_layer};
