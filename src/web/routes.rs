//! REST endpoints: upload a roster, show it, send the notifications.

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};
use tracing::{error, info, warn};

use super::session::{current_roster_id, roster_id};
use crate::error::{DispatchError, Error, UploadError, ValidationError};
use crate::notify::{Notifier, RecordOutcome};
use crate::roster::{Batch, RosterLoader, UploadedFile};
use crate::store::BatchStore;

/// Multipart field holding the roster file.
pub const UPLOAD_FIELD: &str = "employee_file";

/// Room for multipart framing on top of the file size limit.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BatchStore>,
    pub loader: Arc<RosterLoader>,
    pub notifier: Arc<Notifier>,
}

impl AppState {
    pub fn new(store: Arc<dyn BatchStore>, loader: RosterLoader, notifier: Notifier) -> Self {
        Self {
            store,
            loader: Arc::new(loader),
            notifier: Arc::new(notifier),
        }
    }

    fn body_limit(&self) -> u64 {
        self.loader.limits().max_file_size + MULTIPART_OVERHEAD
    }
}

/// Build the Axum router with the roster routes behind the session layer.
pub fn roster_routes(state: AppState, sessions: SessionManagerLayer<MemoryStore>) -> Router {
    let body_limit = usize::try_from(state.body_limit()).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(health))
        .route("/roster", get(show_roster).post(upload_roster))
        .route("/roster/send", post(send_notifications))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(sessions)
        .with_state(state)
}

// ── Responses ───────────────────────────────────────────────────────────

/// Typed so record keys keep column order on the wire.
#[derive(Serialize)]
struct RosterResponse<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    batch: Option<&'a Batch>,
}

#[derive(Serialize)]
struct SendResponse<'a> {
    status: &'static str,
    message: String,
    success_count: usize,
    total_count: usize,
    outcomes: &'a [RecordOutcome],
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: chrono::DateTime<chrono::Utc>,
}

fn error_parts(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::Upload(UploadError::Validation(ValidationError::TooLarge { .. })) => {
            (StatusCode::PAYLOAD_TOO_LARGE, "validation_error")
        }
        Error::Upload(e) => (StatusCode::BAD_REQUEST, e.kind()),
        Error::Dispatch(DispatchError::NoBatch) => (StatusCode::BAD_REQUEST, "no_batch"),
        Error::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, "session_error"),
        Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "processing_error"),
    }
}

fn error_response(err: &Error, batch: Option<&Batch>) -> Response {
    let (status, kind) = error_parts(err);
    let body = RosterResponse {
        status: "error",
        kind: Some(kind),
        message: Some(err.to_string()),
        batch,
    };
    (status, Json(body)).into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "roster-mailer"
    }))
}

// ── Roster ──────────────────────────────────────────────────────────────

/// GET /roster: the batch stored for this session, if any.
async fn show_roster(State(state): State<AppState>, session: Session) -> Response {
    let id = match current_roster_id(&session).await {
        Ok(id) => id,
        Err(e) => return error_response(&Error::from(e), None),
    };
    let batch = match id {
        Some(id) => state.store.get(&id).await,
        None => None,
    };
    let body = RosterResponse {
        status: "ok",
        kind: None,
        message: None,
        batch: batch.as_deref(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// POST /roster: parse an uploaded file and store it for this session.
///
/// On failure the previously stored batch is left in place and echoed back.
async fn upload_roster(
    State(state): State<AppState>,
    session: Session,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let id = match roster_id(&session).await {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "Session unavailable");
            return error_response(&Error::from(e), None);
        }
    };

    let body_limit = state.body_limit();
    let file = match multipart {
        Ok(multipart) => read_upload(&state.loader, multipart, body_limit).await,
        Err(rejection) => Err(ValidationError::MalformedRequest(rejection.body_text())),
    };

    let result = match file {
        Ok(file) => {
            let loader = Arc::clone(&state.loader);
            match tokio::task::spawn_blocking(move || loader.load(file)).await {
                Ok(parsed) => parsed.map_err(Error::from),
                Err(e) => Err(Error::Internal(e.to_string())),
            }
        }
        Err(e) => Err(Error::Upload(e.into())),
    };

    match result {
        Ok(batch) => {
            let batch = Arc::new(batch);
            state.store.put(id, Arc::clone(&batch)).await;
            info!(session = %id, rows = batch.len(), "Roster stored for session");
            let body = RosterResponse {
                status: "ok",
                kind: None,
                message: Some("File uploaded and processed successfully!".to_string()),
                batch: Some(batch.as_ref()),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => {
            match &err {
                Error::Internal(detail) => {
                    error!(session = %id, error = %detail, "Error processing file")
                }
                other => warn!(session = %id, error = %other, "Roster upload rejected"),
            }
            let current = state.store.get(&id).await;
            error_response(&err, current.as_deref())
        }
    }
}

/// Pull the roster field out of the multipart body, enforcing the size limit
/// while the bytes arrive.
async fn read_upload(
    loader: &RosterLoader,
    mut multipart: Multipart,
    body_limit: u64,
) -> Result<Option<UploadedFile>, ValidationError> {
    let into_validation = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ValidationError::TooLarge {
                size: body_limit,
                limit: loader.limits().max_file_size,
            }
        } else {
            ValidationError::MalformedRequest(e.body_text())
        }
    };

    while let Some(mut field) = multipart.next_field().await.map_err(into_validation)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let mut content = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(into_validation)? {
            content.extend_from_slice(&chunk);
            loader.check_size(content.len() as u64)?;
        }
        return Ok(Some(UploadedFile::new(filename, content)));
    }
    Ok(None)
}

// ── Send ────────────────────────────────────────────────────────────────

/// POST /roster/send: email every record of the session's batch.
async fn send_notifications(State(state): State<AppState>, session: Session) -> Response {
    let id = match current_roster_id(&session).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!("Send requested with no roster uploaded");
            return error_response(&Error::from(DispatchError::NoBatch), None);
        }
        Err(e) => return error_response(&Error::from(e), None),
    };

    match state.notifier.dispatch_session(state.store.as_ref(), &id).await {
        Ok(report) => {
            let body = SendResponse {
                status: "ok",
                message: report.summary(),
                success_count: report.success_count,
                total_count: report.total_count,
                outcomes: &report.outcomes,
                started_at: report.started_at,
                finished_at: report.finished_at,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            warn!(session = %id, "Send requested with no roster uploaded");
            error_response(&Error::from(e), None)
        }
    }
}
