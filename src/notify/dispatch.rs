//! Bounded-parallel fan-out of roster notifications.
//!
//! Each record goes `pending → validating → {sent | invalid_address |
//! transport_failed}` exactly once. At most `workers` sends are in flight, and
//! [`Notifier::dispatch`] returns only once every record has an outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::template::{self, BodyFormat};
use super::transport::MailTransport;
use crate::config::DispatchConfig;
use crate::error::{DispatchError, RecordError};
use crate::roster::{Batch, EmployeeRecord};
use crate::store::{BatchStore, SessionId};

/// Final state of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    Sent,
    InvalidAddress,
    TransportFailed { reason: String },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

impl From<RecordError> for SendOutcome {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Address { .. } => SendOutcome::InvalidAddress,
            RecordError::Delivery { source, .. } => SendOutcome::TransportFailed {
                reason: source.to_string(),
            },
        }
    }
}

/// Outcome of one row of the batch.
#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    /// Zero-based row index within the batch.
    pub row: usize,
    pub recipient: String,
    #[serde(flatten)]
    pub outcome: SendOutcome,
}

/// Aggregate result of one dispatch run.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub success_count: usize,
    pub total_count: usize,
    /// One entry per record, in row order.
    pub outcomes: Vec<RecordOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    pub fn summary(&self) -> String {
        format!(
            "Email sending completed. {}/{} emails sent successfully.",
            self.success_count, self.total_count
        )
    }
}

/// Renders and sends one notification per record.
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
    workers: usize,
    subject: Arc<str>,
    body_format: BodyFormat,
}

impl Notifier {
    pub fn new(config: &DispatchConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            workers: config.workers.max(1),
            subject: config.subject.as_str().into(),
            body_format: config.body_format,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Dispatch the batch stored for `session`; fails if there is none.
    pub async fn dispatch_session(
        &self,
        store: &dyn BatchStore,
        session: &SessionId,
    ) -> Result<DispatchReport, DispatchError> {
        let batch = store.get(session).await.ok_or(DispatchError::NoBatch)?;
        Ok(self.dispatch(batch).await)
    }

    /// Send to every record of the batch and wait for all of them.
    pub async fn dispatch(&self, batch: Arc<Batch>) -> DispatchReport {
        let started_at = Utc::now();
        let total_count = batch.len();
        info!(total = total_count, workers = self.workers, "Sending emails to employees");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set = JoinSet::new();

        for row in 0..total_count {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let batch = Arc::clone(&batch);
            let transport = Arc::clone(&self.transport);
            let subject = Arc::clone(&self.subject);
            let format = self.body_format;

            join_set.spawn(async move {
                let _permit = permit;
                let record = &batch.records()[row];
                let outcome = deliver(record, transport.as_ref(), &subject, format).await;
                (row, outcome)
            });
        }

        let mut outcomes: Vec<RecordOutcome> = batch
            .records()
            .iter()
            .enumerate()
            .map(|(row, record)| RecordOutcome {
                row,
                recipient: record.email().to_string(),
                outcome: SendOutcome::TransportFailed {
                    reason: "worker did not complete".to_string(),
                },
            })
            .collect();

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((row, outcome)) => outcomes[row].outcome = outcome,
                Err(e) => error!(error = %e, "Email worker panicked"),
            }
        }

        let success_count = outcomes.iter().filter(|o| o.outcome.is_sent()).count();
        let report = DispatchReport {
            success_count,
            total_count,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            sent = report.success_count,
            total = report.total_count,
            "Email dispatch finished"
        );
        report
    }
}

/// Render, validate and send one record.
async fn deliver(
    record: &EmployeeRecord,
    transport: &dyn MailTransport,
    subject: &str,
    format: BodyFormat,
) -> SendOutcome {
    let body = template::render(record, format);
    let recipient = record.email();

    let result = if !recipient.contains('@') {
        Err(RecordError::Address {
            recipient: recipient.to_string(),
        })
    } else {
        transport
            .send(recipient, subject, &body)
            .await
            .map_err(|source| RecordError::Delivery {
                recipient: recipient.to_string(),
                source,
            })
    };

    match result {
        Ok(()) => SendOutcome::Sent,
        Err(err @ RecordError::Address { .. }) => {
            warn!(recipient = %recipient, "{err}");
            err.into()
        }
        Err(err @ RecordError::Delivery { .. }) => {
            error!(recipient = %recipient, error = %err, "Email delivery failed");
            err.into()
        }
    }
}
