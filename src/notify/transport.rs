//! Mail transport: the seam between dispatch and the network.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use super::template::{BodyFormat, RenderedBody};
use crate::config::SmtpConfig;
use crate::error::TransportError;

/// Sends one message to one recipient. The dispatcher attaches the recipient
/// to any error.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &RenderedBody) -> Result<(), TransportError>;
}

/// SMTP over STARTTLS via lettre. Every send opens, authenticates, uses and
/// closes its own connection.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn send_failed(&self, reason: String) -> TransportError {
        TransportError::SendFailed {
            relay: self.config.host.clone(),
            reason,
        }
    }

    /// Blocking send; run it on the blocking pool.
    fn send_blocking(&self, email: &Message) -> Result<(), TransportError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::starttls_relay(&self.config.host)
            .map_err(|e| self.send_failed(format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .build();

        transport
            .send(email)
            .map_err(|e| self.send_failed(format!("SMTP send failed: {e}")))?;
        Ok(())
    }

    fn build_message(
        &self,
        to: &str,
        subject: &str,
        body: &RenderedBody,
    ) -> Result<Message, TransportError> {
        let content_type = match body.format {
            BodyFormat::Plain => ContentType::TEXT_PLAIN,
            BodyFormat::Html => ContentType::TEXT_HTML,
        };

        Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                TransportError::InvalidAddress {
                    field: "from",
                    reason: format!("{e}"),
                }
            })?)
            .to(to.parse().map_err(|e| TransportError::InvalidAddress {
                field: "to",
                reason: format!("{e}"),
            })?)
            .subject(subject)
            .header(content_type)
            .body(body.content.clone())
            .map_err(|e| self.send_failed(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &RenderedBody) -> Result<(), TransportError> {
        let email = self.build_message(to, subject, body)?;
        let mailer = self.clone();

        tokio::task::spawn_blocking(move || mailer.send_blocking(&email))
            .await
            .map_err(|e| self.send_failed(format!("SMTP task failed: {e}")))??;

        info!(recipient = %to, "Email sent successfully");
        Ok(())
    }
}
