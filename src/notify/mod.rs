//! Roster notifications: body templates, mail transport, bounded dispatch.

pub mod dispatch;
pub mod template;
pub mod transport;

pub use dispatch::{DispatchReport, Notifier, RecordOutcome, SendOutcome};
pub use template::{BodyFormat, RenderedBody};
pub use transport::{MailTransport, SmtpMailer};
